use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::recalls;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = recalls)]
pub struct RecallEntity {
    pub id: Uuid,
    pub title: Option<String>,
    pub audiences: Vec<String>,
    pub categories: Vec<String>,
    pub distributions: Vec<String>,
    pub risk_levels: Vec<String>,
    pub vehicle_keys: Vec<String>,
    pub restricted: bool,
    pub published_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
