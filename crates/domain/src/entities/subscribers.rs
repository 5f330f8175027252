use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::schema::subscribers;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = subscribers)]
pub struct SubscriberEntity {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub phone: Option<String>,
    pub email_confirmed_at: Option<DateTime<Utc>>,
    pub billing_customer_ref: Option<String>,
    pub audiences: Vec<String>,
    pub categories: Vec<String>,
    pub distributions: Vec<String>,
    pub risk_levels: Vec<String>,
    pub alert_by_email: bool,
    pub alert_by_phone: bool,
    pub send_summary: bool,
    pub alert_for_vehicles: bool,
    pub send_vehicle_summary: bool,
    pub entitlements: Value,
    pub lock_owner: Option<String>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Full-row changeset used by the aggregate save path. The lock columns are
/// deliberately absent; they move only through the acquire/release queries.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = subscribers)]
pub struct UpdateSubscriberEntity {
    pub email: String,
    pub role: String,
    pub phone: Option<Option<String>>,
    pub email_confirmed_at: Option<Option<DateTime<Utc>>>,
    pub billing_customer_ref: Option<Option<String>>,
    pub audiences: Vec<String>,
    pub categories: Vec<String>,
    pub distributions: Vec<String>,
    pub risk_levels: Vec<String>,
    pub alert_by_email: bool,
    pub alert_by_phone: bool,
    pub send_summary: bool,
    pub alert_for_vehicles: bool,
    pub send_vehicle_summary: bool,
    pub entitlements: Value,
    pub updated_at: DateTime<Utc>,
}
