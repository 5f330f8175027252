use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::dispatches;

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = dispatches)]
pub struct InsertDispatchEntity {
    pub recall_id: Uuid,
    pub subscriber_id: Uuid,
    pub reason: String,
}
