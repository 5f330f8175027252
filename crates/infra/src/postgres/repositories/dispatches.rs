use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, insert_into};
use uuid::Uuid;

use crate::postgres::postgres_connection::PgPoolSquad;
use domain::{
    entities::dispatches::InsertDispatchEntity, repositories::dispatches::DispatchSink,
    schema::dispatches, value_objects::enums::dispatch_reasons::DispatchReason,
};

/// Dispatch rows are the hand-off point: the delivery pipeline drains this
/// table on its own schedule.
pub struct DispatchPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl DispatchPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl DispatchSink for DispatchPostgres {
    async fn enqueue(&self, recall_id: Uuid, targets: &[(Uuid, DispatchReason)]) -> Result<()> {
        if targets.is_empty() {
            return Ok(());
        }
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rows: Vec<InsertDispatchEntity> = targets
            .iter()
            .map(|(subscriber_id, reason)| InsertDispatchEntity {
                recall_id,
                subscriber_id: *subscriber_id,
                reason: reason.to_string(),
            })
            .collect();

        insert_into(dispatches::table)
            .values(&rows)
            .execute(&mut conn)?;

        Ok(())
    }
}
