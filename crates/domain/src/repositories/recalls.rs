use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::value_objects::recalls::RecallModel;

/// Poll/ack surface the fan-out worker drives: recalls are published
/// upstream and picked up here until marked dispatched.
#[async_trait]
#[automock]
pub trait RecallStore {
    async fn list_undispatched(&self, now: DateTime<Utc>) -> Result<Vec<RecallModel>>;

    async fn mark_dispatched(&self, recall_id: Uuid, dispatched_at: DateTime<Utc>) -> Result<()>;
}
