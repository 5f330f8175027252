use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::value_objects::enums::dispatch_reasons::DispatchReason;

/// Hand-off to the external notification pipeline: subscriber ids plus a
/// reason code. Message composition and delivery happen elsewhere.
#[async_trait]
#[automock]
pub trait DispatchSink {
    async fn enqueue(
        &self,
        recall_id: Uuid,
        targets: &[(Uuid, DispatchReason)],
    ) -> Result<()>;
}
