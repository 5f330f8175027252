use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::value_objects::plans::PlanModel;

/// Read-only view of the external plan catalog. Small and cacheable; the
/// application layer wraps it in an explicitly refreshed cache.
#[async_trait]
#[automock]
pub trait PlanCatalog {
    async fn plan_by_id(&self, plan_id: &str) -> Result<Option<PlanModel>>;

    async fn list_active_plans(&self) -> Result<Vec<PlanModel>>;
}
