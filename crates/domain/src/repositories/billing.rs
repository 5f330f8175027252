use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::value_objects::billing::BillingSnapshot;

/// Boundary to the billing provider. The provider's API client lives
/// outside this core; reconciliation only ever asks it to re-fetch one
/// subscription by reference.
#[async_trait]
#[automock]
pub trait BillingGateway: Send + Sync {
    async fn retrieve_subscription(&self, subscription_ref: &str) -> Result<BillingSnapshot>;
}
