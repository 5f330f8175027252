use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::value_objects::subscribers::SubscriberModel;

/// Load/store for single subscriber aggregates plus the lease columns the
/// exclusive-update coordinator drives. `save` persists the whole aggregate
/// (preferences and embedded entitlements) but never touches the lease
/// columns; those move only through the acquire/release pair.
#[async_trait]
#[automock]
pub trait SubscriberRepository {
    async fn find_by_id(&self, subscriber_id: Uuid) -> Result<Option<SubscriberModel>>;

    async fn find_by_billing_customer_ref(
        &self,
        customer_ref: &str,
    ) -> Result<Option<SubscriberModel>>;

    async fn save(&self, subscriber: &SubscriberModel) -> Result<()>;

    /// Compare-and-swap lease acquisition: succeeds only when the row is
    /// unlocked or its lease has expired. Returns whether the lease was won.
    async fn try_acquire_lock(
        &self,
        subscriber_id: Uuid,
        owner: &str,
        lease_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Clears the lease if still held by `owner`; a no-op otherwise.
    async fn release_lock(&self, subscriber_id: Uuid, owner: &str) -> Result<()>;
}
