use std::sync::Arc;

use chrono::{Duration, Utc};
use domain::errors::DomainError;
use domain::repositories::subscribers::SubscriberRepository;
use domain::value_objects::subscribers::SubscriberModel;
use tracing::{debug, warn};
use uuid::Uuid;

/// Single-writer discipline for subscriber aggregates.
///
/// Every mutation path runs through `with_exclusive_access`: a short-lived
/// lease is CAS-acquired on the subscriber row, the aggregate is reloaded
/// fresh, mutated, persisted, and the lease released. A writer that dies
/// mid-flight leaves a lease that self-expires, so the next caller reclaims
/// the row without manual intervention. Contention is reported immediately;
/// callers never block or retry here.
pub struct ExclusiveUpdate<R>
where
    R: SubscriberRepository + Send + Sync + 'static,
{
    subscriber_repo: Arc<R>,
    lease: Duration,
}

impl<R> ExclusiveUpdate<R>
where
    R: SubscriberRepository + Send + Sync + 'static,
{
    pub fn new(subscriber_repo: Arc<R>, lease_seconds: i64) -> Self {
        Self {
            subscriber_repo,
            lease: Duration::seconds(lease_seconds.max(1)),
        }
    }

    pub async fn with_exclusive_access<T, F>(
        &self,
        subscriber_id: Uuid,
        mutate: F,
    ) -> Result<T, DomainError>
    where
        F: FnOnce(&mut SubscriberModel) -> Result<T, DomainError> + Send,
        T: Send,
    {
        let owner = Uuid::new_v4().to_string();
        let now = Utc::now();

        let acquired = self
            .subscriber_repo
            .try_acquire_lock(subscriber_id, &owner, now + self.lease, now)
            .await
            .map_err(DomainError::Internal)?;

        if !acquired {
            debug!(%subscriber_id, "exclusive_update: lease held by another writer");
            return Err(DomainError::LockContention);
        }

        let result = self.run_locked(subscriber_id, mutate).await;

        // Released on success and on failure alike; if the release itself
        // fails the lease still self-expires after `lease` seconds.
        if let Err(error) = self.subscriber_repo.release_lock(subscriber_id, &owner).await {
            warn!(
                %subscriber_id,
                error = ?error,
                "exclusive_update: lease release failed; waiting for expiry"
            );
        }

        result
    }

    async fn run_locked<T, F>(&self, subscriber_id: Uuid, mutate: F) -> Result<T, DomainError>
    where
        F: FnOnce(&mut SubscriberModel) -> Result<T, DomainError> + Send,
        T: Send,
    {
        let mut subscriber = self
            .subscriber_repo
            .find_by_id(subscriber_id)
            .await
            .map_err(DomainError::Internal)?
            .ok_or_else(|| DomainError::NotFound(format!("subscriber {}", subscriber_id)))?;

        let value = mutate(&mut subscriber)?;

        subscriber.normalize(Utc::now());
        self.subscriber_repo
            .save(&subscriber)
            .await
            .map_err(DomainError::Internal)?;

        Ok(value)
    }
}
