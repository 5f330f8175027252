use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use domain::errors::DomainError;
use domain::repositories::population::PopulationStore;
use domain::repositories::subscribers::SubscriberRepository;
use domain::value_objects::vehicles::VehicleKey;
use tracing::info;
use uuid::Uuid;

use crate::usecases::exclusive_update::ExclusiveUpdate;
use crate::usecases::targeting::TargetingEngine;

/// Writes a vehicle key into one entitlement slot.
///
/// The slot's `reviewed` flag encodes the first-watcher policy: when some
/// other subscriber already watches the same key, recall data for it has
/// been looked up before, so the new slot starts out pre-reviewed and
/// triggers no lookup of its own.
pub struct VehicleSlotUpdate<R, Pop>
where
    R: SubscriberRepository + Send + Sync + 'static,
    Pop: PopulationStore + Send + Sync + 'static,
{
    exclusive: ExclusiveUpdate<R>,
    targeting: Arc<TargetingEngine<Pop>>,
}

impl<R, Pop> VehicleSlotUpdate<R, Pop>
where
    R: SubscriberRepository + Send + Sync + 'static,
    Pop: PopulationStore + Send + Sync + 'static,
{
    pub fn new(
        subscriber_repo: Arc<R>,
        targeting: Arc<TargetingEngine<Pop>>,
        lease_seconds: i64,
    ) -> Self {
        Self {
            exclusive: ExclusiveUpdate::new(subscriber_repo, lease_seconds),
            targeting,
        }
    }

    pub async fn set_vehicle_slot_value(
        &self,
        subscriber_id: Uuid,
        entitlement_id: Uuid,
        slot_index: usize,
        raw_key: Option<&str>,
    ) -> Result<(), DomainError> {
        let vehicle_key = raw_key.map(VehicleKey::parse).transpose()?;

        // Cross-aggregate read, done before the lease is taken: the answer
        // only decides whether a lookup is owed, it does not have to be
        // transactional with the write.
        let reviewed = match &vehicle_key {
            Some(key) => self
                .targeting
                .key_already_watched(key, subscriber_id)
                .await
                .map_err(|err| DomainError::Internal(anyhow!(err)))?,
            None => false,
        };

        self.exclusive
            .with_exclusive_access(subscriber_id, move |subscriber| {
                let entitlement = subscriber
                    .entitlement_by_id_mut(entitlement_id)
                    .ok_or_else(|| {
                        DomainError::NotFound(format!("entitlement {}", entitlement_id))
                    })?;
                entitlement.set_vehicle_slot(slot_index, vehicle_key, reviewed, Utc::now())
            })
            .await?;

        info!(
            %subscriber_id,
            %entitlement_id,
            slot_index,
            reviewed,
            "vehicle_slots: slot updated"
        );
        Ok(())
    }
}
