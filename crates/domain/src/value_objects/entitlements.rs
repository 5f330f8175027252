use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;
use crate::value_objects::enums::entitlement_statuses::EntitlementStatus;
use crate::value_objects::grace;
use crate::value_objects::plans::PlanModel;
use crate::value_objects::vehicles::VehicleKey;

/// One vehicle-interest slot on an entitlement. `reviewed` records whether
/// recall data for this key was already looked up on behalf of some other
/// subscriber; only the first watcher of a key triggers the lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleSlot {
    #[serde(default)]
    pub vehicle_key: Option<VehicleKey>,

    #[serde(default)]
    pub reviewed: bool,

    pub updated_at: DateTime<Utc>,
}

impl VehicleSlot {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            vehicle_key: None,
            reviewed: false,
            updated_at: now,
        }
    }
}

/// One paid subscription held by a subscriber. Embedded in the subscriber
/// row as JSONB; never hard-deleted, cancellation is a status transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntitlementModel {
    pub id: Uuid,
    pub plan_id: String,

    /// Subscription reference assigned by the billing provider. Empty until
    /// the first reconciliation ties this record to a provider subscription.
    #[serde(default)]
    pub billing_ref: String,

    pub started_at: DateTime<Utc>,
    pub renews_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: EntitlementStatus,

    #[serde(default)]
    pub recall_feature: bool,

    #[serde(default)]
    pub vehicle_slot_count: i32,

    #[serde(default)]
    pub vehicle_slots: Vec<VehicleSlot>,
}

impl EntitlementModel {
    /// Creates the empty record a subscriber gets when first subscribing to
    /// a plan. Lifecycle timestamps stay at `now` until billing confirms;
    /// with the grace window this keeps the record active just long enough
    /// for the first reconciliation to land.
    pub fn from_plan(plan: &PlanModel, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let now = grace::truncate_to_minute(now);
        let mut entitlement = Self {
            id: Uuid::new_v4(),
            plan_id: plan.id.clone(),
            billing_ref: String::new(),
            started_at: now,
            renews_at: now,
            expires_at: now,
            status: EntitlementStatus::Incomplete,
            recall_feature: false,
            vehicle_slot_count: 0,
            vehicle_slots: Vec::new(),
        };
        entitlement.apply_plan(plan, now)?;
        Ok(entitlement)
    }

    /// Copies feature flags and the slot budget from the catalog entry,
    /// resizing `vehicle_slots` to match. Invoked at creation and whenever
    /// `plan_id` changes.
    pub fn apply_plan(&mut self, plan: &PlanModel, now: DateTime<Utc>) -> Result<(), DomainError> {
        if plan.vehicle_slot_count < 0 {
            return Err(DomainError::validation(
                "vehicle_slot_count",
                format!("plan `{}` carries a negative slot count", plan.id),
            ));
        }

        self.plan_id = plan.id.clone();
        self.recall_feature = plan.recall_feature;
        self.vehicle_slot_count = plan.vehicle_slot_count;
        self.resize_slots(now);
        Ok(())
    }

    /// Updates one slot's key. `reviewed` is decided by the caller from a
    /// population-wide check: true when some other subscriber already
    /// watches the same key.
    pub fn set_vehicle_slot(
        &mut self,
        slot_index: usize,
        vehicle_key: Option<VehicleKey>,
        reviewed: bool,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let slot = self.vehicle_slots.get_mut(slot_index).ok_or_else(|| {
            DomainError::validation(
                "slot_index",
                format!("index {} out of {} slots", slot_index, self.vehicle_slot_count),
            )
        })?;

        slot.vehicle_key = vehicle_key;
        slot.reviewed = reviewed;
        slot.updated_at = grace::truncate_to_minute(now);
        Ok(())
    }

    pub fn is_active_at(&self, now: DateTime<Utc>, grace_window: Duration) -> bool {
        grace::is_active(self.expires_at, now, grace_window)
    }

    pub fn vehicle_keys(&self) -> impl Iterator<Item = &VehicleKey> {
        self.vehicle_slots
            .iter()
            .filter_map(|slot| slot.vehicle_key.as_ref())
    }

    /// Re-establishes `vehicle_slots.len() == vehicle_slot_count`. Run after
    /// every mutation and after deserializing a stored record.
    pub fn resize_slots(&mut self, now: DateTime<Utc>) {
        let target = self.vehicle_slot_count.max(0) as usize;
        if self.vehicle_slots.len() > target {
            self.vehicle_slots.truncate(target);
        }
        while self.vehicle_slots.len() < target {
            self.vehicle_slots.push(VehicleSlot::empty(now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_plan(slot_count: i32, recall_feature: bool) -> PlanModel {
        PlanModel {
            id: "recall-plus".to_string(),
            name: Some("Recall Plus".to_string()),
            recall_feature,
            vehicle_slot_count: slot_count,
            interval: Default::default(),
            duration_days: 30,
            is_active: true,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn slot_list_tracks_the_plan_budget() {
        let mut entitlement = EntitlementModel::from_plan(&sample_plan(3, true), now()).unwrap();
        assert_eq!(entitlement.vehicle_slots.len(), 3);

        entitlement
            .set_vehicle_slot(
                1,
                Some(VehicleKey::new("honda", "civic", 2019).unwrap()),
                false,
                now(),
            )
            .unwrap();

        entitlement.apply_plan(&sample_plan(1, true), now()).unwrap();
        assert_eq!(entitlement.vehicle_slots.len(), 1);

        entitlement.apply_plan(&sample_plan(4, true), now()).unwrap();
        assert_eq!(entitlement.vehicle_slots.len(), 4);
        assert!(entitlement.vehicle_slots[0].vehicle_key.is_none());
    }

    #[test]
    fn truncation_drops_from_the_tail() {
        let mut entitlement = EntitlementModel::from_plan(&sample_plan(2, true), now()).unwrap();
        let key = VehicleKey::new("honda", "civic", 2019).unwrap();
        entitlement
            .set_vehicle_slot(0, Some(key.clone()), false, now())
            .unwrap();

        entitlement.apply_plan(&sample_plan(1, true), now()).unwrap();
        assert_eq!(entitlement.vehicle_slots[0].vehicle_key, Some(key));
    }

    #[test]
    fn rejects_out_of_range_slot_updates() {
        let mut entitlement = EntitlementModel::from_plan(&sample_plan(1, false), now()).unwrap();
        let result = entitlement.set_vehicle_slot(5, None, false, now());
        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }

    #[test]
    fn fresh_record_is_active_only_through_the_grace_window() {
        let entitlement = EntitlementModel::from_plan(&sample_plan(0, true), now()).unwrap();
        let grace_window = Duration::days(3);

        assert!(entitlement.is_active_at(now() + Duration::days(2), grace_window));
        assert!(!entitlement.is_active_at(now() + Duration::days(4), grace_window));
    }
}
