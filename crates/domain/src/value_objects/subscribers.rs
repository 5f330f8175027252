use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::entities::subscribers::{SubscriberEntity, UpdateSubscriberEntity};
use crate::errors::DomainError;
use crate::value_objects::entitlements::EntitlementModel;
use crate::value_objects::enums::subscriber_roles::SubscriberRole;
use crate::value_objects::plans::PlanModel;
use crate::value_objects::vehicles::VehicleKey;

/// Tag sets and channel flags controlling what a subscriber is told about.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NotificationPreferences {
    pub audiences: Vec<String>,
    pub categories: Vec<String>,
    pub distributions: Vec<String>,
    pub risk_levels: Vec<String>,
    pub alert_by_email: bool,
    pub alert_by_phone: bool,
    pub send_summary: bool,
    pub alert_for_vehicles: bool,
    pub send_vehicle_summary: bool,
}

impl NotificationPreferences {
    /// Starting point written the first time a subscriber gains an active
    /// recall entitlement: consumer-facing recalls across every category and
    /// risk level, email alerts and the periodic summary switched on.
    pub fn bootstrap() -> Self {
        Self {
            audiences: vec!["consumers".to_string()],
            categories: vec![
                "food".to_string(),
                "drug".to_string(),
                "medical_device".to_string(),
                "cosmetic".to_string(),
                "consumer_product".to_string(),
            ],
            distributions: vec!["nationwide".to_string()],
            risk_levels: vec![
                "low".to_string(),
                "medium".to_string(),
                "high".to_string(),
                "serious".to_string(),
            ],
            alert_by_email: true,
            alert_by_phone: false,
            send_summary: true,
            alert_for_vehicles: true,
            send_vehicle_summary: true,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.audiences.is_empty()
            && self.categories.is_empty()
            && self.distributions.is_empty()
            && self.risk_levels.is_empty()
    }
}

/// The owning aggregate: one row per user, entitlements embedded as children.
/// All mutation goes through aggregate methods so the cross-child invariants
/// hold; children are not independently addressable for writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriberModel {
    pub id: Uuid,
    pub email: String,
    pub role: SubscriberRole,
    pub phone: Option<String>,
    pub email_confirmed_at: Option<DateTime<Utc>>,
    pub billing_customer_ref: Option<String>,
    pub preferences: NotificationPreferences,
    pub entitlements: Vec<EntitlementModel>,
    pub lock_owner: Option<String>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriberModel {
    /// Appends a new entitlement created from a catalog plan.
    ///
    /// Rejected with `Conflict` when the plan grants the recall feature and
    /// an active recall-feature entitlement already exists: a subscriber
    /// holds at most one recall subscription at a time. Requires the billing
    /// customer reference to be present before any entitlement exists.
    pub fn add_entitlement(
        &mut self,
        plan: &PlanModel,
        now: DateTime<Utc>,
        grace_window: Duration,
    ) -> Result<Uuid, DomainError> {
        if self.billing_customer_ref.as_deref().unwrap_or("").is_empty() {
            return Err(DomainError::validation(
                "billing_customer_ref",
                "a billing customer reference is required before subscribing",
            ));
        }

        if plan.recall_feature && self.recall_entitlement(now, grace_window).is_some() {
            return Err(DomainError::Conflict(
                "an active recall subscription already exists".to_string(),
            ));
        }

        let entitlement = EntitlementModel::from_plan(plan, now)?;
        let entitlement_id = entitlement.id;
        self.entitlements.push(entitlement);
        Ok(entitlement_id)
    }

    pub fn active_entitlements(
        &self,
        now: DateTime<Utc>,
        grace_window: Duration,
    ) -> Vec<&EntitlementModel> {
        self.entitlements
            .iter()
            .filter(|entitlement| entitlement.is_active_at(now, grace_window))
            .collect()
    }

    /// First active entitlement granting the recall feature. Callers treat
    /// `None` as "receives no alerts"; elevated roles are exempted from that
    /// rule by the targeting engine, not here.
    pub fn recall_entitlement(
        &self,
        now: DateTime<Utc>,
        grace_window: Duration,
    ) -> Option<&EntitlementModel> {
        self.entitlements.iter().find(|entitlement| {
            entitlement.recall_feature && entitlement.is_active_at(now, grace_window)
        })
    }

    pub fn has_vehicle_entitlement(&self, now: DateTime<Utc>, grace_window: Duration) -> bool {
        self.entitlements.iter().any(|entitlement| {
            entitlement.vehicle_slot_count > 0 && entitlement.is_active_at(now, grace_window)
        })
    }

    /// Vehicle keys across every active entitlement's slots.
    pub fn active_vehicle_keys(
        &self,
        now: DateTime<Utc>,
        grace_window: Duration,
    ) -> Vec<&VehicleKey> {
        self.active_entitlements(now, grace_window)
            .into_iter()
            .flat_map(|entitlement| entitlement.vehicle_keys())
            .collect()
    }

    pub fn entitlement_by_id_mut(&mut self, entitlement_id: Uuid) -> Option<&mut EntitlementModel> {
        self.entitlements
            .iter_mut()
            .find(|entitlement| entitlement.id == entitlement_id)
    }

    /// Repairs the slot-count invariant on every child; run after loading a
    /// stored row.
    pub fn normalize(&mut self, now: DateTime<Utc>) {
        for entitlement in &mut self.entitlements {
            entitlement.resize_slots(now);
        }
    }

    pub fn to_update_entity(&self, now: DateTime<Utc>) -> UpdateSubscriberEntity {
        UpdateSubscriberEntity {
            email: self.email.to_lowercase(),
            role: self.role.to_string(),
            phone: Some(self.phone.clone()),
            email_confirmed_at: Some(self.email_confirmed_at),
            billing_customer_ref: Some(self.billing_customer_ref.clone()),
            audiences: self.preferences.audiences.clone(),
            categories: self.preferences.categories.clone(),
            distributions: self.preferences.distributions.clone(),
            risk_levels: self.preferences.risk_levels.clone(),
            alert_by_email: self.preferences.alert_by_email,
            alert_by_phone: self.preferences.alert_by_phone,
            send_summary: self.preferences.send_summary,
            alert_for_vehicles: self.preferences.alert_for_vehicles,
            send_vehicle_summary: self.preferences.send_vehicle_summary,
            entitlements: serde_json::to_value(&self.entitlements).unwrap_or(Value::Array(vec![])),
            updated_at: now,
        }
    }
}

impl From<SubscriberEntity> for SubscriberModel {
    fn from(entity: SubscriberEntity) -> Self {
        let entitlements: Vec<EntitlementModel> =
            serde_json::from_value(entity.entitlements).unwrap_or_default();

        let mut model = Self {
            id: entity.id,
            email: entity.email,
            role: SubscriberRole::from_str(&entity.role),
            phone: entity.phone,
            email_confirmed_at: entity.email_confirmed_at,
            billing_customer_ref: entity.billing_customer_ref,
            preferences: NotificationPreferences {
                audiences: entity.audiences,
                categories: entity.categories,
                distributions: entity.distributions,
                risk_levels: entity.risk_levels,
                alert_by_email: entity.alert_by_email,
                alert_by_phone: entity.alert_by_phone,
                send_summary: entity.send_summary,
                alert_for_vehicles: entity.alert_for_vehicles,
                send_vehicle_summary: entity.send_vehicle_summary,
            },
            entitlements,
            lock_owner: entity.lock_owner,
            lock_expires_at: entity.lock_expires_at,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        };
        model.normalize(Utc::now());
        model
    }
}
