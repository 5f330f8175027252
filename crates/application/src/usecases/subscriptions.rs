use std::sync::Arc;

use chrono::{Duration, Utc};
use domain::errors::DomainError;
use domain::repositories::plans::PlanCatalog;
use domain::repositories::subscribers::SubscriberRepository;
use domain::value_objects::subscribers::NotificationPreferences;
use tracing::info;
use uuid::Uuid;

use crate::usecases::exclusive_update::ExclusiveUpdate;
use crate::usecases::plan_cache::PlanCache;

/// Subscribing to plans and moving entitlements between plans. Mutations
/// run under the per-subscriber lease like every other write path.
pub struct SubscriptionUseCase<R, P>
where
    R: SubscriberRepository + Send + Sync + 'static,
    P: PlanCatalog + Send + Sync + 'static,
{
    exclusive: ExclusiveUpdate<R>,
    plans: Arc<PlanCache<P>>,
    grace_window: Duration,
}

impl<R, P> SubscriptionUseCase<R, P>
where
    R: SubscriberRepository + Send + Sync + 'static,
    P: PlanCatalog + Send + Sync + 'static,
{
    pub fn new(
        subscriber_repo: Arc<R>,
        plans: Arc<PlanCache<P>>,
        lease_seconds: i64,
        grace_days: i64,
    ) -> Self {
        Self {
            exclusive: ExclusiveUpdate::new(subscriber_repo, lease_seconds),
            plans,
            grace_window: Duration::days(grace_days.max(0)),
        }
    }

    /// Creates an empty entitlement for a catalog plan. The billing customer
    /// reference is stored on first use; lifecycle fields stay at their
    /// creation values until the first reconciliation lands.
    pub async fn subscribe(
        &self,
        subscriber_id: Uuid,
        plan_id: &str,
        billing_customer_ref: Option<String>,
    ) -> Result<Uuid, DomainError> {
        let plan = self
            .plans
            .plan_by_id(plan_id)
            .await
            .map_err(DomainError::Internal)?
            .ok_or_else(|| {
                DomainError::validation(
                    "plan_id",
                    format!("plan `{}` does not resolve in the catalog", plan_id),
                )
            })?;
        if !plan.is_active {
            return Err(DomainError::validation(
                "plan_id",
                format!("plan `{}` is no longer offered", plan_id),
            ));
        }

        let grace_window = self.grace_window;
        let entitlement_id = self
            .exclusive
            .with_exclusive_access(subscriber_id, move |subscriber| {
                let now = Utc::now();
                if subscriber.billing_customer_ref.is_none() {
                    subscriber.billing_customer_ref = billing_customer_ref;
                }

                let entitlement_id = subscriber.add_entitlement(&plan, now, grace_window)?;

                if subscriber.preferences.is_blank()
                    && subscriber.recall_entitlement(now, grace_window).is_some()
                {
                    subscriber.preferences = NotificationPreferences::bootstrap();
                }

                Ok(entitlement_id)
            })
            .await?;

        info!(
            %subscriber_id,
            plan_id,
            %entitlement_id,
            "subscriptions: entitlement created"
        );
        Ok(entitlement_id)
    }

    /// Re-applies catalog features to an entitlement whose plan changed.
    pub async fn change_plan(
        &self,
        subscriber_id: Uuid,
        entitlement_id: Uuid,
        plan_id: &str,
    ) -> Result<(), DomainError> {
        let plan = self
            .plans
            .plan_by_id(plan_id)
            .await
            .map_err(DomainError::Internal)?
            .ok_or_else(|| {
                DomainError::validation(
                    "plan_id",
                    format!("plan `{}` does not resolve in the catalog", plan_id),
                )
            })?;

        let grace_window = self.grace_window;
        self.exclusive
            .with_exclusive_access(subscriber_id, move |subscriber| {
                let now = Utc::now();

                if plan.recall_feature {
                    let other_active_recall = subscriber
                        .recall_entitlement(now, grace_window)
                        .map(|existing| existing.id)
                        .is_some_and(|existing_id| existing_id != entitlement_id);
                    if other_active_recall {
                        return Err(DomainError::Conflict(
                            "an active recall subscription already exists".to_string(),
                        ));
                    }
                }

                let entitlement = subscriber
                    .entitlement_by_id_mut(entitlement_id)
                    .ok_or_else(|| {
                        DomainError::NotFound(format!("entitlement {}", entitlement_id))
                    })?;

                if entitlement.plan_id == plan.id {
                    return Ok(());
                }
                entitlement.apply_plan(&plan, now)
            })
            .await?;

        info!(
            %subscriber_id,
            %entitlement_id,
            plan_id,
            "subscriptions: plan changed"
        );
        Ok(())
    }
}
