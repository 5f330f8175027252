use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use domain::errors::DomainError;
use domain::repositories::billing::BillingGateway;
use domain::repositories::plans::PlanCatalog;
use domain::repositories::subscribers::SubscriberRepository;
use domain::value_objects::billing::{BillingEvent, BillingSnapshot};
use domain::value_objects::entitlements::EntitlementModel;
use domain::value_objects::grace;
use domain::value_objects::plans::PlanModel;
use domain::value_objects::subscribers::{NotificationPreferences, SubscriberModel};
use tracing::{error, info, warn};

use crate::usecases::exclusive_update::ExclusiveUpdate;
use crate::usecases::plan_cache::PlanCache;

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub grace_days: i64,
    pub far_future: DateTime<Utc>,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            grace_days: 3,
            far_future: grace::far_future(),
        }
    }
}

/// Merges billing-provider events and snapshots into subscriber
/// entitlements, exactly once per state change, under the per-subscriber
/// lease.
///
/// The pipeline is at-least-once: the same event may arrive twice and
/// events may arrive out of order. Merging is therefore a pure overwrite
/// from snapshot state (idempotent), and anything that cannot be merged is
/// logged and dropped so the event source's own redelivery governs retries.
pub struct BillingReconciler<R, P, B>
where
    R: SubscriberRepository + Send + Sync + 'static,
    P: PlanCatalog + Send + Sync + 'static,
    B: BillingGateway + Send + Sync + 'static,
{
    exclusive: ExclusiveUpdate<R>,
    subscriber_repo: Arc<R>,
    plans: Arc<PlanCache<P>>,
    billing: Arc<B>,
    settings: ReconcilerSettings,
}

impl<R, P, B> BillingReconciler<R, P, B>
where
    R: SubscriberRepository + Send + Sync + 'static,
    P: PlanCatalog + Send + Sync + 'static,
    B: BillingGateway + Send + Sync + 'static,
{
    pub fn new(
        subscriber_repo: Arc<R>,
        plans: Arc<PlanCache<P>>,
        billing: Arc<B>,
        lease_seconds: i64,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            exclusive: ExclusiveUpdate::new(Arc::clone(&subscriber_repo), lease_seconds),
            subscriber_repo,
            plans,
            billing,
            settings,
        }
    }

    /// Absorbing boundary for the event transport: every failure is logged
    /// here and acked, so one bad or late event can never block the
    /// pipeline or trigger a retry storm against a hot subscriber row.
    pub async fn process(&self, event: BillingEvent) {
        let kind = event.kind();
        let customer_ref = event.customer_ref().to_string();
        let subscription_ref = event.subscription_ref().to_string();

        match self.apply_event(event).await {
            Ok(()) => {
                info!(
                    kind,
                    %customer_ref,
                    %subscription_ref,
                    "reconcile: event applied"
                );
            }
            Err(err) if err.is_discardable() => {
                warn!(
                    kind,
                    %customer_ref,
                    %subscription_ref,
                    reason = %err,
                    "reconcile: event discarded"
                );
            }
            Err(err) => {
                error!(
                    kind,
                    %customer_ref,
                    %subscription_ref,
                    error = ?err,
                    "reconcile: event failed"
                );
            }
        }
    }

    pub async fn apply_event(&self, event: BillingEvent) -> Result<(), DomainError> {
        let snapshot = match event {
            // Invoice events only carry references; the subscription is
            // re-fetched so the merge always works from full provider state.
            BillingEvent::InvoicePaid {
                customer_ref,
                subscription_ref,
            }
            | BillingEvent::InvoiceFailed {
                customer_ref,
                subscription_ref,
            } => {
                let snapshot = self
                    .billing
                    .retrieve_subscription(&subscription_ref)
                    .await
                    .map_err(DomainError::Internal)?;
                if snapshot.customer_ref != customer_ref {
                    return Err(DomainError::UpstreamMismatch(format!(
                        "subscription {} belongs to {}, event names {}",
                        subscription_ref, snapshot.customer_ref, customer_ref
                    )));
                }
                snapshot
            }
            BillingEvent::SubscriptionCanceled(snapshot)
            | BillingEvent::SubscriptionUpdated(snapshot) => snapshot,
        };

        self.reconcile_snapshot(snapshot).await
    }

    /// Merges one full subscription snapshot under the subscriber's lease.
    pub async fn reconcile_snapshot(&self, snapshot: BillingSnapshot) -> Result<(), DomainError> {
        let subscriber = self
            .subscriber_repo
            .find_by_billing_customer_ref(&snapshot.customer_ref)
            .await
            .map_err(DomainError::Internal)?
            .ok_or_else(|| {
                DomainError::NotFound(format!(
                    "no subscriber for billing customer {}",
                    snapshot.customer_ref
                ))
            })?;

        // Plan resolution happens before the lease is taken; the catalog
        // call is cached but still remote on a miss.
        let plan = self
            .plans
            .plan_by_id(&snapshot.plan_ref)
            .await
            .map_err(DomainError::Internal)?;

        let settings = self.settings.clone();
        self.exclusive
            .with_exclusive_access(subscriber.id, move |subscriber| {
                merge_snapshot(subscriber, &snapshot, plan.as_ref(), Utc::now(), &settings)
            })
            .await
    }
}

/// Pure merge of provider state into the aggregate. Overwrites lifecycle
/// fields from the snapshot, so re-applying the same snapshot is a no-op.
fn merge_snapshot(
    subscriber: &mut SubscriberModel,
    snapshot: &BillingSnapshot,
    plan: Option<&PlanModel>,
    now: DateTime<Utc>,
    settings: &ReconcilerSettings,
) -> Result<(), DomainError> {
    let grace_window = Duration::days(settings.grace_days);

    let target = match locate_entitlement(subscriber, snapshot) {
        Some(index) => index,
        None if snapshot.status.never_became_active() => {
            return Err(DomainError::NotFound(format!(
                "no entitlement for subscription {} and status `{}` never became active",
                snapshot.subscription_ref, snapshot.status
            )));
        }
        None if snapshot.status.is_live() => {
            // A paid plan acquired upstream that this side has never seen.
            let plan = plan.ok_or_else(|| {
                DomainError::validation(
                    "plan_ref",
                    format!("plan `{}` does not resolve in the catalog", snapshot.plan_ref),
                )
            })?;
            if plan.recall_feature
                && subscriber.recall_entitlement(now, grace_window).is_some()
            {
                return Err(DomainError::Conflict(
                    "provider reports a second active recall subscription".to_string(),
                ));
            }
            subscriber
                .entitlements
                .push(EntitlementModel::from_plan(plan, now)?);
            subscriber.entitlements.len() - 1
        }
        None => {
            return Err(DomainError::NotFound(format!(
                "no entitlement for subscription {} (status `{}`)",
                snapshot.subscription_ref, snapshot.status
            )));
        }
    };

    let entitlement = &mut subscriber.entitlements[target];
    if !entitlement.billing_ref.is_empty() && entitlement.plan_id != snapshot.plan_ref {
        // The local record no longer represents the plan this webhook is
        // about; only a full resync may resolve that, never a blind
        // overwrite.
        return Err(DomainError::UpstreamMismatch(format!(
            "subscription {} is on plan `{}` locally but `{}` upstream",
            snapshot.subscription_ref, entitlement.plan_id, snapshot.plan_ref
        )));
    }

    apply_snapshot_fields(entitlement, snapshot, now, settings.far_future);

    if subscriber.preferences.is_blank()
        && subscriber.recall_entitlement(now, grace_window).is_some()
    {
        subscriber.preferences = NotificationPreferences::bootstrap();
    }

    Ok(())
}

/// Finds the record a snapshot belongs to: first by provider reference,
/// then by adopting a not-yet-reconciled record created locally for the
/// same plan (its reference is still empty).
fn locate_entitlement(subscriber: &SubscriberModel, snapshot: &BillingSnapshot) -> Option<usize> {
    if let Some(index) = subscriber
        .entitlements
        .iter()
        .position(|entitlement| entitlement.billing_ref == snapshot.subscription_ref)
    {
        return Some(index);
    }
    subscriber.entitlements.iter().position(|entitlement| {
        entitlement.billing_ref.is_empty() && entitlement.plan_id == snapshot.plan_ref
    })
}

fn apply_snapshot_fields(
    entitlement: &mut EntitlementModel,
    snapshot: &BillingSnapshot,
    now: DateTime<Utc>,
    far_future: DateTime<Utc>,
) {
    entitlement.billing_ref = snapshot.subscription_ref.clone();
    entitlement.status = snapshot.status;

    // Provider clock jitter is absorbed by widening period boundaries to
    // day resolution: starts snap down, ends snap up, then everything is
    // minute-truncated.
    let started_at = grace::truncate_to_minute(grace::day_start(snapshot.start_date));
    let renews_at = grace::truncate_to_minute(grace::day_end(snapshot.current_period_end));
    let renews_at = renews_at.max(started_at);

    entitlement.started_at = started_at;
    entitlement.renews_at = renews_at;
    entitlement.expires_at = derive_expiration(snapshot, renews_at, now, far_future);
}

/// The provider populates different subsets of the end-of-life fields
/// depending on how the subscription changed; later candidates are only
/// meaningful when every earlier one is absent. First match wins.
fn derive_expiration(
    snapshot: &BillingSnapshot,
    renews_at: DateTime<Utc>,
    now: DateTime<Utc>,
    far_future: DateTime<Utc>,
) -> DateTime<Utc> {
    if let Some(ended_at) = snapshot.ended_at {
        return grace::truncate_to_minute(grace::day_end(ended_at));
    }
    if let Some(cancel_at) = snapshot.cancel_at {
        return grace::truncate_to_minute(grace::day_end(cancel_at));
    }
    if let Some(canceled_at) = snapshot.canceled_at {
        return grace::truncate_to_minute(grace::day_end(canceled_at));
    }
    if !snapshot.status.is_live() {
        return grace::truncate_to_minute(grace::day_end(now));
    }
    if snapshot.cancel_at_period_end {
        return renews_at;
    }
    far_future
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use domain::repositories::billing::MockBillingGateway;
    use domain::repositories::plans::MockPlanCatalog;
    use domain::repositories::subscribers::MockSubscriberRepository;
    use domain::value_objects::enums::entitlement_statuses::EntitlementStatus;
    use domain::value_objects::enums::subscriber_roles::SubscriberRole;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn instant(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn recall_plan() -> PlanModel {
        PlanModel {
            id: "recall-basic".to_string(),
            name: None,
            recall_feature: true,
            vehicle_slot_count: 2,
            interval: Default::default(),
            duration_days: 30,
            is_active: true,
        }
    }

    fn sample_subscriber(customer_ref: &str) -> SubscriberModel {
        SubscriberModel {
            id: Uuid::new_v4(),
            email: "member@example.com".to_string(),
            role: SubscriberRole::Member,
            phone: None,
            email_confirmed_at: None,
            billing_customer_ref: Some(customer_ref.to_string()),
            preferences: NotificationPreferences::default(),
            entitlements: Vec::new(),
            lock_owner: None,
            lock_expires_at: None,
            created_at: instant(2025, 1, 1, 0, 0),
            updated_at: instant(2025, 1, 1, 0, 0),
        }
    }

    fn snapshot(customer_ref: &str, subscription_ref: &str) -> BillingSnapshot {
        BillingSnapshot {
            customer_ref: customer_ref.to_string(),
            subscription_ref: subscription_ref.to_string(),
            plan_ref: "recall-basic".to_string(),
            status: EntitlementStatus::Active,
            start_date: instant(2025, 5, 1, 8, 17),
            current_period_end: instant(2025, 6, 1, 8, 17),
            ended_at: None,
            cancel_at: None,
            canceled_at: None,
            cancel_at_period_end: false,
        }
    }

    fn settings() -> ReconcilerSettings {
        ReconcilerSettings::default()
    }

    #[test]
    fn merge_is_idempotent() {
        let mut subscriber = sample_subscriber("cus_1");
        let snapshot = snapshot("cus_1", "sub_1");
        let plan = recall_plan();
        let now = instant(2025, 5, 2, 10, 0);

        merge_snapshot(&mut subscriber, &snapshot, Some(&plan), now, &settings()).unwrap();
        let after_first = subscriber.clone();

        merge_snapshot(&mut subscriber, &snapshot, Some(&plan), now, &settings()).unwrap();
        assert_eq!(subscriber.entitlements, after_first.entitlements);
        assert_eq!(subscriber.preferences, after_first.preferences);
    }

    #[test]
    fn period_boundaries_are_widened_to_day_resolution() {
        let mut subscriber = sample_subscriber("cus_1");
        let snapshot = snapshot("cus_1", "sub_1");
        let now = instant(2025, 5, 2, 10, 0);

        merge_snapshot(
            &mut subscriber,
            &snapshot,
            Some(&recall_plan()),
            now,
            &settings(),
        )
        .unwrap();

        let entitlement = &subscriber.entitlements[0];
        assert_eq!(entitlement.started_at, instant(2025, 5, 1, 0, 0));
        assert_eq!(entitlement.renews_at, instant(2025, 6, 1, 23, 59));
        assert_eq!(entitlement.expires_at, grace::far_future());
    }

    #[test]
    fn ended_at_takes_precedence_over_everything() {
        let mut snapshot = snapshot("cus_1", "sub_1");
        snapshot.ended_at = Some(instant(2025, 5, 10, 4, 0));
        snapshot.cancel_at = Some(instant(2025, 5, 20, 4, 0));
        snapshot.canceled_at = Some(instant(2025, 5, 15, 4, 0));

        let expires = derive_expiration(
            &snapshot,
            instant(2025, 6, 1, 23, 59),
            instant(2025, 5, 2, 10, 0),
            grace::far_future(),
        );
        assert_eq!(expires, instant(2025, 5, 10, 23, 59));
    }

    #[test]
    fn cancel_at_takes_precedence_over_canceled_at() {
        let mut snapshot = snapshot("cus_1", "sub_1");
        snapshot.cancel_at = Some(instant(2025, 5, 20, 4, 0));
        snapshot.canceled_at = Some(instant(2025, 5, 15, 4, 0));

        let expires = derive_expiration(
            &snapshot,
            instant(2025, 6, 1, 23, 59),
            instant(2025, 5, 2, 10, 0),
            grace::far_future(),
        );
        assert_eq!(expires, instant(2025, 5, 20, 23, 59));
    }

    #[test]
    fn inactive_status_expires_at_reconciliation_time() {
        let mut snapshot = snapshot("cus_1", "sub_1");
        snapshot.status = EntitlementStatus::Unpaid;
        let now = instant(2025, 5, 2, 10, 0);

        let expires = derive_expiration(
            &snapshot,
            instant(2025, 6, 1, 23, 59),
            now,
            grace::far_future(),
        );
        assert_eq!(expires, instant(2025, 5, 2, 23, 59));
    }

    #[test]
    fn cancel_at_period_end_expires_at_renewal() {
        let mut snapshot = snapshot("cus_1", "sub_1");
        snapshot.cancel_at_period_end = true;

        let renews_at = instant(2025, 6, 1, 23, 59);
        let expires = derive_expiration(
            &snapshot,
            renews_at,
            instant(2025, 5, 2, 10, 0),
            grace::far_future(),
        );
        assert_eq!(expires, renews_at);
    }

    #[test]
    fn first_reconciliation_adopts_the_locally_created_record() {
        let mut subscriber = sample_subscriber("cus_1");
        let plan = recall_plan();
        let now = instant(2025, 5, 2, 10, 0);
        subscriber
            .add_entitlement(&plan, now, Duration::days(3))
            .unwrap();
        let local_id = subscriber.entitlements[0].id;

        merge_snapshot(
            &mut subscriber,
            &snapshot("cus_1", "sub_1"),
            Some(&plan),
            now,
            &settings(),
        )
        .unwrap();

        assert_eq!(subscriber.entitlements.len(), 1);
        assert_eq!(subscriber.entitlements[0].id, local_id);
        assert_eq!(subscriber.entitlements[0].billing_ref, "sub_1");
    }

    #[test]
    fn plan_mismatch_is_skipped_as_upstream_mismatch() {
        let mut subscriber = sample_subscriber("cus_1");
        let plan = recall_plan();
        let now = instant(2025, 5, 2, 10, 0);
        merge_snapshot(
            &mut subscriber,
            &snapshot("cus_1", "sub_1"),
            Some(&plan),
            now,
            &settings(),
        )
        .unwrap();
        let before = subscriber.entitlements.clone();

        let mut divergent = snapshot("cus_1", "sub_1");
        divergent.plan_ref = "some-other-plan".to_string();
        let result = merge_snapshot(&mut subscriber, &divergent, None, now, &settings());

        assert!(matches!(result, Err(DomainError::UpstreamMismatch(_))));
        assert_eq!(subscriber.entitlements, before);
    }

    #[test]
    fn never_active_subscription_without_a_record_is_discarded() {
        let mut subscriber = sample_subscriber("cus_1");
        let mut snapshot = snapshot("cus_1", "sub_1");
        snapshot.status = EntitlementStatus::IncompleteExpired;

        let result = merge_snapshot(
            &mut subscriber,
            &snapshot,
            Some(&recall_plan()),
            instant(2025, 5, 2, 10, 0),
            &settings(),
        );

        assert!(matches!(result, Err(DomainError::NotFound(_))));
        assert!(subscriber.entitlements.is_empty());
    }

    #[test]
    fn live_subscription_without_a_record_is_created_from_the_snapshot() {
        let mut subscriber = sample_subscriber("cus_1");
        let now = instant(2025, 5, 2, 10, 0);

        merge_snapshot(
            &mut subscriber,
            &snapshot("cus_1", "sub_1"),
            Some(&recall_plan()),
            now,
            &settings(),
        )
        .unwrap();

        assert_eq!(subscriber.entitlements.len(), 1);
        let entitlement = &subscriber.entitlements[0];
        assert!(entitlement.recall_feature);
        assert_eq!(entitlement.vehicle_slots.len(), 2);
        assert_eq!(entitlement.status, EntitlementStatus::Active);
        // Gaining an active recall entitlement bootstraps blank preferences.
        assert!(!subscriber.preferences.is_blank());
        assert!(subscriber.preferences.alert_by_email);
    }

    fn reconciler_with(
        repo: MockSubscriberRepository,
        gateway: MockBillingGateway,
    ) -> BillingReconciler<MockSubscriberRepository, MockPlanCatalog, MockBillingGateway> {
        let mut catalog = MockPlanCatalog::new();
        catalog
            .expect_list_active_plans()
            .returning(|| Box::pin(async { Ok(vec![recall_plan()]) }));
        catalog
            .expect_plan_by_id()
            .returning(|_| Box::pin(async { Ok(None) }));

        BillingReconciler::new(
            Arc::new(repo),
            Arc::new(PlanCache::new(Arc::new(catalog), 3600)),
            Arc::new(gateway),
            5,
            settings(),
        )
    }

    #[tokio::test]
    async fn unknown_customer_leaves_all_state_untouched() {
        let mut repo = MockSubscriberRepository::new();
        repo.expect_find_by_billing_customer_ref()
            .returning(|_| Box::pin(async { Ok(None) }));
        repo.expect_try_acquire_lock().never();
        repo.expect_save().never();

        let mut gateway = MockBillingGateway::new();
        gateway.expect_retrieve_subscription().returning(|_| {
            Box::pin(async { Ok(snapshot("cus_ghost", "sub_ghost")) })
        });

        let reconciler = reconciler_with(repo, gateway);
        let result = reconciler
            .apply_event(BillingEvent::InvoicePaid {
                customer_ref: "cus_ghost".to_string(),
                subscription_ref: "sub_ghost".to_string(),
            })
            .await;

        assert!(matches!(result, Err(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn invoice_events_refetch_before_merging() {
        let subscriber = sample_subscriber("cus_1");
        let subscriber_id = subscriber.id;
        let saved: Arc<Mutex<Option<SubscriberModel>>> = Arc::new(Mutex::new(None));

        let mut repo = MockSubscriberRepository::new();
        {
            let subscriber = subscriber.clone();
            repo.expect_find_by_billing_customer_ref()
                .returning(move |_| {
                    let subscriber = subscriber.clone();
                    Box::pin(async move { Ok(Some(subscriber)) })
                });
        }
        repo.expect_try_acquire_lock()
            .returning(|_, _, _, _| Box::pin(async { Ok(true) }));
        {
            let subscriber = subscriber.clone();
            repo.expect_find_by_id().returning(move |_| {
                let subscriber = subscriber.clone();
                Box::pin(async move { Ok(Some(subscriber)) })
            });
        }
        {
            let saved = Arc::clone(&saved);
            repo.expect_save().times(1).returning(move |model| {
                *saved.lock().unwrap() = Some(model.clone());
                Box::pin(async { Ok(()) })
            });
        }
        repo.expect_release_lock()
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let mut gateway = MockBillingGateway::new();
        gateway
            .expect_retrieve_subscription()
            .times(1)
            .returning(|_| Box::pin(async { Ok(snapshot("cus_1", "sub_1")) }));

        let reconciler = reconciler_with(repo, gateway);
        reconciler
            .apply_event(BillingEvent::InvoicePaid {
                customer_ref: "cus_1".to_string(),
                subscription_ref: "sub_1".to_string(),
            })
            .await
            .unwrap();

        let saved = saved.lock().unwrap().clone().unwrap();
        assert_eq!(saved.id, subscriber_id);
        assert_eq!(saved.entitlements.len(), 1);
        assert_eq!(saved.entitlements[0].billing_ref, "sub_1");
    }

    #[tokio::test]
    async fn lock_contention_is_absorbed_by_the_process_boundary() {
        let subscriber = sample_subscriber("cus_1");
        let mut repo = MockSubscriberRepository::new();
        repo.expect_find_by_billing_customer_ref()
            .returning(move |_| {
                let subscriber = subscriber.clone();
                Box::pin(async move { Ok(Some(subscriber)) })
            });
        repo.expect_try_acquire_lock()
            .returning(|_, _, _, _| Box::pin(async { Ok(false) }));
        repo.expect_save().never();

        let gateway = MockBillingGateway::new();
        let reconciler = reconciler_with(repo, gateway);

        // `process` must swallow the contention; `apply_event` reports it.
        reconciler
            .process(BillingEvent::SubscriptionUpdated(snapshot("cus_1", "sub_1")))
            .await;
        let result = reconciler
            .apply_event(BillingEvent::SubscriptionUpdated(snapshot("cus_1", "sub_1")))
            .await;
        assert!(matches!(result, Err(DomainError::LockContention)));
    }
}
