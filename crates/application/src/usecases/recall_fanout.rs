use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use domain::repositories::dispatches::DispatchSink;
use domain::repositories::population::PopulationStore;
use domain::repositories::recalls::RecallStore;
use domain::value_objects::enums::dispatch_reasons::DispatchReason;
use domain::value_objects::recalls::{AlertChannel, RecallModel, TargetingOptions};
use tracing::{error, info};
use uuid::Uuid;

use crate::usecases::targeting::{TargetingEngine, TargetingResult};

/// Turns published recalls into dispatch rows.
///
/// For each undispatched recall: compute the alert set (confirmed email
/// channel) and the summary set (summary opt-in, minus anyone already
/// alerted), hand both to the dispatch sink with reason codes, then ack the
/// recall. A recall whose targeting fails stays undispatched and is picked
/// up again on the next pass.
pub struct RecallFanout<Pop, Rs, D>
where
    Pop: PopulationStore + Send + Sync + 'static,
    Rs: RecallStore + Send + Sync + 'static,
    D: DispatchSink + Send + Sync + 'static,
{
    targeting: Arc<TargetingEngine<Pop>>,
    recall_store: Arc<Rs>,
    dispatch: Arc<D>,
    scan_budget: Duration,
}

impl<Pop, Rs, D> RecallFanout<Pop, Rs, D>
where
    Pop: PopulationStore + Send + Sync + 'static,
    Rs: RecallStore + Send + Sync + 'static,
    D: DispatchSink + Send + Sync + 'static,
{
    pub fn new(
        targeting: Arc<TargetingEngine<Pop>>,
        recall_store: Arc<Rs>,
        dispatch: Arc<D>,
        scan_budget_seconds: i64,
    ) -> Self {
        Self {
            targeting,
            recall_store,
            dispatch,
            scan_budget: Duration::seconds(scan_budget_seconds.max(1)),
        }
    }

    /// One pass over everything published but not yet dispatched. Returns
    /// how many recalls were acked.
    pub async fn dispatch_pending(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let recalls = self.recall_store.list_undispatched(now).await?;
        if recalls.is_empty() {
            return Ok(0);
        }

        let mut dispatched = 0;
        for recall in recalls {
            match self.fan_out(&recall, now).await {
                Ok(targets) => {
                    self.dispatch.enqueue(recall.id, &targets).await?;
                    self.recall_store.mark_dispatched(recall.id, now).await?;
                    info!(
                        recall_id = %recall.id,
                        target_count = targets.len(),
                        "fanout: recall dispatched"
                    );
                    dispatched += 1;
                }
                Err(err) => {
                    // No partial result is usable; leave the recall for the
                    // next pass.
                    error!(
                        recall_id = %recall.id,
                        error = ?err,
                        "fanout: targeting failed, recall left undispatched"
                    );
                }
            }
        }
        Ok(dispatched)
    }

    async fn fan_out(
        &self,
        recall: &RecallModel,
        now: DateTime<Utc>,
    ) -> TargetingResult<Vec<(Uuid, DispatchReason)>> {
        // Wall-clock budget; `now` is the logical instant entitlements are
        // evaluated at.
        let deadline = Utc::now() + self.scan_budget;
        let alert_options = TargetingOptions::at(now)
            .with_channel(AlertChannel::Email)
            .with_deadline(deadline);
        let summary_options = TargetingOptions::at(now)
            .summaries_only()
            .with_deadline(deadline);

        let (alerts, summaries) = if recall.is_vehicle_campaign() {
            (
                self.targeting
                    .find_vehicle_interested(recall, &alert_options)
                    .await?,
                self.targeting
                    .find_vehicle_interested(recall, &summary_options)
                    .await?,
            )
        } else {
            (
                self.targeting.find_interested(recall, &alert_options).await?,
                self.targeting
                    .find_interested(recall, &summary_options)
                    .await?,
            )
        };

        let summaries: HashSet<Uuid> = summaries.difference(&alerts).copied().collect();

        let mut targets: Vec<(Uuid, DispatchReason)> = alerts
            .into_iter()
            .map(|subscriber_id| (subscriber_id, DispatchReason::Alert))
            .collect();
        targets.extend(
            summaries
                .into_iter()
                .map(|subscriber_id| (subscriber_id, DispatchReason::Summary)),
        );
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use domain::repositories::dispatches::MockDispatchSink;
    use domain::repositories::population::MockPopulationStore;
    use domain::repositories::recalls::MockRecallStore;
    use domain::value_objects::entitlements::EntitlementModel;
    use domain::value_objects::enums::entitlement_statuses::EntitlementStatus;
    use domain::value_objects::enums::subscriber_roles::SubscriberRole;
    use domain::value_objects::plans::PlanModel;
    use domain::value_objects::subscribers::{NotificationPreferences, SubscriberModel};
    use std::sync::Mutex;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn active_recall_entitlement() -> EntitlementModel {
        let plan = PlanModel {
            id: "recall-basic".to_string(),
            name: None,
            recall_feature: true,
            vehicle_slot_count: 0,
            interval: Default::default(),
            duration_days: 30,
            is_active: true,
        };
        let mut entitlement = EntitlementModel::from_plan(&plan, now() - Duration::days(5)).unwrap();
        entitlement.status = EntitlementStatus::Active;
        entitlement.expires_at = now() + Duration::days(25);
        entitlement
    }

    fn member(alert_by_email: bool, send_summary: bool) -> SubscriberModel {
        SubscriberModel {
            id: Uuid::new_v4(),
            email: "member@example.com".to_string(),
            role: SubscriberRole::Member,
            phone: None,
            email_confirmed_at: Some(now()),
            billing_customer_ref: Some("cus_1".to_string()),
            preferences: NotificationPreferences {
                audiences: vec!["consumers".to_string()],
                categories: vec!["food".to_string()],
                distributions: vec![],
                risk_levels: vec![],
                alert_by_email,
                alert_by_phone: false,
                send_summary,
                alert_for_vehicles: false,
                send_vehicle_summary: false,
            },
            entitlements: vec![active_recall_entitlement()],
            lock_owner: None,
            lock_expires_at: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn sample_recall() -> RecallModel {
        RecallModel {
            id: Uuid::new_v4(),
            title: Some("Contaminated lots".to_string()),
            audiences: vec!["consumers".to_string()],
            categories: vec!["food".to_string()],
            distributions: vec![],
            risk_levels: vec![],
            vehicle_keys: vec![],
            restricted: true,
            published_at: now() - Duration::hours(1),
            dispatched_at: None,
        }
    }

    fn engine_over(population: Vec<SubscriberModel>) -> Arc<TargetingEngine<MockPopulationStore>> {
        let mut store = MockPopulationStore::new();
        store.expect_scan_page().returning(move |_, after, limit| {
            let mut sorted = population.clone();
            sorted.sort_by_key(|subscriber| subscriber.id);
            let page: Vec<SubscriberModel> = sorted
                .into_iter()
                .filter(|subscriber| after.map_or(true, |cursor| subscriber.id > cursor))
                .take(limit as usize)
                .collect();
            Box::pin(async move { Ok(page) })
        });
        Arc::new(TargetingEngine::new(Arc::new(store), 3, 100))
    }

    #[tokio::test]
    async fn alerts_and_summaries_are_disjoint() {
        let alerted = member(true, true);
        let summary_only = member(false, true);
        let neither = member(false, false);
        let alerted_id = alerted.id;
        let summary_id = summary_only.id;

        let recall = sample_recall();
        let recall_id = recall.id;

        let mut recall_store = MockRecallStore::new();
        recall_store
            .expect_list_undispatched()
            .returning(move |_| {
                let recall = recall.clone();
                Box::pin(async move { Ok(vec![recall]) })
            });
        recall_store
            .expect_mark_dispatched()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let enqueued: Arc<Mutex<Vec<(Uuid, DispatchReason)>>> = Arc::new(Mutex::new(Vec::new()));
        let mut dispatch = MockDispatchSink::new();
        {
            let enqueued = Arc::clone(&enqueued);
            dispatch
                .expect_enqueue()
                .times(1)
                .withf(move |id, _| *id == recall_id)
                .returning(move |_, targets| {
                    enqueued.lock().unwrap().extend_from_slice(targets);
                    Box::pin(async { Ok(()) })
                });
        }

        let fanout = RecallFanout::new(
            engine_over(vec![alerted, summary_only, neither]),
            Arc::new(recall_store),
            Arc::new(dispatch),
            60,
        );

        let dispatched = fanout.dispatch_pending(now()).await.unwrap();
        assert_eq!(dispatched, 1);

        let enqueued = enqueued.lock().unwrap();
        assert_eq!(enqueued.len(), 2);
        assert!(enqueued.contains(&(alerted_id, DispatchReason::Alert)));
        assert!(enqueued.contains(&(summary_id, DispatchReason::Summary)));
    }

    #[tokio::test]
    async fn nothing_pending_is_a_quiet_pass() {
        let mut recall_store = MockRecallStore::new();
        recall_store
            .expect_list_undispatched()
            .returning(|_| Box::pin(async { Ok(vec![]) }));

        let fanout = RecallFanout::new(
            engine_over(vec![]),
            Arc::new(recall_store),
            Arc::new(MockDispatchSink::new()),
            60,
        );

        assert_eq!(fanout.dispatch_pending(now()).await.unwrap(), 0);
    }
}
