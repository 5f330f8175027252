use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use domain::repositories::population::{EntitlementKind, PopulationFilter, PopulationStore};
use domain::value_objects::enums::subscriber_roles::SubscriberRole;
use domain::value_objects::recalls::{AlertChannel, RecallModel, TargetingOptions};
use domain::value_objects::subscribers::SubscriberModel;
use domain::value_objects::vehicles::VehicleKey;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TargetingError {
    #[error("targeting deadline exceeded")]
    DeadlineExceeded,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type TargetingResult<T> = std::result::Result<T, TargetingError>;

/// Computes which subscribers a recall should reach.
///
/// Works as a keyset-paged scan over the population store so populations in
/// the tens of thousands never sit in memory at once. The scan is read-only
/// and lock-free; it may run concurrently with reconciliation and is
/// best-effort as of scan start. A store failure aborts the whole
/// invocation: a partially scanned target set is never returned.
pub struct TargetingEngine<Pop>
where
    Pop: PopulationStore + Send + Sync + 'static,
{
    population: Arc<Pop>,
    grace_window: Duration,
    page_size: i64,
}

impl<Pop> TargetingEngine<Pop>
where
    Pop: PopulationStore + Send + Sync + 'static,
{
    pub fn new(population: Arc<Pop>, grace_days: i64, page_size: i64) -> Self {
        Self {
            population,
            grace_window: Duration::days(grace_days.max(0)),
            page_size: page_size.max(1),
        }
    }

    /// Subscribers whose preferences and entitlements intersect the
    /// recall's attributes.
    pub async fn find_interested(
        &self,
        recall: &RecallModel,
        options: &TargetingOptions,
    ) -> TargetingResult<HashSet<Uuid>> {
        let filter = self.store_filter(recall, options);
        let interested = self
            .scan(&filter, options, |subscriber| {
                self.matches_recall(subscriber, recall, options)
            })
            .await?;

        info!(
            recall_id = %recall.id,
            interested_count = interested.len(),
            "targeting: recall scan finished"
        );
        Ok(interested)
    }

    /// Vehicle-campaign variant: matches on vehicle entitlement plus key
    /// intersection instead of the attribute dimensions.
    pub async fn find_vehicle_interested(
        &self,
        recall: &RecallModel,
        options: &TargetingOptions,
    ) -> TargetingResult<HashSet<Uuid>> {
        let affected: HashSet<&VehicleKey> = recall.vehicle_keys.iter().collect();
        if affected.is_empty() {
            return Ok(HashSet::new());
        }

        let filter = PopulationFilter {
            roles: self.role_filter(options),
            confirmed_email_only: matches!(options.channel, Some(AlertChannel::Email)),
            entitled: Some(EntitlementKind::Vehicle),
        };

        let interested = self
            .scan(&filter, options, |subscriber| {
                self.matches_vehicle(subscriber, &affected, options)
            })
            .await?;

        info!(
            recall_id = %recall.id,
            interested_count = interested.len(),
            "targeting: vehicle campaign scan finished"
        );
        Ok(interested)
    }

    /// Whether any subscriber other than `excluding` already watches `key`.
    /// Backs the "only the first watcher triggers a recall lookup" policy
    /// for vehicle slots.
    pub async fn key_already_watched(
        &self,
        key: &VehicleKey,
        excluding: Uuid,
    ) -> TargetingResult<bool> {
        let filter = PopulationFilter {
            roles: Vec::new(),
            confirmed_email_only: false,
            entitled: Some(EntitlementKind::Vehicle),
        };
        let now = Utc::now();

        let mut cursor: Option<Uuid> = None;
        loop {
            let page = self
                .population
                .scan_page(&filter, cursor, self.page_size)
                .await?;
            let page_len = page.len();

            for subscriber in &page {
                if subscriber.id != excluding
                    && subscriber
                        .active_vehicle_keys(now, self.grace_window)
                        .contains(&key)
                {
                    return Ok(true);
                }
            }

            cursor = page.last().map(|subscriber| subscriber.id);
            if page_len < self.page_size as usize {
                return Ok(false);
            }
        }
    }

    async fn scan<F>(
        &self,
        filter: &PopulationFilter,
        options: &TargetingOptions,
        is_match: F,
    ) -> TargetingResult<HashSet<Uuid>>
    where
        F: Fn(&SubscriberModel) -> bool,
    {
        let mut interested = HashSet::new();
        let mut cursor: Option<Uuid> = None;
        let mut scanned: usize = 0;

        loop {
            if let Some(deadline) = options.deadline {
                if Utc::now() > deadline {
                    return Err(TargetingError::DeadlineExceeded);
                }
            }

            let page = self
                .population
                .scan_page(filter, cursor, self.page_size)
                .await?;
            let page_len = page.len();
            scanned += page_len;

            for subscriber in &page {
                if is_match(subscriber) {
                    interested.insert(subscriber.id);
                }
            }

            cursor = page.last().map(|subscriber| subscriber.id);
            if page_len < self.page_size as usize {
                break;
            }
        }

        debug!(scanned, matched = interested.len(), "targeting: scan complete");
        Ok(interested)
    }

    fn store_filter(&self, recall: &RecallModel, options: &TargetingOptions) -> PopulationFilter {
        PopulationFilter {
            roles: self.role_filter(options),
            confirmed_email_only: matches!(options.channel, Some(AlertChannel::Email)),
            // Elevated roles bypass the entitlement requirement, so the
            // store-side predicate is only safe when they are excluded.
            entitled: if recall.restricted && !options.include_elevated {
                Some(EntitlementKind::Recall)
            } else {
                None
            },
        }
    }

    fn role_filter(&self, options: &TargetingOptions) -> Vec<SubscriberRole> {
        if options.include_elevated {
            vec![
                SubscriberRole::Member,
                SubscriberRole::Worker,
                SubscriberRole::Admin,
            ]
        } else {
            vec![SubscriberRole::Member]
        }
    }

    fn matches_recall(
        &self,
        subscriber: &SubscriberModel,
        recall: &RecallModel,
        options: &TargetingOptions,
    ) -> bool {
        if !self.passes_base_filter(subscriber, options) {
            return false;
        }

        if recall.restricted
            && !subscriber.role.is_elevated()
            && subscriber
                .recall_entitlement(options.as_of, self.grace_window)
                .is_none()
        {
            return false;
        }

        let preferences = &subscriber.preferences;
        intersects(&preferences.audiences, &recall.audiences)
            && intersects(&preferences.categories, &recall.categories)
            && intersects(&preferences.distributions, &recall.distributions)
            && intersects(&preferences.risk_levels, &recall.risk_levels)
            && self.passes_channel_filter(subscriber, options, false)
    }

    fn matches_vehicle(
        &self,
        subscriber: &SubscriberModel,
        affected: &HashSet<&VehicleKey>,
        options: &TargetingOptions,
    ) -> bool {
        if !self.passes_base_filter(subscriber, options) {
            return false;
        }

        if !subscriber.has_vehicle_entitlement(options.as_of, self.grace_window) {
            return false;
        }

        let watches_affected_key = subscriber
            .active_vehicle_keys(options.as_of, self.grace_window)
            .iter()
            .any(|key| affected.contains(key));

        watches_affected_key && self.passes_channel_filter(subscriber, options, true)
    }

    fn passes_base_filter(&self, subscriber: &SubscriberModel, options: &TargetingOptions) -> bool {
        match subscriber.role {
            SubscriberRole::Guest => false,
            SubscriberRole::Member => true,
            SubscriberRole::Worker | SubscriberRole::Admin => options.include_elevated,
        }
    }

    fn passes_channel_filter(
        &self,
        subscriber: &SubscriberModel,
        options: &TargetingOptions,
        vehicle: bool,
    ) -> bool {
        let preferences = &subscriber.preferences;
        if options.summary_only {
            let opted_in = if vehicle {
                preferences.send_vehicle_summary
            } else {
                preferences.send_summary
            };
            if !opted_in {
                return false;
            }
        }
        if vehicle && options.channel.is_some() && !preferences.alert_for_vehicles {
            return false;
        }
        match options.channel {
            None => true,
            Some(AlertChannel::Email) => {
                preferences.alert_by_email && subscriber.email_confirmed_at.is_some()
            }
            Some(AlertChannel::Phone) => preferences.alert_by_phone && subscriber.phone.is_some(),
        }
    }
}

fn intersects(preference_tags: &[String], recall_tags: &[String]) -> bool {
    // A recall with an empty dimension matches everyone on that dimension.
    if recall_tags.is_empty() {
        return true;
    }
    recall_tags.iter().any(|tag| preference_tags.contains(tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use domain::repositories::population::MockPopulationStore;
    use domain::value_objects::entitlements::EntitlementModel;
    use domain::value_objects::enums::entitlement_statuses::EntitlementStatus;
    use domain::value_objects::plans::PlanModel;
    use domain::value_objects::subscribers::NotificationPreferences;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn entitlement(recall_feature: bool, slot_count: i32, expires_at: DateTime<Utc>) -> EntitlementModel {
        let plan = PlanModel {
            id: "recall-basic".to_string(),
            name: None,
            recall_feature,
            vehicle_slot_count: slot_count,
            interval: Default::default(),
            duration_days: 30,
            is_active: true,
        };
        let mut entitlement = EntitlementModel::from_plan(&plan, now() - Duration::days(10)).unwrap();
        entitlement.status = EntitlementStatus::Active;
        entitlement.expires_at = expires_at;
        entitlement
    }

    fn subscriber(
        audiences: &[&str],
        categories: &[&str],
        entitlements: Vec<EntitlementModel>,
    ) -> SubscriberModel {
        SubscriberModel {
            id: Uuid::new_v4(),
            email: "member@example.com".to_string(),
            role: SubscriberRole::Member,
            phone: None,
            email_confirmed_at: Some(now()),
            billing_customer_ref: Some("cus_1".to_string()),
            preferences: NotificationPreferences {
                audiences: audiences.iter().map(|s| s.to_string()).collect(),
                categories: categories.iter().map(|s| s.to_string()).collect(),
                distributions: vec!["nationwide".to_string()],
                risk_levels: vec!["high".to_string()],
                alert_by_email: true,
                alert_by_phone: false,
                send_summary: true,
                alert_for_vehicles: true,
                send_vehicle_summary: true,
            },
            entitlements,
            lock_owner: None,
            lock_expires_at: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn recall(audiences: &[&str], categories: &[&str]) -> RecallModel {
        RecallModel {
            id: Uuid::new_v4(),
            title: None,
            audiences: audiences.iter().map(|s| s.to_string()).collect(),
            categories: categories.iter().map(|s| s.to_string()).collect(),
            distributions: vec![],
            risk_levels: vec![],
            vehicle_keys: vec![],
            restricted: true,
            published_at: now(),
            dispatched_at: None,
        }
    }

    fn engine_over(population: Vec<SubscriberModel>) -> TargetingEngine<MockPopulationStore> {
        engine_with_page_size(population, 100)
    }

    fn engine_with_page_size(
        mut population: Vec<SubscriberModel>,
        page_size: i64,
    ) -> TargetingEngine<MockPopulationStore> {
        population.sort_by_key(|subscriber| subscriber.id);
        let mut store = MockPopulationStore::new();
        store
            .expect_scan_page()
            .returning(move |_, after, limit| {
                let page: Vec<SubscriberModel> = population
                    .iter()
                    .filter(|subscriber| after.map_or(true, |cursor| subscriber.id > cursor))
                    .take(limit as usize)
                    .cloned()
                    .collect();
                Box::pin(async move { Ok(page) })
            });
        TargetingEngine::new(Arc::new(store), 3, page_size)
    }

    #[tokio::test]
    async fn matches_only_active_entitled_subscribers_with_intersecting_tags() {
        let active = entitlement(true, 0, now() + Duration::days(20));
        let expired = entitlement(true, 0, now() - Duration::days(20));

        let a = subscriber(&["consumers"], &["food"], vec![active.clone()]);
        let b = subscriber(&["professionals"], &["food"], vec![active.clone()]);
        let c = subscriber(&["consumers"], &["food"], vec![expired]);
        let a_id = a.id;

        let engine = engine_over(vec![a, b, c]);
        let result = engine
            .find_interested(
                &recall(&["consumers"], &["food"]),
                &TargetingOptions::at(now()),
            )
            .await
            .unwrap();

        assert_eq!(result, HashSet::from([a_id]));
    }

    #[tokio::test]
    async fn result_is_stable_across_repeated_invocations() {
        let active = entitlement(true, 0, now() + Duration::days(20));
        let population: Vec<SubscriberModel> = (0..7)
            .map(|_| subscriber(&["consumers"], &["food"], vec![active.clone()]))
            .collect();

        let engine = engine_with_page_size(population, 2);
        let recall = recall(&["consumers"], &["food"]);
        let options = TargetingOptions::at(now());

        let first = engine.find_interested(&recall, &options).await.unwrap();
        assert_eq!(first.len(), 7);
        for _ in 0..5 {
            let again = engine.find_interested(&recall, &options).await.unwrap();
            assert_eq!(again, first);
        }
    }

    #[tokio::test]
    async fn elevated_roles_bypass_the_entitlement_check() {
        let mut staff = subscriber(&["consumers"], &["food"], vec![]);
        staff.role = SubscriberRole::Worker;
        let staff_id = staff.id;

        let mut lapsed_member = subscriber(&["consumers"], &["food"], vec![]);
        lapsed_member.role = SubscriberRole::Member;

        let engine = engine_over(vec![staff, lapsed_member]);
        let result = engine
            .find_interested(
                &recall(&["consumers"], &["food"]),
                &TargetingOptions::at(now()),
            )
            .await
            .unwrap();

        assert_eq!(result, HashSet::from([staff_id]));
    }

    #[tokio::test]
    async fn guests_never_match() {
        let mut guest = subscriber(
            &["consumers"],
            &["food"],
            vec![entitlement(true, 0, now() + Duration::days(20))],
        );
        guest.role = SubscriberRole::Guest;

        let engine = engine_over(vec![guest]);
        let result = engine
            .find_interested(
                &recall(&["consumers"], &["food"]),
                &TargetingOptions::at(now()),
            )
            .await
            .unwrap();

        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn empty_recall_dimension_matches_everyone_on_that_dimension() {
        let active = entitlement(true, 0, now() + Duration::days(20));
        let a = subscriber(&["consumers"], &["food"], vec![active]);
        let a_id = a.id;

        let engine = engine_over(vec![a]);
        let result = engine
            .find_interested(&recall(&[], &[]), &TargetingOptions::at(now()))
            .await
            .unwrap();

        assert_eq!(result, HashSet::from([a_id]));
    }

    #[tokio::test]
    async fn channel_refinement_requires_confirmed_contact() {
        let active = entitlement(true, 0, now() + Duration::days(20));
        let confirmed = subscriber(&["consumers"], &["food"], vec![active.clone()]);
        let confirmed_id = confirmed.id;

        let mut unconfirmed = subscriber(&["consumers"], &["food"], vec![active.clone()]);
        unconfirmed.email_confirmed_at = None;

        let mut opted_out = subscriber(&["consumers"], &["food"], vec![active]);
        opted_out.preferences.alert_by_email = false;

        let engine = engine_over(vec![confirmed, unconfirmed, opted_out]);
        let result = engine
            .find_interested(
                &recall(&["consumers"], &["food"]),
                &TargetingOptions::at(now()).with_channel(AlertChannel::Email),
            )
            .await
            .unwrap();

        assert_eq!(result, HashSet::from([confirmed_id]));
    }

    #[tokio::test]
    async fn vehicle_campaigns_match_on_key_intersection() {
        let affected = VehicleKey::new("honda", "civic", 2019).unwrap();
        let other = VehicleKey::new("ford", "fiesta", 2015).unwrap();

        let mut watcher_entitlement = entitlement(false, 2, now() + Duration::days(20));
        watcher_entitlement
            .set_vehicle_slot(0, Some(affected.clone()), false, now())
            .unwrap();
        let watcher = subscriber(&[], &[], vec![watcher_entitlement]);
        let watcher_id = watcher.id;

        let mut bystander_entitlement = entitlement(false, 2, now() + Duration::days(20));
        bystander_entitlement
            .set_vehicle_slot(0, Some(other), false, now())
            .unwrap();
        let bystander = subscriber(&[], &[], vec![bystander_entitlement]);

        let mut campaign = recall(&[], &[]);
        campaign.vehicle_keys = vec![affected];

        let engine = engine_over(vec![watcher, bystander]);
        let result = engine
            .find_vehicle_interested(&campaign, &TargetingOptions::at(now()))
            .await
            .unwrap();

        assert_eq!(result, HashSet::from([watcher_id]));
    }

    #[tokio::test]
    async fn key_already_watched_ignores_the_asking_subscriber() {
        let key = VehicleKey::new("honda", "civic", 2019).unwrap();
        let mut watcher_entitlement = entitlement(false, 1, now() + Duration::days(20));
        watcher_entitlement
            .set_vehicle_slot(0, Some(key.clone()), false, now())
            .unwrap();
        let watcher = subscriber(&[], &[], vec![watcher_entitlement]);
        let watcher_id = watcher.id;

        let engine = engine_over(vec![watcher]);

        assert!(!engine.key_already_watched(&key, watcher_id).await.unwrap());
        assert!(engine.key_already_watched(&key, Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn expired_deadline_aborts_the_scan() {
        let engine = engine_over(vec![subscriber(&["consumers"], &["food"], vec![])]);
        let options = TargetingOptions::at(now()).with_deadline(Utc::now() - Duration::seconds(1));

        let result = engine.find_interested(&recall(&[], &[]), &options).await;
        assert!(matches!(result, Err(TargetingError::DeadlineExceeded)));
    }
}
