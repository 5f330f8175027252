use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use domain::repositories::plans::PlanCatalog;
use domain::value_objects::plans::PlanModel;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Explicitly-owned cache over the external plan catalog.
///
/// The catalog is small and changes rarely, but a lookup sits on the hot
/// path of every reconciliation. Entries are reloaded in bulk once the
/// cache is older than `max_age`; within that window lookups may serve
/// catalog state up to `max_age` stale. Misses always fall through to the
/// catalog so a brand-new plan is usable before the next refresh.
pub struct PlanCache<P>
where
    P: PlanCatalog + Send + Sync + 'static,
{
    catalog: Arc<P>,
    max_age: Duration,
    state: RwLock<CacheState>,
}

struct CacheState {
    plans: HashMap<String, PlanModel>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl<P> PlanCache<P>
where
    P: PlanCatalog + Send + Sync + 'static,
{
    pub fn new(catalog: Arc<P>, max_age_seconds: i64) -> Self {
        Self {
            catalog,
            max_age: Duration::seconds(max_age_seconds.max(0)),
            state: RwLock::new(CacheState {
                plans: HashMap::new(),
                refreshed_at: None,
            }),
        }
    }

    /// Drops and reloads every active plan.
    pub async fn refresh(&self) -> Result<()> {
        let plans = self.catalog.list_active_plans().await?;
        let plan_count = plans.len();

        let mut state = self.state.write().await;
        state.plans = plans
            .into_iter()
            .map(|plan| (plan.id.clone(), plan))
            .collect();
        state.refreshed_at = Some(Utc::now());

        info!(plan_count, "plan_cache: refreshed from catalog");
        Ok(())
    }

    pub async fn plan_by_id(&self, plan_id: &str) -> Result<Option<PlanModel>> {
        if self.is_stale().await {
            self.refresh().await?;
        }

        if let Some(plan) = self.state.read().await.plans.get(plan_id) {
            return Ok(Some(plan.clone()));
        }

        // Unknown to the cached active set; ask the catalog directly so
        // plans added (or retired) since the last refresh still resolve.
        debug!(plan_id, "plan_cache: miss, querying catalog");
        self.catalog.plan_by_id(plan_id).await
    }

    async fn is_stale(&self) -> bool {
        match self.state.read().await.refreshed_at {
            Some(refreshed_at) => Utc::now() - refreshed_at > self.max_age,
            None => true,
        }
    }
}
