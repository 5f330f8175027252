use std::{sync::Arc, time::Duration};

use anyhow::Result;
use application::usecases::recall_fanout::RecallFanout;
use chrono::Utc;
use domain::repositories::{
    dispatches::DispatchSink, population::PopulationStore, recalls::RecallStore,
};
use tracing::{debug, error, info};

/// Polls for published-but-undispatched recalls and fans each one out to
/// the dispatch queue. Failed passes are logged and retried on the next
/// tick; the recalls involved stay undispatched.
pub async fn run_fanout_loop<Pop, Rs, D>(
    fanout: Arc<RecallFanout<Pop, Rs, D>>,
    poll_interval_secs: u64,
) -> Result<()>
where
    Pop: PopulationStore + Send + Sync + 'static,
    Rs: RecallStore + Send + Sync + 'static,
    D: DispatchSink + Send + Sync + 'static,
{
    info!(poll_interval_secs, "fanout_loop: started");
    loop {
        match fanout.dispatch_pending(Utc::now()).await {
            Ok(0) => debug!("fanout_loop: nothing to dispatch"),
            Ok(dispatched) => info!(dispatched, "fanout_loop: pass finished"),
            Err(error) => error!("Error while dispatching pending recalls: {}", error),
        }

        tokio::time::sleep(Duration::from_secs(poll_interval_secs)).await;
    }
}
