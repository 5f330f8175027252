use std::sync::Arc;

use anyhow::Result;
use application::usecases::{recall_fanout::RecallFanout, targeting::TargetingEngine};
use infra::postgres::postgres_connection;
use infra::postgres::repositories::{
    dispatches::DispatchPostgres, population::PopulationPostgres, recalls::RecallPostgres,
};
use tracing::{error, info};
use worker::config::config_loader;
use worker::services::fanout_loop;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        error!("Worker exited with error: {}", error);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    observability::init_observability("worker")?;

    let dotenvy_env = config_loader::load()?;
    info!("ENV has been loaded");

    let postgres_pool = Arc::new(postgres_connection::establish_connection(
        &dotenvy_env.database.url,
        dotenvy_env.database.max_connections,
    )?);
    info!("Postgres connection has been established");

    let population = Arc::new(PopulationPostgres::new(Arc::clone(&postgres_pool)));
    let targeting = Arc::new(TargetingEngine::new(
        population,
        dotenvy_env.entitlements.grace_days,
        dotenvy_env.targeting.page_size,
    ));
    let fanout = Arc::new(RecallFanout::new(
        targeting,
        Arc::new(RecallPostgres::new(Arc::clone(&postgres_pool))),
        Arc::new(DispatchPostgres::new(Arc::clone(&postgres_pool))),
        dotenvy_env.targeting.scan_budget_secs,
    ));

    fanout_loop::run_fanout_loop(fanout, dotenvy_env.worker.poll_interval_secs).await?;

    Ok(())
}
