use anyhow::Result;

use super::config_model::{
    Database, DotEnvyConfig, EntitlementSettings, TargetingSettings, WorkerSettings,
};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let worker = WorkerSettings {
        poll_interval_secs: std::env::var("WORKER_POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()?,
    };

    let database = Database {
        url: std::env::var("DATABASE_URL").expect("DATABASE_URL is invalid"),
        max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?,
    };

    let entitlements = EntitlementSettings {
        grace_days: std::env::var("GRACE_PERIOD_DAYS")
            .unwrap_or_else(|_| "3".to_string())
            .parse()?,
    };

    let targeting = TargetingSettings {
        page_size: std::env::var("TARGETING_PAGE_SIZE")
            .unwrap_or_else(|_| "500".to_string())
            .parse()?,
        scan_budget_secs: std::env::var("TARGETING_SCAN_BUDGET_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()?,
    };

    Ok(DotEnvyConfig {
        worker,
        database,
        entitlements,
        targeting,
    })
}
