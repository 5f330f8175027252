#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub worker: WorkerSettings,
    pub database: Database,
    pub entitlements: EntitlementSettings,
    pub targeting: TargetingSettings,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct EntitlementSettings {
    /// Days past the billed expiration during which an entitlement still
    /// counts as active.
    pub grace_days: i64,
}

#[derive(Debug, Clone)]
pub struct TargetingSettings {
    pub page_size: i64,
    pub scan_budget_secs: i64,
}
