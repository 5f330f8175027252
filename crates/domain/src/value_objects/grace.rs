use chrono::{DateTime, Duration, NaiveTime, TimeZone, Timelike, Utc};

/// Expiration with the configured grace window applied.
pub fn effective_expiration(expires_at: DateTime<Utc>, grace: Duration) -> DateTime<Utc> {
    expires_at
        .checked_add_signed(grace)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whether an entitlement expiring at `expires_at` still counts as active at
/// `now`. Pure and monotonic: for a fixed expiration and grace window, once
/// this is true at some instant it is true at every earlier instant.
pub fn is_active(expires_at: DateTime<Utc>, now: DateTime<Utc>, grace: Duration) -> bool {
    now <= effective_expiration(expires_at, grace)
}

/// Drops seconds and sub-second precision. Entitlement timestamps are stored
/// at minute granularity.
pub fn truncate_to_minute(value: DateTime<Utc>) -> DateTime<Utc> {
    value
        .with_second(0)
        .and_then(|v| v.with_nanosecond(0))
        .unwrap_or(value)
}

/// Start of the UTC day containing `value`.
pub fn day_start(value: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&value.date_naive().and_time(NaiveTime::MIN))
}

/// Last minute of the UTC day containing `value`. Period boundaries from the
/// billing provider are widened to day resolution so that clock jitter on
/// their side cannot flip comparisons within a day.
pub fn day_end(value: DateTime<Utc>) -> DateTime<Utc> {
    day_start(value) + Duration::minutes(23 * 60 + 59)
}

/// Sentinel used when no expiration can be derived from a billing snapshot.
pub fn far_future() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
