//! Timestamp conversions.
//!
//! Timestamps travel as signed 64-bit milliseconds since `1970-01-01T00:00:00Z`
//! and are only turned into calendar time at the presentation boundary.

use chrono::{DateTime, TimeZone, Utc};

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Marks a value that carries no timestamp (e.g. rows produced by `Get`).
pub const UNSET: Timestamp = i64::MIN;

/// Calendar ticks (100 ns) from `0001-01-01T00:00:00Z` to the Unix epoch.
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Calendar ticks per millisecond.
pub const TICKS_PER_MILLISECOND: i64 = 10_000;

pub fn now() -> Timestamp {
    Utc::now().timestamp_millis()
}

pub fn from_datetime(datetime: &DateTime<Utc>) -> Timestamp {
    datetime.timestamp_millis()
}

/// `None` for [`UNSET`] and for values outside chrono's range.
pub fn to_datetime(timestamp: Timestamp) -> Option<DateTime<Utc>> {
    if timestamp == UNSET {
        return None;
    }
    Utc.timestamp_millis_opt(timestamp).single()
}

/// Converts 100-ns calendar ticks (counted from year 1) to a timestamp.
pub fn from_ticks(ticks: i64) -> Timestamp {
    ticks.saturating_sub(UNIX_EPOCH_TICKS) / TICKS_PER_MILLISECOND
}

pub fn to_ticks(timestamp: Timestamp) -> i64 {
    timestamp
        .saturating_mul(TICKS_PER_MILLISECOND)
        .saturating_add(UNIX_EPOCH_TICKS)
}

/// Renders `yyyy-MM-dd HH:mm:ss.fff` (UTC), or an empty string when the
/// timestamp is unset or out of range.
pub fn format(timestamp: Timestamp) -> String {
    to_datetime(timestamp)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_default()
}
