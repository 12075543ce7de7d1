//! Wall-clock helpers. All persisted timestamps are Unix milliseconds.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Whether a timestamp is older than `max_age` at `now`.
pub fn is_older_than(timestamp: u64, max_age: Duration, now: u64) -> bool {
    now.saturating_sub(timestamp) > max_age.as_millis() as u64
}
