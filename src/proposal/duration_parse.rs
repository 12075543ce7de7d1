//! Duration parsing for voting periods and policy ages
//!
//! Supports human-readable durations like "1 hour", "7 days", "30s".
//! Used for proposal voting periods and the duration keys of the protocol
//! configuration.

use std::time::Duration;

/// Parse a voting period.
///
/// Supports:
/// - "none", "off" or "0" → `None` (no deadline)
/// - Human-readable formats via humantime crate (e.g., "1 hour", "7 days", "1h", "7d")
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use zkmpa::proposal::duration_parse::parse_voting_period;
///
/// assert_eq!(parse_voting_period("off").unwrap(), None);
/// assert_eq!(parse_voting_period("1 hour").unwrap(), Some(Duration::from_secs(3600)));
/// assert_eq!(parse_voting_period("7d").unwrap(), Some(Duration::from_secs(604800)));
/// ```
pub fn parse_voting_period(input: &str) -> Result<Option<Duration>, String> {
    let input = input.trim();
    if input == "none" || input == "off" || input == "0" {
        return Ok(None);
    }
    parse_duration(input).map(Some)
}

/// Parse a non-zero human-readable duration.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let duration = humantime::parse_duration(input.trim())
        .map_err(|e| format!("Invalid duration '{}': {}", input, e))?;
    if duration.is_zero() {
        return Err(format!("Invalid duration '{}': must be non-zero", input));
    }
    Ok(duration)
}

/// Serde adapter: `Duration` as a humantime string ("30s", "30days").
pub mod humantime_str {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(D::Error::custom)
    }
}

/// Serde adapter: `Option<Duration>` as a humantime string or "none".
pub mod humantime_opt {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        d: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => serializer.serialize_str(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_str("none"),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_voting_period(&s).map_err(D::Error::custom)
    }
}
