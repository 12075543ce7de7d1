//! Protocol policy configuration.
//!
//! Durations are human-readable strings in serialized form ("30s",
//! "30days"), parsed with humantime.

use crate::proposal::duration_parse::{humantime_opt, humantime_str};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TREE_DEPTH: u8 = 20;
pub const DEFAULT_PROOF_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_ROOT_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);
pub const DEFAULT_RECENT_ROOT_WINDOW: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Depth used when a group is created without one.
    pub default_tree_depth: u8,

    /// Ceiling on each proof generation or verification call.
    #[serde(with = "humantime_str")]
    pub proof_timeout: Duration,

    /// Oldest acceptable evidence root during credential verification.
    #[serde(with = "humantime_opt")]
    pub max_root_age: Option<Duration>,

    /// Oldest acceptable vote root during vote submission.
    #[serde(with = "humantime_opt")]
    pub vote_max_root_age: Option<Duration>,

    /// Records published in the group document and checked first on lookup.
    pub recent_root_window: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            default_tree_depth: DEFAULT_TREE_DEPTH,
            proof_timeout: DEFAULT_PROOF_TIMEOUT,
            max_root_age: Some(DEFAULT_MAX_ROOT_AGE),
            vote_max_root_age: None,
            recent_root_window: DEFAULT_RECENT_ROOT_WINDOW,
        }
    }
}
