//! Merkle root history - per-group, append-only ledger of root transitions.
//!
//! Every root a group has ever held is recorded with a timestamp so that a
//! proof or evidence bundle produced against an older root can still be
//! checked after membership has moved on.
//!
//! ## Semantics
//!
//! - **Append-only**: records are never overwritten; a root that recurs gets a
//!   fresh record.
//! - **Monotonic**: an explicit timestamp earlier than the latest record is
//!   clamped to the latest timestamp.
//! - **Indexed**: `root -> latest record` per group for O(1) lookup.
//! - **Never empty after first track**: pruning always keeps the newest record.
//! - **Two tiers**: lookups consult the last `recent_window` records first
//!   (the window published in the group document), then the full archive.

use super::types::{MerkleRoot, RootRecord};
use crate::clock::{is_older_than, now_millis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

/// Which tier answered a root lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootSource {
    Recent,
    Archive,
}

/// A successful root lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootMatch {
    pub record: RootRecord,
    pub source: RootSource,
}

/// Summary of one group's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootHistoryStats {
    pub total: usize,
    pub oldest: Option<u64>,
    pub newest: Option<u64>,
}

#[derive(Debug, Default)]
struct GroupHistory {
    records: Vec<RootRecord>,
    // root -> position of its most recent record
    index: HashMap<MerkleRoot, usize>,
}

impl GroupHistory {
    fn push(&mut self, mut record: RootRecord) -> RootRecord {
        if let Some(last) = self.records.last() {
            record.timestamp = record.timestamp.max(last.timestamp);
        }
        self.index.insert(record.root, self.records.len());
        self.records.push(record.clone());
        record
    }

    fn reindex(&mut self) {
        self.index = self
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.root, i))
            .collect();
    }

    fn find(&self, root: &MerkleRoot, recent_window: usize) -> Option<RootMatch> {
        let recent_start = self.records.len().saturating_sub(recent_window);
        if let Some(record) = self.records[recent_start..]
            .iter()
            .rev()
            .find(|r| &r.root == root)
        {
            return Some(RootMatch {
                record: record.clone(),
                source: RootSource::Recent,
            });
        }
        self.index.get(root).map(|&i| RootMatch {
            record: self.records[i].clone(),
            source: RootSource::Archive,
        })
    }
}

/// Root history for every group.
#[derive(Debug, Default)]
pub struct MerkleRootHistory {
    groups: RwLock<HashMap<String, GroupHistory>>,
}

impl MerkleRootHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a root transition. `timestamp` defaults to now.
    ///
    /// Returns the record as stored (timestamp possibly clamped).
    pub fn track_root(
        &self,
        group_id: &str,
        root: MerkleRoot,
        timestamp: Option<u64>,
    ) -> RootRecord {
        self.track_record(RootRecord {
            group_id: group_id.to_string(),
            root,
            timestamp: timestamp.unwrap_or_else(now_millis),
            block_height: None,
        })
    }

    /// Append a fully formed record, e.g. one loaded from the store.
    pub fn track_record(&self, record: RootRecord) -> RootRecord {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        let stored = groups
            .entry(record.group_id.clone())
            .or_default()
            .push(record);
        tracing::debug!(
            group_id = %stored.group_id,
            root = %stored.root,
            timestamp = stored.timestamp,
            "Tracked merkle root"
        );
        stored
    }

    /// True iff `root` was ever a root of `group_id` and, when `max_age` is
    /// given, its latest record is no older than `max_age`.
    pub fn verify_historical_root(
        &self,
        group_id: &str,
        root: &MerkleRoot,
        max_age: Option<Duration>,
    ) -> bool {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        let Some(history) = groups.get(group_id) else {
            return false;
        };
        match history.index.get(root) {
            Some(&i) => match max_age {
                Some(age) => !is_older_than(history.records[i].timestamp, age, now_millis()),
                None => true,
            },
            None => false,
        }
    }

    /// Two-tier lookup: the newest `recent_window` records, then the archive.
    pub fn find_root(
        &self,
        group_id: &str,
        root: &MerkleRoot,
        recent_window: usize,
    ) -> Option<RootMatch> {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        groups.get(group_id)?.find(root, recent_window)
    }

    /// Drop records older than `max_age`, always keeping the newest one.
    ///
    /// Returns the removed records.
    pub fn prune_old_roots(&self, group_id: &str, max_age: Duration) -> Vec<RootRecord> {
        let now = now_millis();
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        let Some(history) = groups.get_mut(group_id) else {
            return Vec::new();
        };
        // timestamps are monotonic, so stale records form a prefix
        let stale = history
            .records
            .iter()
            .take_while(|r| is_older_than(r.timestamp, max_age, now))
            .count()
            .min(history.records.len().saturating_sub(1));
        if stale == 0 {
            return Vec::new();
        }
        let removed: Vec<RootRecord> = history.records.drain(..stale).collect();
        history.reindex();
        tracing::info!(
            group_id = %group_id,
            pruned = removed.len(),
            remaining = history.records.len(),
            "Pruned old merkle roots"
        );
        removed
    }

    /// Every record for a group, oldest first.
    pub fn get_root_history(&self, group_id: &str) -> Vec<RootRecord> {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        groups
            .get(group_id)
            .map(|h| h.records.clone())
            .unwrap_or_default()
    }

    /// The newest `n` records, oldest first.
    pub fn recent_roots(&self, group_id: &str, n: usize) -> Vec<RootRecord> {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        groups
            .get(group_id)
            .map(|h| h.records[h.records.len().saturating_sub(n)..].to_vec())
            .unwrap_or_default()
    }

    pub fn latest_root(&self, group_id: &str) -> Option<RootRecord> {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        groups.get(group_id)?.records.last().cloned()
    }

    pub fn stats(&self, group_id: &str) -> RootHistoryStats {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        match groups.get(group_id) {
            Some(h) => RootHistoryStats {
                total: h.records.len(),
                oldest: h.records.first().map(|r| r.timestamp),
                newest: h.records.last().map(|r| r.timestamp),
            },
            None => RootHistoryStats {
                total: 0,
                oldest: None,
                newest: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: u64 = 86_400_000;

    fn root(b: u8) -> MerkleRoot {
        MerkleRoot::from_bytes([b; 32])
    }

    #[test]
    fn test_track_and_verify() {
        let history = MerkleRootHistory::new();
        history.track_root("g", root(1), None);

        assert!(history.verify_historical_root("g", &root(1), None));
        assert!(!history.verify_historical_root("g", &root(2), None));
        assert!(!history.verify_historical_root("other", &root(1), None));
    }

    #[test]
    fn test_max_age() {
        let history = MerkleRootHistory::new();
        let now = now_millis();
        history.track_root("g", root(1), Some(now - 40 * DAY_MS));
        history.track_root("g", root(2), Some(now - DAY_MS));

        let thirty_days = Duration::from_secs(30 * 86_400);
        assert!(!history.verify_historical_root("g", &root(1), Some(thirty_days)));
        assert!(history.verify_historical_root("g", &root(1), None));
        assert!(history.verify_historical_root("g", &root(2), Some(thirty_days)));
    }

    #[test]
    fn test_timestamps_clamped_monotonic() {
        let history = MerkleRootHistory::new();
        history.track_root("g", root(1), Some(5_000));
        let stored = history.track_root("g", root(2), Some(1_000));
        assert_eq!(stored.timestamp, 5_000);

        let records = history.get_root_history("g");
        assert!(records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_append_only_recurring_root() {
        let history = MerkleRootHistory::new();
        history.track_root("g", root(1), Some(1_000));
        history.track_root("g", root(2), Some(2_000));
        history.track_root("g", root(1), Some(3_000));

        assert_eq!(history.get_root_history("g").len(), 3);
        let found = history.find_root("g", &root(1), 10).unwrap();
        assert_eq!(found.record.timestamp, 3_000);
    }

    #[test]
    fn test_prune_keeps_most_recent() {
        let history = MerkleRootHistory::new();
        history.track_root("g", root(1), Some(1_000));
        history.track_root("g", root(2), Some(2_000));
        history.track_root("g", root(3), Some(3_000));

        let removed = history.prune_old_roots("g", Duration::from_secs(1));
        assert_eq!(removed.len(), 2);

        let remaining = history.get_root_history("g");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].root, root(3));
        assert!(history.verify_historical_root("g", &root(3), None));
        assert!(!history.verify_historical_root("g", &root(1), None));
    }

    #[test]
    fn test_prune_leaves_fresh_records() {
        let history = MerkleRootHistory::new();
        let now = now_millis();
        history.track_root("g", root(1), Some(now - 10 * DAY_MS));
        history.track_root("g", root(2), Some(now));

        let removed = history.prune_old_roots("g", Duration::from_secs(86_400));
        assert_eq!(removed.len(), 1);
        assert_eq!(history.latest_root("g").unwrap().root, root(2));
        assert!(history
            .prune_old_roots("g", Duration::from_secs(86_400))
            .is_empty());
    }

    #[test]
    fn test_two_tier_lookup() {
        let history = MerkleRootHistory::new();
        for b in 1..=15u8 {
            history.track_root("g", root(b), Some(b as u64 * 1_000));
        }

        let recent = history.find_root("g", &root(14), 10).unwrap();
        assert_eq!(recent.source, RootSource::Recent);

        let archived = history.find_root("g", &root(2), 10).unwrap();
        assert_eq!(archived.source, RootSource::Archive);
        assert_eq!(archived.record.timestamp, 2_000);

        assert!(history.find_root("g", &root(99), 10).is_none());
    }

    #[test]
    fn test_recent_roots_and_stats() {
        let history = MerkleRootHistory::new();
        for b in 1..=5u8 {
            history.track_root("g", root(b), Some(b as u64));
        }
        let recent = history.recent_roots("g", 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].root, root(5));

        let stats = history.stats("g");
        assert_eq!(stats.total, 5);
        assert_eq!(stats.oldest, Some(1));
        assert_eq!(stats.newest, Some(5));
        assert_eq!(history.stats("none").total, 0);
    }
}
