//! Proposal record and its state machine.
//!
//! ```text
//!            approvals >= m
//!         ┌──────────────────► Approved
//! Pending ┼──────────────────► Rejected   rejections > n - m
//!         └──────────────────► Expired    deadline passed, neither fired
//! ```
//!
//! All three outcomes are terminal. The approval rule is evaluated first, so
//! a vote that satisfies both rules approves.

use super::types::{ExternalNullifiers, ProposalId, ProposalStatus, Vote, VoteType};
use crate::group::{Commitment, MerkleRoot};
use crate::proof::Nullifier;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub group_id: String,
    pub content: serde_json::Value,
    /// m
    pub approval_threshold: u32,
    /// n, frozen at creation
    pub total_members: u32,
    pub status: ProposalStatus,
    pub merkle_root_at_creation: MerkleRoot,
    /// Leaf layout behind `merkle_root_at_creation`; votes are proven
    /// against this tree.
    #[serde(default)]
    pub voter_leaves: Vec<Option<Commitment>>,
    pub external_nullifiers: ExternalNullifiers,
    pub approvals: Vec<Vote>,
    pub rejections: Vec<Vote>,
    pub created_at: u64,
    /// Time of the last state change (vote or transition).
    pub updated_at: u64,
    #[serde(default)]
    pub expires_at: Option<u64>,
}

impl Proposal {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ProposalId,
        group_id: String,
        content: serde_json::Value,
        approval_threshold: u32,
        total_members: u32,
        merkle_root_at_creation: MerkleRoot,
        created_at: u64,
        expires_at: Option<u64>,
    ) -> Self {
        Self {
            id,
            group_id,
            content,
            approval_threshold,
            total_members,
            status: ProposalStatus::Pending,
            merkle_root_at_creation,
            voter_leaves: Vec::new(),
            external_nullifiers: ExternalNullifiers::derive(&id),
            approvals: Vec::new(),
            rejections: Vec::new(),
            created_at,
            updated_at: created_at,
            expires_at,
        }
    }

    /// Freeze the leaf layout that produced `merkle_root_at_creation`.
    pub fn with_voter_leaves(mut self, leaves: Vec<Option<Commitment>>) -> Self {
        self.voter_leaves = leaves;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == ProposalStatus::Pending
    }

    pub fn votes(&self, vote_type: VoteType) -> &[Vote] {
        match vote_type {
            VoteType::Approve => &self.approvals,
            VoteType::Reject => &self.rejections,
        }
    }

    pub fn has_nullifier(&self, vote_type: VoteType, nullifier: &Nullifier) -> bool {
        self.votes(vote_type)
            .iter()
            .any(|v| &v.nullifier_hash == nullifier)
    }

    /// Most rejections compatible with the threshold still being reachable.
    pub fn rejection_limit(&self) -> u32 {
        self.total_members.saturating_sub(self.approval_threshold)
    }

    /// Status the rules give for the current votes at `now`.
    ///
    /// Terminal statuses are sticky: once left, pending is never re-entered.
    pub fn evaluate(&self, now: u64) -> ProposalStatus {
        if self.status.is_terminal() {
            return self.status;
        }
        if self.approvals.len() as u64 >= self.approval_threshold as u64 {
            ProposalStatus::Approved
        } else if self.rejections.len() as u64 > self.rejection_limit() as u64 {
            ProposalStatus::Rejected
        } else if self.expires_at.is_some_and(|deadline| now > deadline) {
            ProposalStatus::Expired
        } else {
            ProposalStatus::Pending
        }
    }

    /// Apply any transition the rules call for. Returns the new status if one
    /// fired.
    pub fn refresh(&mut self, now: u64) -> Option<ProposalStatus> {
        let next = self.evaluate(now);
        if next == self.status {
            return None;
        }
        self.status = next;
        self.updated_at = now;
        Some(next)
    }

    /// Record an already validated vote and re-evaluate. The caller has
    /// checked that the proposal is pending and the nullifier is fresh.
    pub fn record_vote(&mut self, vote: Vote, now: u64) -> Option<ProposalStatus> {
        match vote.vote_type {
            VoteType::Approve => self.approvals.push(vote),
            VoteType::Reject => self.rejections.push(vote),
        }
        self.updated_at = now;
        self.refresh(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::{Nullifier, Proof};
    use proptest::prelude::*;

    fn proposal(m: u32, n: u32, expires_at: Option<u64>) -> Proposal {
        Proposal::new(
            ProposalId::derive(b"content", b"nonce"),
            "g".into(),
            serde_json::json!({"role": "auditor"}),
            m,
            n,
            MerkleRoot::from_bytes([1; 32]),
            1_000,
            expires_at,
        )
    }

    fn vote(vote_type: VoteType, n: u8) -> Vote {
        Vote {
            proof: Proof::Unavailable {
                reason: "state machine test".into(),
            },
            vote_type,
            nullifier_hash: Nullifier::from_bytes([n; 32]),
            merkle_tree_root: MerkleRoot::from_bytes([1; 32]),
            timestamp: 1_000,
        }
    }

    #[test]
    fn test_threshold_reached() {
        let mut p = proposal(2, 3, None);
        assert_eq!(p.record_vote(vote(VoteType::Approve, 1), 1_001), None);
        assert_eq!(p.status, ProposalStatus::Pending);
        assert_eq!(
            p.record_vote(vote(VoteType::Approve, 2), 1_002),
            Some(ProposalStatus::Approved)
        );
        assert_eq!(p.updated_at, 1_002);
    }

    #[test]
    fn test_early_rejection() {
        // n - m = 1, so the second rejection decides
        let mut p = proposal(2, 3, None);
        assert_eq!(p.record_vote(vote(VoteType::Reject, 1), 1_001), None);
        assert_eq!(
            p.record_vote(vote(VoteType::Reject, 2), 1_002),
            Some(ProposalStatus::Rejected)
        );
    }

    #[test]
    fn test_unanimous_threshold_rejects_on_first_reject() {
        let mut p = proposal(3, 3, None);
        assert_eq!(
            p.record_vote(vote(VoteType::Reject, 1), 1_001),
            Some(ProposalStatus::Rejected)
        );
    }

    #[test]
    fn test_approval_checked_before_rejection() {
        let mut p = proposal(1, 1, None);
        p.rejections.push(vote(VoteType::Reject, 9));
        assert_eq!(
            p.record_vote(vote(VoteType::Approve, 1), 1_001),
            Some(ProposalStatus::Approved)
        );
    }

    #[test]
    fn test_expiry() {
        let mut p = proposal(2, 3, Some(5_000));
        assert_eq!(p.refresh(5_000), None);
        assert_eq!(p.refresh(5_001), Some(ProposalStatus::Expired));
        assert_eq!(p.updated_at, 5_001);
    }

    #[test]
    fn test_terminal_is_sticky() {
        let mut p = proposal(1, 3, Some(5_000));
        p.record_vote(vote(VoteType::Approve, 1), 1_001);
        assert_eq!(p.evaluate(10_000), ProposalStatus::Approved);
        assert_eq!(p.refresh(10_000), None);
    }

    #[test]
    fn test_nullifier_lookup_is_per_vote_type() {
        let mut p = proposal(2, 3, None);
        p.record_vote(vote(VoteType::Approve, 1), 1_001);
        assert!(p.has_nullifier(VoteType::Approve, &Nullifier::from_bytes([1; 32])));
        assert!(!p.has_nullifier(VoteType::Reject, &Nullifier::from_bytes([1; 32])));
    }

    proptest! {
        /// The m-th approval, and no earlier one, approves.
        #[test]
        fn prop_threshold_exactness(n in 1u32..20, m_seed in 0u32..20) {
            let m = m_seed % n + 1;
            let mut p = proposal(m, n, None);
            for i in 1..=m {
                let change = p.record_vote(vote(VoteType::Approve, i as u8), 1_000 + i as u64);
                if i < m {
                    prop_assert_eq!(change, None);
                    prop_assert_eq!(p.status, ProposalStatus::Pending);
                } else {
                    prop_assert_eq!(change, Some(ProposalStatus::Approved));
                }
            }
        }

        /// Rejection fires exactly when rejections exceed n - m.
        #[test]
        fn prop_early_rejection(n in 1u32..20, m_seed in 0u32..20) {
            let m = m_seed % n + 1;
            let mut p = proposal(m, n, None);
            for i in 1..=(n - m + 1) {
                let change = p.record_vote(vote(VoteType::Reject, i as u8), 1_000 + i as u64);
                if i <= n - m {
                    prop_assert_eq!(change, None);
                } else {
                    prop_assert_eq!(change, Some(ProposalStatus::Rejected));
                }
            }
        }
    }
}
