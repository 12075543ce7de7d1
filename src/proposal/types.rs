//! Proposal value types: ids, vote types, statuses, votes, filters.

use crate::group::MerkleRoot;
use crate::proof::{ExternalNullifier, MembershipProof, Nullifier, Proof};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Content-derived, unpredictable proposal id: `SHA-256(content ‖ nonce)`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProposalId(#[serde(with = "crate::serialization::hex32")] [u8; 32]);

impl ProposalId {
    /// Derive an id from canonical content bytes and a random nonce.
    pub fn derive(content: &[u8], nonce: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        hasher.update(nonce);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProposalId({})", hex::encode(self.0))
    }
}

impl FromStr for ProposalId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::serialization::decode_hex32(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Approve,
    Reject,
}

impl VoteType {
    pub const ALL: [VoteType; 2] = [VoteType::Approve, VoteType::Reject];

    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Approve => "approve",
            VoteType::Reject => "reject",
        }
    }

    /// Public scope for this vote type on a proposal:
    /// `SHA-256(vote type ‖ hex(proposal id))`.
    pub fn external_nullifier(&self, proposal_id: &ProposalId) -> ExternalNullifier {
        let mut hasher = Sha256::new();
        hasher.update(self.as_str().as_bytes());
        hasher.update(proposal_id.to_string().as_bytes());
        ExternalNullifier::from_bytes(hasher.finalize().into())
    }

    /// Message a vote proof must bind: `"<vote type>:<proposal id>"`.
    pub fn signal(&self, proposal_id: &ProposalId) -> String {
        format!("{}:{}", self.as_str(), proposal_id)
    }
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(VoteType::Approve),
            "reject" => Ok(VoteType::Reject),
            other => Err(format!("unknown vote type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl ProposalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProposalStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two public scopes of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalNullifiers {
    pub approve: ExternalNullifier,
    pub reject: ExternalNullifier,
}

impl ExternalNullifiers {
    pub fn derive(proposal_id: &ProposalId) -> Self {
        Self {
            approve: VoteType::Approve.external_nullifier(proposal_id),
            reject: VoteType::Reject.external_nullifier(proposal_id),
        }
    }

    pub fn get(&self, vote_type: VoteType) -> &ExternalNullifier {
        match vote_type {
            VoteType::Approve => &self.approve,
            VoteType::Reject => &self.reject,
        }
    }
}

/// One anonymous vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub proof: Proof,
    pub vote_type: VoteType,
    pub nullifier_hash: Nullifier,
    pub merkle_tree_root: MerkleRoot,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl Vote {
    /// Vote carrying a real proof; nullifier and root are taken from it.
    pub fn new(proof: MembershipProof, vote_type: VoteType, timestamp: u64) -> Self {
        Self {
            nullifier_hash: proof.nullifier,
            merkle_tree_root: proof.merkle_tree_root,
            proof: Proof::Real(proof),
            vote_type,
            timestamp,
        }
    }
}

/// Parameters for a new proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalParams {
    pub group_id: String,
    /// Opaque claims payload, typically the credential subject to issue.
    pub content: serde_json::Value,
    pub approval_threshold: u32,
    /// Frozen from the group's live member count when absent.
    pub total_members: Option<u32>,
    pub voting_period: Option<Duration>,
}

impl ProposalParams {
    pub fn new(
        group_id: impl Into<String>,
        content: serde_json::Value,
        approval_threshold: u32,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            content,
            approval_threshold,
            total_members: None,
            voting_period: None,
        }
    }

    pub fn with_total_members(mut self, n: u32) -> Self {
        self.total_members = Some(n);
        self
    }

    pub fn with_voting_period(mut self, period: Duration) -> Self {
        self.voting_period = Some(period);
        self
    }
}

/// Filter for listing proposals. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalFilter {
    pub group_id: Option<String>,
    pub status: Option<ProposalStatus>,
    pub created_after: Option<u64>,
    pub created_before: Option<u64>,
}

/// Outcome of an accepted vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub proposal_id: ProposalId,
    pub vote_type: VoteType,
    pub status: ProposalStatus,
    pub approvals: usize,
    pub rejections: usize,
    /// True only for the vote that moved the proposal out of pending.
    pub decided: bool,
}

/// Terminal summary returned by finalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalResult {
    pub proposal_id: ProposalId,
    pub status: ProposalStatus,
    pub approvals: usize,
    pub rejections: usize,
    pub finalized_at: u64,
}
