//! Error taxonomy for the approval engine.
//!
//! Every failure that crosses the public API is an [`ApprovalError`]. Store,
//! proof-backend and credential-agent errors are wrapped here so callers
//! never see a raw lower-layer error.

use crate::credential::AgentError;
use crate::group::Commitment;
use crate::proof::{Nullifier, ProofError};
use crate::proposal::{ProposalStatus, VoteType};
use crate::store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Result type for engine operations.
pub type ApprovalResult<T> = Result<T, ApprovalError>;

/// Coarse failure classes, stable across variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Group, proposal, member or issued credential absent.
    NotFound,
    /// Duplicate group, member or vote.
    Conflict,
    /// Operation not allowed in the proposal's current state.
    InvalidState,
    /// Stale root, bad proof, malformed input or evidence.
    ValidationFailure,
    /// Proof backend, credential agent or store failed.
    UpstreamFailure,
}

/// Engine errors.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Proposal not found: {0}")]
    ProposalNotFound(String),

    #[error("Member {commitment} not found in group {group_id}")]
    MemberNotFound {
        group_id: String,
        commitment: Commitment,
    },

    #[error("Issued credential not found: {0}")]
    IssuedCredentialNotFound(String),

    #[error("Group {0} already exists")]
    DuplicateGroup(String),

    #[error("Member {commitment} already exists in group {group_id}")]
    DuplicateMember {
        group_id: String,
        commitment: Commitment,
    },

    #[error("Duplicate {vote_type} vote on proposal {proposal_id} (nullifier {nullifier})")]
    DuplicateVote {
        proposal_id: String,
        vote_type: VoteType,
        nullifier: Nullifier,
    },

    #[error("Group {group_id} is full ({capacity} leaves)")]
    GroupFull { group_id: String, capacity: u64 },

    #[error("Proposal {proposal_id} is closed ({status})")]
    ProposalClosed {
        proposal_id: String,
        status: ProposalStatus,
    },

    #[error("Proposal {0} is still pending and its voting period has not ended")]
    StillPending(String),

    #[error("Proposal {proposal_id} is not approved ({status})")]
    NotApproved {
        proposal_id: String,
        status: ProposalStatus,
    },

    #[error("Merkle root {root} is unknown or too old for group {group_id}")]
    StaleOrInvalidRoot { group_id: String, root: String },

    #[error("Invalid proof: {0}")]
    InvalidProof(String),

    #[error("Proof unavailable: {0}")]
    ProofUnavailable(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Invalid commitment: {0}")]
    InvalidCommitment(String),

    #[error("Malformed evidence: {0}")]
    MalformedEvidence(String),

    #[error("Corrupt persisted state: {0}")]
    CorruptState(String),

    #[error("Proof generation timed out after {0:?}")]
    ProofGenerationTimeout(Duration),

    #[error("Proof backend error: {0}")]
    ProofGenerationFailed(#[from] ProofError),

    #[error("Credential agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl ApprovalError {
    /// Map this error onto the coarse taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::GroupNotFound(_)
            | Self::ProposalNotFound(_)
            | Self::MemberNotFound { .. }
            | Self::IssuedCredentialNotFound(_) => ErrorKind::NotFound,
            Self::DuplicateGroup(_)
            | Self::DuplicateMember { .. }
            | Self::DuplicateVote { .. }
            | Self::GroupFull { .. } => ErrorKind::Conflict,
            Self::ProposalClosed { .. } | Self::StillPending(_) | Self::NotApproved { .. } => {
                ErrorKind::InvalidState
            }
            Self::StaleOrInvalidRoot { .. }
            | Self::InvalidProof(_)
            | Self::ProofUnavailable(_)
            | Self::InvalidParameters(_)
            | Self::InvalidCommitment(_)
            | Self::MalformedEvidence(_)
            | Self::CorruptState(_) => ErrorKind::ValidationFailure,
            Self::ProofGenerationTimeout(_)
            | Self::ProofGenerationFailed(_)
            | Self::Agent(_)
            | Self::Storage(_) => ErrorKind::UpstreamFailure,
        }
    }

    /// Whether retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::UpstreamFailure
    }
}
