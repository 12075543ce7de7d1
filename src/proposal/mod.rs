//! Proposals and anonymous voting.
//!
//! A proposal is one approval question put to one group. Members vote
//! anonymously with membership proofs scoped to the proposal; the nullifier
//! each proof reveals is the deduplication key, so a member can cast at most
//! one vote of each type without revealing who they are.

pub mod duration_parse;
pub mod manager;
pub mod state;
pub mod types;

pub use manager::ProposalManager;
pub use state::Proposal;
pub use types::{
    ExternalNullifiers, ProposalFilter, ProposalId, ProposalParams, ProposalResult,
    ProposalStatus, Vote, VoteOutcome, VoteType,
};
