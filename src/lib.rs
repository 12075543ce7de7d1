//! zkmpa - Anonymous Threshold Approval
//!
//! Members of a cryptographic group vote anonymously on proposals; once `m`
//! approvals are in, the approval is bundled as evidence into a verifiable
//! credential that any third party can re-check.
//!
//! Key principles:
//! - Voter identity is never revealed (membership proofs + nullifiers)
//! - One vote per member per question (nullifier deduplication)
//! - Every group root is kept in history so old evidence stays checkable
//! - Proof generation and credential signing are external primitives
//!
//! Start from [`protocol::ApprovalProtocol`].

pub mod clock;
pub mod config;
pub mod credential;
pub mod error;
pub mod group;
pub mod identity;
pub mod proof;
pub mod proposal;
pub mod protocol;
pub mod serialization;
pub mod store;

pub use config::ProtocolConfig;
pub use error::{ApprovalError, ApprovalResult, ErrorKind};
pub use identity::Identity;
pub use protocol::ApprovalProtocol;
