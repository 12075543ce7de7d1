//! Group-membership proof abstraction.
//!
//! The zero-knowledge primitive is external: given a member's identity, a
//! group, a message and a scope it produces a [`MembershipProof`] carrying a
//! public nullifier; given a proof it answers true or false. This module
//! defines that contract ([`ProofSystem`]), the tagged [`Proof`] result, and
//! time-bounded wrappers around both calls.
//!
//! A failed generation is never replaced by a look-alike proof. Callers that
//! want to carry on anyway get [`Proof::Unavailable`], which every acceptance
//! check refuses.

pub mod mock;

pub use mock::MockProofSystem;

use crate::error::{ApprovalError, ApprovalResult};
use crate::group::{Group, MerkleRoot};
use crate::identity::Identity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

macro_rules! hex_digest {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(#[serde(with = "crate::serialization::hex32")] [u8; 32]);

        impl $name {
            pub fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                crate::serialization::decode_hex32(s).map(Self)
            }
        }
    };
}

hex_digest!(
    /// Per-identity, per-scope value revealed by a proof. Two proofs from the
    /// same identity under the same scope carry the same nullifier.
    Nullifier
);

hex_digest!(
    /// Public scope a proof is bound to (one per proposal and vote type).
    ExternalNullifier
);

/// Output of the membership proof primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipProof {
    pub merkle_tree_root: MerkleRoot,
    pub nullifier: Nullifier,
    pub message: String,
    pub scope: ExternalNullifier,
    /// Backend-specific proof bytes.
    #[serde(with = "crate::serialization::hex_vec")]
    pub points: Vec<u8>,
}

/// A proof, or an explicit marker that none could be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Proof {
    Real(MembershipProof),
    /// Not a proof. Carries why generation failed; never accepted as a vote.
    Unavailable { reason: String },
}

impl Proof {
    pub fn as_real(&self) -> Option<&MembershipProof> {
        match self {
            Proof::Real(p) => Some(p),
            Proof::Unavailable { .. } => None,
        }
    }

    pub fn is_real(&self) -> bool {
        matches!(self, Proof::Real(_))
    }
}

/// Proof backend errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofError {
    #[error("identity is not a member of group {0}")]
    NotAMember(String),

    #[error("malformed proof: {0}")]
    Malformed(String),

    #[error("proof backend failure: {0}")]
    Backend(String),
}

/// The external membership proof primitive.
#[async_trait]
pub trait ProofSystem: Send + Sync {
    /// Prove that `identity` is a member of `group`, binding `message` and
    /// `scope` into the proof.
    async fn generate_proof(
        &self,
        identity: &Identity,
        group: &Group,
        message: &str,
        scope: &ExternalNullifier,
    ) -> Result<MembershipProof, ProofError>;

    /// Check a proof. `Ok(false)` for a well-formed proof that does not
    /// verify; `Err(Malformed)` for input the backend cannot parse.
    async fn verify_proof(&self, proof: &MembershipProof) -> Result<bool, ProofError>;
}

/// Generate a proof, failing with `ProofGenerationTimeout` after `timeout`.
pub async fn prove_with_timeout(
    system: &dyn ProofSystem,
    identity: &Identity,
    group: &Group,
    message: &str,
    scope: &ExternalNullifier,
    timeout: Duration,
) -> ApprovalResult<MembershipProof> {
    match tokio::time::timeout(
        timeout,
        system.generate_proof(identity, group, message, scope),
    )
    .await
    {
        Ok(result) => Ok(result?),
        Err(_) => {
            tracing::warn!(group_id = %group.id(), ?timeout, "Proof generation timed out");
            Err(ApprovalError::ProofGenerationTimeout(timeout))
        }
    }
}

/// Like [`prove_with_timeout`], but reports failure as [`Proof::Unavailable`].
pub async fn prove_or_unavailable(
    system: &dyn ProofSystem,
    identity: &Identity,
    group: &Group,
    message: &str,
    scope: &ExternalNullifier,
    timeout: Duration,
) -> Proof {
    match prove_with_timeout(system, identity, group, message, scope, timeout).await {
        Ok(proof) => Proof::Real(proof),
        Err(e) => Proof::Unavailable {
            reason: e.to_string(),
        },
    }
}

/// Verify a proof, failing with `ProofGenerationTimeout` after `timeout`.
pub async fn verify_with_timeout(
    system: &dyn ProofSystem,
    proof: &MembershipProof,
    timeout: Duration,
) -> ApprovalResult<bool> {
    match tokio::time::timeout(timeout, system.verify_proof(proof)).await {
        Ok(Ok(valid)) => Ok(valid),
        Ok(Err(ProofError::Malformed(reason))) => Err(ApprovalError::InvalidProof(reason)),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(ApprovalError::ProofGenerationTimeout(timeout)),
    }
}
