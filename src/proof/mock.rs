//! Mock proof system for testing.
//!
//! NOT ZERO-KNOWLEDGE AND NOT A MEMBERSHIP PROOF. The "proof" is an
//! HMAC-SHA256 tag over `(root, nullifier, message, scope)` under a key held
//! by whoever runs the mock, so anyone with the key can forge one. It exists
//! so the engine's bookkeeping can be tested end to end:
//!
//! - generation refuses identities that are not in the group
//! - the nullifier is `SHA-256("nullifier" ‖ nullifier secret ‖ scope)`, so it
//!   is stable per identity and scope, and differs across scopes
//! - verification fails if any bound field is altered

use super::{ExternalNullifier, MembershipProof, Nullifier, ProofError, ProofSystem};
use crate::group::{verify_merkle_proof, Group};
use crate::identity::Identity;
use async_trait::async_trait;
use ring::hmac;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Mock proof system for testing.
pub struct MockProofSystem {
    key: hmac::Key,
    delay: Option<Duration>,
    failing: AtomicBool,
}

impl MockProofSystem {
    pub fn new(key: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, key),
            delay: None,
            failing: AtomicBool::new(false),
        }
    }

    /// Sleep this long before producing each proof.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make generation fail with a backend error (for testing).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Nullifier the mock derives for `identity` under `scope`.
    pub fn nullifier_for(identity: &Identity, scope: &ExternalNullifier) -> Nullifier {
        let mut hasher = Sha256::new();
        hasher.update(b"nullifier");
        hasher.update(identity.nullifier_secret());
        hasher.update(scope.as_bytes());
        Nullifier::from_bytes(hasher.finalize().into())
    }

    fn tag_input(proof: &MembershipProof) -> Vec<u8> {
        let mut input = Vec::with_capacity(32 * 4);
        input.extend_from_slice(proof.merkle_tree_root.as_bytes());
        input.extend_from_slice(proof.nullifier.as_bytes());
        input.extend_from_slice(&Sha256::digest(proof.message.as_bytes()));
        input.extend_from_slice(proof.scope.as_bytes());
        input
    }
}

#[async_trait]
impl ProofSystem for MockProofSystem {
    async fn generate_proof(
        &self,
        identity: &Identity,
        group: &Group,
        message: &str,
        scope: &ExternalNullifier,
    ) -> Result<MembershipProof, ProofError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProofError::Backend("mock backend set to fail".to_string()));
        }

        let commitment = identity.commitment();
        let path = group
            .merkle_proof(&commitment)
            .map_err(|_| ProofError::NotAMember(group.id().to_string()))?;
        let root = group.merkle_root();
        if !verify_merkle_proof(&root, &commitment, &path) {
            return Err(ProofError::Backend("inconsistent merkle path".to_string()));
        }

        let mut proof = MembershipProof {
            merkle_tree_root: root,
            nullifier: Self::nullifier_for(identity, scope),
            message: message.to_string(),
            scope: *scope,
            points: Vec::new(),
        };
        let tag = hmac::sign(&self.key, &Self::tag_input(&proof));
        proof.points = tag.as_ref().to_vec();
        Ok(proof)
    }

    async fn verify_proof(&self, proof: &MembershipProof) -> Result<bool, ProofError> {
        if proof.points.len() != 32 {
            return Err(ProofError::Malformed(format!(
                "expected 32 proof bytes, got {}",
                proof.points.len()
            )));
        }
        Ok(hmac::verify(&self.key, &Self::tag_input(proof), &proof.points).is_ok())
    }
}
