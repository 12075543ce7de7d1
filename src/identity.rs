//! Member identities derived from a private secret.
//!
//! An identity holds two secrets, a trapdoor and a nullifier secret, derived
//! from one input secret with HKDF-SHA256. The public identity commitment is
//! `SHA-256(nullifier ‖ trapdoor)` and is the leaf placed in a group's Merkle
//! tree.
//!
//! # Security Properties
//!
//! - **Determinism**: the same secret always yields the same commitment
//! - **Domain separation**: trapdoor and nullifier secret use distinct HKDF labels
//! - **Zeroization**: both secrets are cleared when the identity is dropped
//!
//! Identities are only ever handed to the proof system. The core never logs
//! or persists them.

use crate::group::Commitment;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

const IDENTITY_SALT: &[u8] = b"zkmpa-identity-v1";

/// A member's private identity.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Identity {
    trapdoor: [u8; 32],
    nullifier: [u8; 32],
}

impl Identity {
    /// Derive an identity from secret key material.
    pub fn from_secret(secret: &[u8]) -> Self {
        let hk = Hkdf::<Sha256>::new(Some(IDENTITY_SALT), secret);
        let mut trapdoor = [0u8; 32];
        let mut nullifier = [0u8; 32];
        hk.expand(b"trapdoor", &mut trapdoor)
            .expect("HKDF expand should never fail with valid length");
        hk.expand(b"nullifier", &mut nullifier)
            .expect("HKDF expand should never fail with valid length");
        Self {
            trapdoor,
            nullifier,
        }
    }

    /// Fresh identity from OS randomness.
    pub fn random() -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        let identity = Self::from_secret(&secret);
        secret.zeroize();
        identity
    }

    /// Public identity commitment (the Merkle leaf).
    pub fn commitment(&self) -> Commitment {
        let mut hasher = Sha256::new();
        hasher.update(self.nullifier);
        hasher.update(self.trapdoor);
        Commitment::from_bytes(hasher.finalize().into())
    }

    /// Nullifier secret, combined with a scope by the proof system.
    pub fn nullifier_secret(&self) -> &[u8; 32] {
        &self.nullifier
    }

    pub fn trapdoor(&self) -> &[u8; 32] {
        &self.trapdoor
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("commitment", &self.commitment())
            .finish_non_exhaustive()
    }
}
