//! Mock credential agent for testing.
//!
//! NOT A REAL SIGNATURE SCHEME. The token is
//! `hex(credential JSON).hex(HMAC-SHA256 tag)` under a key held by the mock.
//! Any change to the payload or tag makes verification report
//! `verified: false`, which is enough to exercise tamper handling.

use super::traits::{
    AgentError, CredentialAgent, CredentialVerification, SignedCredential, VerifiableCredential,
};
use async_trait::async_trait;
use ring::hmac;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct MockCredentialAgent {
    key: hmac::Key,
    failing: AtomicBool,
}

impl MockCredentialAgent {
    pub fn new(key: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, key),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every call fail with `Unavailable` (for testing).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), AgentError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AgentError::Unavailable("mock agent set to fail".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialAgent for MockCredentialAgent {
    async fn sign(
        &self,
        credential: &VerifiableCredential,
        issuer_did: &str,
    ) -> Result<SignedCredential, AgentError> {
        self.check_available()?;
        if credential.issuer != issuer_did {
            return Err(AgentError::Signing(format!(
                "credential issuer {} does not match signer {}",
                credential.issuer, issuer_did
            )));
        }
        let payload =
            serde_json::to_vec(credential).map_err(|e| AgentError::Signing(e.to_string()))?;
        let tag = hmac::sign(&self.key, &payload);
        Ok(SignedCredential(format!(
            "{}.{}",
            hex::encode(&payload),
            hex::encode(tag.as_ref())
        )))
    }

    async fn verify(&self, signed: &SignedCredential) -> Result<CredentialVerification, AgentError> {
        self.check_available()?;
        let (payload_hex, tag_hex) = signed
            .as_str()
            .split_once('.')
            .ok_or_else(|| AgentError::Malformed("missing signature separator".to_string()))?;
        let payload = hex::decode(payload_hex).map_err(|e| AgentError::Malformed(e.to_string()))?;
        let tag = hex::decode(tag_hex).map_err(|e| AgentError::Malformed(e.to_string()))?;

        let credential: Option<VerifiableCredential> = serde_json::from_slice(&payload).ok();
        if hmac::verify(&self.key, &payload, &tag).is_err() {
            return Ok(CredentialVerification {
                verified: false,
                credential,
                error: Some("signature mismatch".to_string()),
            });
        }
        match credential {
            Some(credential) => Ok(CredentialVerification {
                verified: true,
                credential: Some(credential),
                error: None,
            }),
            None => Err(AgentError::Malformed(
                "signed payload is not a credential".to_string(),
            )),
        }
    }
}
