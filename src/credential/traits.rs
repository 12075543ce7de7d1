//! Trait abstraction for the credential signing/verifying agent.
//!
//! Signing, encoding and signature checks belong to an external agent; the
//! engine only builds the unsigned credential and reads back verified claims.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const CREDENTIALS_V1_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";

/// Unsigned verifiable credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableCredential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    pub issuer: String,
    /// RFC 3339.
    pub issuance_date: String,
    pub credential_subject: serde_json::Value,
    /// Kept as raw JSON so foreign or tampered entries can still be reported on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<serde_json::Value>,
}

/// Opaque signed form produced by the agent (e.g. a JWT).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignedCredential(pub String);

impl SignedCredential {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SignedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview: String = self.0.chars().take(16).collect();
        write!(f, "SignedCredential({}…, {} bytes)", preview, self.0.len())
    }
}

/// Agent's answer to a verification request.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialVerification {
    pub verified: bool,
    /// Decoded credential, present when the token could be decoded.
    pub credential: Option<VerifiableCredential>,
    pub error: Option<String>,
}

/// Credential agent errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("signing failed: {0}")]
    Signing(String),

    #[error("malformed credential: {0}")]
    Malformed(String),

    #[error("agent unavailable: {0}")]
    Unavailable(String),

    #[error("agent call timed out after {0:?}")]
    Timeout(Duration),
}

/// The external issuing/verifying agent.
#[async_trait]
pub trait CredentialAgent: Send + Sync {
    /// Sign `credential` as `issuer_did`.
    async fn sign(
        &self,
        credential: &VerifiableCredential,
        issuer_did: &str,
    ) -> Result<SignedCredential, AgentError>;

    /// Check a signed credential and decode its claims.
    async fn verify(&self, signed: &SignedCredential) -> Result<CredentialVerification, AgentError>;
}
