//! Credentials carrying anonymous-approval evidence.
//!
//! An approved proposal yields [`ApprovalEvidence`]; the [`CredentialIssuer`]
//! attaches it to a verifiable credential signed by an external
//! [`CredentialAgent`], and the [`CredentialVerifier`] later checks both the
//! signature and the evidence.

pub mod evidence;
pub mod issuer;
pub mod mock;
pub mod traits;
pub mod verifier;

pub use evidence::{ApprovalEvidence, EvidenceProof, VoteSummary, EVIDENCE_TYPE};
pub use issuer::{CredentialIssuer, IssuedCredential, IssuedFilter};
pub use mock::MockCredentialAgent;
pub use traits::{
    AgentError, CredentialAgent, CredentialVerification, SignedCredential, VerifiableCredential,
};
pub use verifier::{
    CredentialVerifier, EvidenceChecks, EvidenceVerification, SignatureVerification,
    VerificationChecks, VerificationDetails, VerificationResult,
};
