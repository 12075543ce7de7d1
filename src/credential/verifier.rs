//! Two-stage credential verification.
//!
//! Stage 1 asks the agent whether the signature holds. Only a credential that
//! passes it has its evidence inspected in stage 2, where five independent
//! checks run:
//!
//! | Check | Holds when |
//! |-------|------------|
//! | `evidence_valid` | approval evidence is present and structurally complete |
//! | `threshold_met` | `approvals.count >= approval_threshold` |
//! | `nullifiers_unique` | no nullifier repeats among approval proofs |
//! | `merkle_root_valid` | the evidence root is in the group's history and young enough |
//! | `approval_proofs_valid` | every proof is real, bound to the evidence and verifies |
//!
//! Failures never surface as `Err`: each failing check adds a reason to
//! `details.errors` and `valid` is the AND of every check.

use super::evidence::{ApprovalEvidence, EvidenceProof};
use super::traits::{AgentError, CredentialAgent, SignedCredential, VerifiableCredential};
use crate::clock::{is_older_than, now_millis};
use crate::config::ProtocolConfig;
use crate::error::ApprovalResult;
use crate::group::{MerkleRootHistory, RootSource};
use crate::proof::{verify_with_timeout, ExternalNullifier, Proof, ProofSystem};
use crate::proposal::{ProposalId, VoteType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureVerification {
    pub valid: bool,
    pub credential: Option<VerifiableCredential>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceChecks {
    pub evidence_valid: bool,
    pub threshold_met: bool,
    pub nullifiers_unique: bool,
    pub merkle_root_valid: bool,
    pub approval_proofs_valid: bool,
}

impl EvidenceChecks {
    pub fn all(&self) -> bool {
        self.evidence_valid
            && self.threshold_met
            && self.nullifiers_unique
            && self.merkle_root_valid
            && self.approval_proofs_valid
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationChecks {
    pub signature_valid: bool,
    #[serde(flatten)]
    pub evidence: EvidenceChecks,
}

impl VerificationChecks {
    pub fn all(&self) -> bool {
        self.signature_valid && self.evidence.all()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<ProposalId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merkle_root_source: Option<RootSource>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceVerification {
    pub valid: bool,
    pub checks: EvidenceChecks,
    pub details: VerificationDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub valid: bool,
    pub checks: VerificationChecks,
    pub details: VerificationDetails,
}

pub struct CredentialVerifier {
    agent: Arc<dyn CredentialAgent>,
    history: Arc<MerkleRootHistory>,
    proof_system: Arc<dyn ProofSystem>,
    max_root_age: Option<Duration>,
    recent_window: usize,
    timeout: Duration,
}

impl CredentialVerifier {
    pub fn new(
        agent: Arc<dyn CredentialAgent>,
        history: Arc<MerkleRootHistory>,
        proof_system: Arc<dyn ProofSystem>,
        config: &ProtocolConfig,
    ) -> Self {
        Self {
            agent,
            history,
            proof_system,
            max_root_age: config.max_root_age,
            recent_window: config.recent_root_window,
            timeout: config.proof_timeout,
        }
    }

    /// Stage 1. Agent errors and timeouts become an invalid result.
    pub async fn verify_signature(&self, signed: &SignedCredential) -> SignatureVerification {
        let outcome = match tokio::time::timeout(self.timeout, self.agent.verify(signed)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AgentError::Timeout(self.timeout)),
        };
        match outcome {
            Ok(result) if result.verified => SignatureVerification {
                valid: result.credential.is_some(),
                error: result
                    .credential
                    .is_none()
                    .then(|| "agent returned no credential".to_string()),
                credential: result.credential,
            },
            Ok(result) => SignatureVerification {
                valid: false,
                credential: None,
                error: Some(
                    result
                        .error
                        .unwrap_or_else(|| "signature verification failed".to_string()),
                ),
            },
            Err(e) => SignatureVerification {
                valid: false,
                credential: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Stage 2 on an already authenticated credential.
    pub async fn verify_evidence(&self, credential: &VerifiableCredential) -> EvidenceVerification {
        let mut checks = EvidenceChecks::default();
        let mut details = VerificationDetails::default();

        let evidence = match ApprovalEvidence::find_in(&credential.evidence) {
            Ok(evidence) => evidence,
            Err(e) => {
                details.errors.push(e.to_string());
                return EvidenceVerification {
                    valid: false,
                    checks,
                    details,
                };
            }
        };
        details.proposal_id = Some(evidence.proposal_id);
        details.group_id = Some(evidence.group_id.clone());
        details.approval_count = Some(evidence.approvals.count);
        details.approval_threshold = Some(evidence.approval_threshold);

        let structural = evidence.structural_errors();
        checks.evidence_valid = structural.is_empty();
        details.errors.extend(structural);

        checks.threshold_met = evidence.approvals.count >= evidence.approval_threshold as usize;
        if !checks.threshold_met {
            details.errors.push(format!(
                "approval count {} below threshold {}",
                evidence.approvals.count, evidence.approval_threshold
            ));
        }

        let mut seen = HashSet::new();
        checks.nullifiers_unique = evidence
            .approvals
            .proofs
            .iter()
            .all(|p| seen.insert(p.nullifier_hash));
        if !checks.nullifiers_unique {
            details.errors.push("duplicate nullifiers detected".to_string());
        }

        match self.check_root(&evidence) {
            Ok(source) => {
                checks.merkle_root_valid = true;
                details.merkle_root_source = Some(source);
            }
            Err(reason) => details.errors.push(reason),
        }

        match self.check_approval_proofs(&evidence).await {
            Ok(()) => checks.approval_proofs_valid = true,
            Err(reason) => details.errors.push(reason),
        }

        EvidenceVerification {
            valid: checks.all(),
            checks,
            details,
        }
    }

    /// Both stages. Evidence is not inspected when the signature fails.
    pub async fn verify(&self, signed: &SignedCredential) -> VerificationResult {
        let signature = self.verify_signature(signed).await;
        let credential = match signature.credential {
            Some(credential) if signature.valid => credential,
            _ => {
                let errors = vec![signature
                    .error
                    .unwrap_or_else(|| "invalid credential signature".to_string())];
                tracing::info!(error = %errors[0], "Credential signature rejected");
                return VerificationResult {
                    valid: false,
                    checks: VerificationChecks::default(),
                    details: VerificationDetails {
                        errors,
                        ..Default::default()
                    },
                };
            }
        };

        let evidence = self.verify_evidence(&credential).await;
        let checks = VerificationChecks {
            signature_valid: true,
            evidence: evidence.checks,
        };
        let mut details = evidence.details;
        details.issuer = Some(credential.issuer);

        let valid = checks.all();
        tracing::info!(
            valid,
            issuer = ?details.issuer,
            proposal_id = ?details.proposal_id.map(|id| id.to_string()),
            failures = details.errors.len(),
            "Verified credential"
        );
        VerificationResult {
            valid,
            checks,
            details,
        }
    }

    /// Decode a credential for display, without evidence checks.
    pub async fn inspect(&self, signed: &SignedCredential) -> ApprovalResult<VerifiableCredential> {
        let result = tokio::time::timeout(self.timeout, self.agent.verify(signed))
            .await
            .map_err(|_| AgentError::Timeout(self.timeout))??;
        result
            .credential
            .ok_or_else(|| AgentError::Malformed("agent returned no credential".to_string()).into())
    }

    fn check_root(&self, evidence: &ApprovalEvidence) -> Result<RootSource, String> {
        let found = self
            .history
            .find_root(
                &evidence.group_id,
                &evidence.group_merkle_root,
                self.recent_window,
            )
            .ok_or_else(|| {
                format!(
                    "merkle root {} not found in history of group {}",
                    evidence.group_merkle_root, evidence.group_id
                )
            })?;
        if let Some(max_age) = self.max_root_age {
            if is_older_than(found.record.timestamp, max_age, now_millis()) {
                return Err(format!(
                    "merkle root {} is older than {}",
                    evidence.group_merkle_root,
                    humantime::format_duration(max_age)
                ));
            }
        }
        Ok(found.source)
    }

    async fn check_approval_proofs(&self, evidence: &ApprovalEvidence) -> Result<(), String> {
        if evidence.approvals.proofs.is_empty() {
            return Err("no approval proofs found".to_string());
        }
        let scope = VoteType::Approve.external_nullifier(&evidence.proposal_id);
        let signal = VoteType::Approve.signal(&evidence.proposal_id);
        for entry in &evidence.approvals.proofs {
            self.check_approval_proof(evidence, entry, &scope, &signal)
                .await
                .map_err(|reason| format!("proof {}: {}", entry.nullifier_hash, reason))?;
        }
        Ok(())
    }

    async fn check_approval_proof(
        &self,
        evidence: &ApprovalEvidence,
        entry: &EvidenceProof,
        scope: &ExternalNullifier,
        signal: &str,
    ) -> Result<(), String> {
        if entry.merkle_tree_root != evidence.group_merkle_root {
            return Err("merkle root mismatch".to_string());
        }
        let proof = match &entry.proof {
            Proof::Real(proof) => proof,
            Proof::Unavailable { reason } => {
                return Err(format!("no cryptographic proof attached ({})", reason))
            }
        };
        if proof.merkle_tree_root != entry.merkle_tree_root
            || proof.nullifier != entry.nullifier_hash
        {
            return Err("proof does not match its evidence entry".to_string());
        }
        if &proof.scope != scope || proof.message != signal {
            return Err("proof is not bound to this proposal".to_string());
        }
        match verify_with_timeout(self.proof_system.as_ref(), proof, self.timeout).await {
            Ok(true) => Ok(()),
            Ok(false) => Err("proof does not verify".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }
}
