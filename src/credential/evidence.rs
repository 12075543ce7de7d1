//! Anonymous-approval evidence embedded in issued credentials.
//!
//! Evidence is a pure function of an approved proposal: the same proposal
//! state always yields the same evidence, timestamp included (it is the
//! proposal's last state change).

use crate::error::{ApprovalError, ApprovalResult};
use crate::group::MerkleRoot;
use crate::proof::{Nullifier, Proof};
use crate::proposal::{Proposal, ProposalId, ProposalStatus, Vote};
use serde::{Deserialize, Serialize};

pub const EVIDENCE_TYPE: &str = "AnonymousGroupApproval";

/// One vote as it appears in evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceProof {
    pub nullifier_hash: Nullifier,
    pub merkle_tree_root: MerkleRoot,
    pub proof: Proof,
    pub timestamp: u64,
}

impl From<&Vote> for EvidenceProof {
    fn from(vote: &Vote) -> Self {
        Self {
            nullifier_hash: vote.nullifier_hash,
            merkle_tree_root: vote.merkle_tree_root,
            proof: vote.proof.clone(),
            timestamp: vote.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSummary {
    pub count: usize,
    pub proofs: Vec<EvidenceProof>,
}

impl VoteSummary {
    fn from_votes(votes: &[Vote]) -> Self {
        Self {
            count: votes.len(),
            proofs: votes.iter().map(EvidenceProof::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalEvidence {
    #[serde(rename = "type")]
    pub evidence_type: String,
    pub proposal_id: ProposalId,
    pub group_id: String,
    pub group_merkle_root: MerkleRoot,
    pub approval_threshold: u32,
    pub total_members: u32,
    pub approvals: VoteSummary,
    pub rejections: VoteSummary,
    pub timestamp: u64,
}

impl ApprovalEvidence {
    /// Assemble evidence for an approved proposal.
    pub fn from_proposal(proposal: &Proposal) -> ApprovalResult<Self> {
        if proposal.status != ProposalStatus::Approved {
            return Err(ApprovalError::NotApproved {
                proposal_id: proposal.id.to_string(),
                status: proposal.status,
            });
        }
        Ok(Self {
            evidence_type: EVIDENCE_TYPE.to_string(),
            proposal_id: proposal.id,
            group_id: proposal.group_id.clone(),
            group_merkle_root: proposal.merkle_root_at_creation,
            approval_threshold: proposal.approval_threshold,
            total_members: proposal.total_members,
            approvals: VoteSummary::from_votes(&proposal.approvals),
            rejections: VoteSummary::from_votes(&proposal.rejections),
            timestamp: proposal.updated_at,
        })
    }

    pub fn to_json(&self) -> ApprovalResult<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| ApprovalError::MalformedEvidence(e.to_string()))
    }

    /// Find and decode the approval evidence among a credential's entries.
    pub fn find_in(entries: &[serde_json::Value]) -> ApprovalResult<Self> {
        let entry = entries
            .iter()
            .find(|e| e.get("type").and_then(|t| t.as_str()) == Some(EVIDENCE_TYPE))
            .ok_or_else(|| {
                ApprovalError::MalformedEvidence(format!("no {} evidence found", EVIDENCE_TYPE))
            })?;
        serde_json::from_value(entry.clone())
            .map_err(|e| ApprovalError::MalformedEvidence(e.to_string()))
    }

    /// Structural problems, empty when the evidence is complete.
    pub fn structural_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.evidence_type != EVIDENCE_TYPE {
            errors.push(format!("unexpected evidence type {}", self.evidence_type));
        }
        if self.group_id.is_empty() {
            errors.push("evidence has no group id".to_string());
        }
        if self.approval_threshold == 0 || self.approval_threshold > self.total_members {
            errors.push(format!(
                "approval threshold {} inconsistent with total members {}",
                self.approval_threshold, self.total_members
            ));
        }
        if self.approvals.count != self.approvals.proofs.len() {
            errors.push(format!(
                "approval count {} does not match {} attached proofs",
                self.approvals.count,
                self.approvals.proofs.len()
            ));
        }
        if self.rejections.count != self.rejections.proofs.len() {
            errors.push(format!(
                "rejection count {} does not match {} attached proofs",
                self.rejections.count,
                self.rejections.proofs.len()
            ));
        }
        errors
    }
}
