//! Credential issuance with attached approval evidence.

use super::evidence::ApprovalEvidence;
use super::traits::{
    AgentError, CredentialAgent, SignedCredential, VerifiableCredential, CREDENTIALS_V1_CONTEXT,
};
use crate::clock::now_millis;
use crate::error::{ApprovalError, ApprovalResult};
use crate::proposal::ProposalId;
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

pub const APPROVAL_CREDENTIAL_TYPE: &str = "AnonymousGroupApprovalCredential";

/// A signed credential together with the evidence it was issued on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCredential {
    pub id: String,
    pub proposal_id: ProposalId,
    pub issuer_did: String,
    pub credential: SignedCredential,
    pub evidence: ApprovalEvidence,
    pub issued_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssuedFilter {
    pub issuer_did: Option<String>,
    pub proposal_id: Option<ProposalId>,
}

impl IssuedFilter {
    fn matches(&self, issued: &IssuedCredential) -> bool {
        self.issuer_did
            .as_deref()
            .map_or(true, |did| did == issued.issuer_did)
            && self.proposal_id.map_or(true, |id| id == issued.proposal_id)
    }
}

pub struct CredentialIssuer {
    agent: Arc<dyn CredentialAgent>,
    store: Arc<dyn Store>,
    timeout: Duration,
}

impl CredentialIssuer {
    pub fn new(agent: Arc<dyn CredentialAgent>, store: Arc<dyn Store>, timeout: Duration) -> Self {
        Self {
            agent,
            store,
            timeout,
        }
    }

    /// Build a credential for `subject`, attach `evidence`, have the agent
    /// sign it as `issuer_did` and persist the result.
    pub async fn issue_with_evidence(
        &self,
        subject: serde_json::Value,
        evidence: ApprovalEvidence,
        issuer_did: &str,
    ) -> ApprovalResult<IssuedCredential> {
        if issuer_did.is_empty() {
            return Err(ApprovalError::InvalidParameters(
                "issuer DID must not be empty".to_string(),
            ));
        }
        let problems = evidence.structural_errors();
        if !problems.is_empty() {
            return Err(ApprovalError::MalformedEvidence(problems.join("; ")));
        }

        let credential = VerifiableCredential {
            context: vec![CREDENTIALS_V1_CONTEXT.to_string()],
            types: vec![
                "VerifiableCredential".to_string(),
                APPROVAL_CREDENTIAL_TYPE.to_string(),
            ],
            issuer: issuer_did.to_string(),
            issuance_date: humantime::format_rfc3339_seconds(SystemTime::now()).to_string(),
            credential_subject: subject,
            evidence: vec![evidence.to_json()?],
        };

        let signed = tokio::time::timeout(self.timeout, self.agent.sign(&credential, issuer_did))
            .await
            .map_err(|_| AgentError::Timeout(self.timeout))??;

        let issued = IssuedCredential {
            id: uuid::Uuid::new_v4().to_string(),
            proposal_id: evidence.proposal_id,
            issuer_did: issuer_did.to_string(),
            credential: signed,
            evidence,
            issued_at: now_millis(),
        };
        self.store.save_issued(&issued).await?;

        tracing::info!(
            credential_id = %issued.id,
            proposal_id = %issued.proposal_id,
            issuer = %issuer_did,
            "Issued credential"
        );
        Ok(issued)
    }

    pub async fn get_issued(&self, id: &str) -> ApprovalResult<IssuedCredential> {
        self.store
            .get_issued(id)
            .await?
            .ok_or_else(|| ApprovalError::IssuedCredentialNotFound(id.to_string()))
    }

    /// Issued credentials matching `filter`, oldest first.
    pub async fn list_issued(&self, filter: &IssuedFilter) -> ApprovalResult<Vec<IssuedCredential>> {
        let mut issued: Vec<IssuedCredential> = self
            .store
            .list_issued()
            .await?
            .into_iter()
            .filter(|i| filter.matches(i))
            .collect();
        issued.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then_with(|| a.id.cmp(&b.id)));
        Ok(issued)
    }
}
