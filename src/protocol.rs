//! Approval protocol - one object wiring groups, proposals and credentials.
//!
//! ```text
//! GroupRegistry ──tracks──▶ MerkleRootHistory ◀──looks up── CredentialVerifier
//!       │                          ▲
//!   snapshot                       │ vote roots
//!       ▼                          │
//!  ProofSystem ◀──verifies── ProposalManager ──evidence──▶ CredentialIssuer
//! ```
//!
//! Everything shares one [`Store`] and one history, so a restarted protocol
//! sees exactly the groups, roots, proposals and issued credentials that were
//! persisted.

use crate::clock::now_millis;
use crate::config::ProtocolConfig;
use crate::credential::{
    ApprovalEvidence, CredentialAgent, CredentialIssuer, CredentialVerifier, IssuedCredential,
    SignedCredential, VerificationResult,
};
use crate::error::{ApprovalError, ApprovalResult};
use crate::group::{
    Commitment, GroupConfig, GroupDocument, GroupRegistry, GroupState, MerkleRootHistory,
    RootRecord,
};
use crate::identity::Identity;
use crate::proof::{prove_with_timeout, ProofSystem};
use crate::proposal::{
    Proposal, ProposalId, ProposalManager, ProposalParams, ProposalResult, ProposalStatus, Vote,
    VoteOutcome, VoteType,
};
use crate::store::Store;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

pub struct ApprovalProtocol {
    config: ProtocolConfig,
    store: Arc<dyn Store>,
    history: Arc<MerkleRootHistory>,
    registry: Arc<GroupRegistry>,
    proposals: ProposalManager,
    proof_system: Arc<dyn ProofSystem>,
    issuer: CredentialIssuer,
    verifier: CredentialVerifier,
}

impl ApprovalProtocol {
    /// A protocol with no groups, over whatever `store` already holds.
    ///
    /// Use [`Self::restore`] to pick up persisted state instead.
    pub fn new(
        config: ProtocolConfig,
        store: Arc<dyn Store>,
        proof_system: Arc<dyn ProofSystem>,
        agent: Arc<dyn CredentialAgent>,
    ) -> Self {
        let history = Arc::new(MerkleRootHistory::new());
        let registry = Arc::new(GroupRegistry::new(store.clone(), history.clone()));
        Self::assemble(config, store, history, registry, proof_system, agent)
    }

    /// Rebuild groups, root history and proposals from `store`.
    pub async fn restore(
        config: ProtocolConfig,
        store: Arc<dyn Store>,
        proof_system: Arc<dyn ProofSystem>,
        agent: Arc<dyn CredentialAgent>,
    ) -> ApprovalResult<Self> {
        let history = Arc::new(MerkleRootHistory::new());
        let registry = Arc::new(GroupRegistry::restore(store.clone(), history.clone()).await?);
        let protocol = Self::assemble(config, store, history, registry, proof_system, agent);
        let proposals = protocol.proposals.restore().await?;
        tracing::info!(
            groups = protocol.registry.list_groups().await.len(),
            proposals,
            "Restored approval protocol"
        );
        Ok(protocol)
    }

    fn assemble(
        config: ProtocolConfig,
        store: Arc<dyn Store>,
        history: Arc<MerkleRootHistory>,
        registry: Arc<GroupRegistry>,
        proof_system: Arc<dyn ProofSystem>,
        agent: Arc<dyn CredentialAgent>,
    ) -> Self {
        let proposals =
            ProposalManager::new(registry.clone(), proof_system.clone(), store.clone(), &config);
        let issuer = CredentialIssuer::new(agent.clone(), store.clone(), config.proof_timeout);
        let verifier =
            CredentialVerifier::new(agent, history.clone(), proof_system.clone(), &config);
        Self {
            config,
            store,
            history,
            registry,
            proposals,
            proof_system,
            issuer,
            verifier,
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn registry(&self) -> &GroupRegistry {
        &self.registry
    }

    pub fn history(&self) -> &MerkleRootHistory {
        &self.history
    }

    pub fn proposals(&self) -> &ProposalManager {
        &self.proposals
    }

    pub fn issuer(&self) -> &CredentialIssuer {
        &self.issuer
    }

    pub fn verifier(&self) -> &CredentialVerifier {
        &self.verifier
    }

    /// Group config using the configured default tree depth.
    pub fn group_config(&self, id: impl Into<String>, name: impl Into<String>) -> GroupConfig {
        GroupConfig::new(id, name, self.config.default_tree_depth)
    }

    pub async fn create_group(&self, config: GroupConfig) -> ApprovalResult<GroupState> {
        self.registry.create_group(config).await
    }

    pub async fn add_member(
        &self,
        group_id: &str,
        commitment: Commitment,
    ) -> ApprovalResult<RootRecord> {
        self.registry.add_member(group_id, commitment).await
    }

    pub async fn remove_member(
        &self,
        group_id: &str,
        commitment: &Commitment,
    ) -> ApprovalResult<RootRecord> {
        self.registry.remove_member(group_id, commitment).await
    }

    pub async fn create_proposal(&self, params: ProposalParams) -> ApprovalResult<Proposal> {
        self.proposals.create_proposal(params).await
    }

    /// Prove membership for `identity` against the group as it stood when the
    /// proposal was created, then submit the resulting vote.
    pub async fn cast_vote(
        &self,
        proposal_id: &ProposalId,
        identity: &Identity,
        vote_type: VoteType,
    ) -> ApprovalResult<VoteOutcome> {
        let vote = self.prepare_vote(proposal_id, identity, vote_type).await?;
        self.proposals.submit_vote(proposal_id, vote).await
    }

    /// Generate every ballot's proof concurrently, then submit the votes one
    /// by one in ballot order. Each ballot gets its own result.
    pub async fn cast_votes(
        &self,
        proposal_id: &ProposalId,
        ballots: &[(&Identity, VoteType)],
    ) -> Vec<ApprovalResult<VoteOutcome>> {
        let prepared = join_all(
            ballots
                .iter()
                .map(|(identity, vote_type)| self.prepare_vote(proposal_id, identity, *vote_type)),
        )
        .await;

        let mut outcomes = Vec::with_capacity(prepared.len());
        for vote in prepared {
            let outcome = match vote {
                Ok(vote) => self.proposals.submit_vote(proposal_id, vote).await,
                Err(e) => Err(e),
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn prepare_vote(
        &self,
        proposal_id: &ProposalId,
        identity: &Identity,
        vote_type: VoteType,
    ) -> ApprovalResult<Vote> {
        let proposal = self.proposals.get_proposal(proposal_id).await?;
        if proposal.status != ProposalStatus::Pending {
            return Err(ApprovalError::ProposalClosed {
                proposal_id: proposal_id.to_string(),
                status: proposal.status,
            });
        }
        let group = self.proposals.voting_group(proposal_id).await?;
        let proof = prove_with_timeout(
            self.proof_system.as_ref(),
            identity,
            &group,
            &vote_type.signal(proposal_id),
            &vote_type.external_nullifier(proposal_id),
            self.config.proof_timeout,
        )
        .await?;
        Ok(Vote::new(proof, vote_type, now_millis()))
    }

    pub async fn check_status(&self, proposal_id: &ProposalId) -> ApprovalResult<ProposalStatus> {
        self.proposals.check_status(proposal_id).await
    }

    pub async fn finalize(&self, proposal_id: &ProposalId) -> ApprovalResult<ProposalResult> {
        self.proposals.finalize(proposal_id).await
    }

    pub async fn get_approval_evidence(
        &self,
        proposal_id: &ProposalId,
    ) -> ApprovalResult<ApprovalEvidence> {
        self.proposals.get_approval_evidence(proposal_id).await
    }

    /// Issue a credential for `subject` on the strength of an approved
    /// proposal. Without `issuer_did` the group document's id is used.
    pub async fn issue_credential(
        &self,
        proposal_id: &ProposalId,
        subject: serde_json::Value,
        issuer_did: Option<&str>,
    ) -> ApprovalResult<IssuedCredential> {
        let evidence = self.proposals.get_approval_evidence(proposal_id).await?;
        let issuer_did = match issuer_did {
            Some(did) => did.to_string(),
            None => self.group_document(&evidence.group_id).await?.id,
        };
        self.issuer
            .issue_with_evidence(subject, evidence, &issuer_did)
            .await
    }

    pub async fn verify_credential(&self, signed: &SignedCredential) -> VerificationResult {
        self.verifier.verify(signed).await
    }

    pub async fn group_document(&self, group_id: &str) -> ApprovalResult<GroupDocument> {
        let state = self.registry.export_state(group_id).await?;
        let recent = self
            .history
            .recent_roots(group_id, self.config.recent_root_window);
        let total = self.history.stats(group_id).total;
        Ok(GroupDocument::new(&state, recent, total))
    }

    /// Prune root records older than `max_age` from memory and the store.
    ///
    /// The newest record always survives. Returns the number of records
    /// pruned from history.
    pub async fn prune_history(&self, group_id: &str, max_age: Duration) -> ApprovalResult<usize> {
        if !self.registry.contains(group_id) {
            return Err(ApprovalError::GroupNotFound(group_id.to_string()));
        }
        let removed = self.history.prune_old_roots(group_id, max_age);
        for record in &removed {
            // a recurring root still has a newer record
            if !self
                .history
                .verify_historical_root(group_id, &record.root, None)
            {
                self.store.delete_root(group_id, &record.root).await?;
            }
        }
        Ok(removed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::MockCredentialAgent;
    use crate::error::ErrorKind;
    use crate::proof::MockProofSystem;
    use crate::store::MemoryStore;
    use serde_json::json;

    struct Fixture {
        protocol: ApprovalProtocol,
        store: Arc<MemoryStore>,
        members: Vec<Identity>,
    }

    async fn fixture(members: usize) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let protocol = ApprovalProtocol::new(
            ProtocolConfig::default(),
            store.clone(),
            Arc::new(MockProofSystem::new(b"proofs")),
            Arc::new(MockCredentialAgent::new(b"agent")),
        );
        protocol
            .create_group(protocol.group_config("board", "Board"))
            .await
            .unwrap();
        let members: Vec<Identity> = (0..members)
            .map(|i| Identity::from_secret(format!("member-{}", i).as_bytes()))
            .collect();
        for m in &members {
            protocol.add_member("board", m.commitment()).await.unwrap();
        }
        Fixture {
            protocol,
            store,
            members,
        }
    }

    #[tokio::test]
    async fn test_vote_issue_verify() {
        let f = fixture(3).await;
        let p = f
            .protocol
            .create_proposal(ProposalParams::new("board", json!({"role": "auditor"}), 2))
            .await
            .unwrap();

        f.protocol
            .cast_vote(&p.id, &f.members[0], VoteType::Approve)
            .await
            .unwrap();
        let outcome = f
            .protocol
            .cast_vote(&p.id, &f.members[1], VoteType::Approve)
            .await
            .unwrap();
        assert_eq!(outcome.status, ProposalStatus::Approved);

        let issued = f
            .protocol
            .issue_credential(&p.id, json!({"id": "did:example:carol"}), None)
            .await
            .unwrap();
        assert_eq!(issued.issuer_did, "did:group:board");

        let report = f.protocol.verify_credential(&issued.credential).await;
        assert!(report.valid, "{:?}", report.details.errors);
    }

    #[tokio::test]
    async fn test_cast_votes_reports_each_ballot() {
        let f = fixture(3).await;
        let p = f
            .protocol
            .create_proposal(ProposalParams::new("board", json!({}), 2))
            .await
            .unwrap();
        let outsider = Identity::from_secret(b"outsider");

        let outcomes = f
            .protocol
            .cast_votes(
                &p.id,
                &[
                    (&f.members[0], VoteType::Approve),
                    (&outsider, VoteType::Approve),
                    (&f.members[0], VoteType::Approve),
                    (&f.members[1], VoteType::Approve),
                    (&f.members[2], VoteType::Reject),
                ],
            )
            .await;

        assert!(outcomes[0].is_ok());
        assert_eq!(
            outcomes[1].as_ref().unwrap_err().kind(),
            ErrorKind::UpstreamFailure
        );
        assert!(matches!(
            outcomes[2],
            Err(ApprovalError::DuplicateVote { .. })
        ));
        assert!(outcomes[3].as_ref().unwrap().decided);
        assert!(matches!(
            outcomes[4],
            Err(ApprovalError::ProposalClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_group_document_window() {
        let f = fixture(12).await;
        let doc = f.protocol.group_document("board").await.unwrap();
        assert_eq!(doc.member_count, 12);
        assert_eq!(doc.total_roots, 13);
        assert_eq!(doc.recent_roots.len(), 10);
        assert!(doc.contains_recent_root(&doc.merkle_root));
    }

    #[tokio::test]
    async fn test_prune_history_keeps_newest_and_syncs_store() {
        let f = fixture(3).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let pruned = f
            .protocol
            .prune_history("board", Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(pruned, 3);
        let remaining = f.store.list_roots("board").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(
            remaining[0].root,
            f.protocol.registry().merkle_root("board").await.unwrap()
        );

        assert!(matches!(
            f.protocol
                .prune_history("missing", Duration::from_secs(1))
                .await,
            Err(ApprovalError::GroupNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_restore_resumes_voting() {
        let f = fixture(3).await;
        let p = f
            .protocol
            .create_proposal(ProposalParams::new("board", json!({}), 2))
            .await
            .unwrap();
        f.protocol
            .cast_vote(&p.id, &f.members[0], VoteType::Approve)
            .await
            .unwrap();

        let restored = ApprovalProtocol::restore(
            ProtocolConfig::default(),
            f.store.clone(),
            Arc::new(MockProofSystem::new(b"proofs")),
            Arc::new(MockCredentialAgent::new(b"agent")),
        )
        .await
        .unwrap();

        let err = restored
            .cast_vote(&p.id, &f.members[0], VoteType::Approve)
            .await
            .unwrap_err();
        assert!(matches!(err, ApprovalError::DuplicateVote { .. }));
        let outcome = restored
            .cast_vote(&p.id, &f.members[1], VoteType::Approve)
            .await
            .unwrap();
        assert_eq!(outcome.status, ProposalStatus::Approved);
    }
}
