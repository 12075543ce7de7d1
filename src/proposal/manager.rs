//! Proposal manager - creates proposals, accepts votes, drives status.
//!
//! ## Vote acceptance
//!
//! `submit_vote` runs in three phases:
//!
//! 1. **Precheck** under the proposal's mutex: unknown id, closed proposal
//!    (an overdue one is expired and persisted here) and duplicate nullifier
//!    fail fast, before any expensive work.
//! 2. **Validation** without the lock: the proof must be real, bound to this
//!    proposal's scope and signal, against the root frozen at creation (still
//!    present in the group's history), and accepted by the proof system
//!    within the configured timeout.
//! 3. **Commit** under the mutex again: status and nullifier are re-checked,
//!    the vote is applied to a staged copy, the copy is persisted, and only
//!    then swapped in.
//!
//! Because the commit is serialized per proposal, two racing votes cannot both
//! pass the duplicate check, and exactly one of them can move the proposal
//! out of pending. A vote that fails or times out in phase 2 leaves the
//! proposal untouched.

use super::state::Proposal;
use super::types::{
    ProposalFilter, ProposalId, ProposalParams, ProposalResult, ProposalStatus, Vote,
    VoteOutcome,
};
use crate::clock::now_millis;
use crate::config::ProtocolConfig;
use crate::credential::ApprovalEvidence;
use crate::error::{ApprovalError, ApprovalResult};
use crate::group::{Group, GroupRecord, GroupRegistry, MerkleRoot, MerkleRootHistory};
use crate::proof::{verify_with_timeout, Proof, ProofSystem};
use crate::store::Store;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

type ProposalCell = Arc<Mutex<Proposal>>;

pub struct ProposalManager {
    proposals: RwLock<HashMap<ProposalId, ProposalCell>>,
    registry: Arc<GroupRegistry>,
    history: Arc<MerkleRootHistory>,
    proof_system: Arc<dyn ProofSystem>,
    store: Arc<dyn Store>,
    proof_timeout: Duration,
    vote_max_root_age: Option<Duration>,
}

impl ProposalManager {
    pub fn new(
        registry: Arc<GroupRegistry>,
        proof_system: Arc<dyn ProofSystem>,
        store: Arc<dyn Store>,
        config: &ProtocolConfig,
    ) -> Self {
        Self {
            proposals: RwLock::new(HashMap::new()),
            history: registry.history().clone(),
            registry,
            proof_system,
            store,
            proof_timeout: config.proof_timeout,
            vote_max_root_age: config.vote_max_root_age,
        }
    }

    /// Reload every persisted proposal.
    pub async fn restore(&self) -> ApprovalResult<usize> {
        let proposals = self.store.list_proposals().await?;
        let count = proposals.len();
        let mut map = self.proposals.write().unwrap_or_else(PoisonError::into_inner);
        for proposal in proposals {
            map.insert(proposal.id, Arc::new(Mutex::new(proposal)));
        }
        tracing::info!(proposals = count, "Restored proposals");
        Ok(count)
    }

    /// Create a pending proposal against the group's current root.
    pub async fn create_proposal(&self, params: ProposalParams) -> ApprovalResult<Proposal> {
        let group = self.registry.snapshot(&params.group_id).await?;
        let total_members = match params.total_members {
            Some(n) => n,
            None => u32::try_from(group.member_count()).map_err(|_| {
                ApprovalError::InvalidParameters("member count exceeds u32".to_string())
            })?,
        };
        let m = params.approval_threshold;
        if m == 0 || m > total_members {
            return Err(ApprovalError::InvalidParameters(format!(
                "approval threshold {} must be between 1 and total members {}",
                m, total_members
            )));
        }

        let content_bytes = serde_json::to_vec(&params.content)
            .map_err(|e| ApprovalError::InvalidParameters(format!("content: {}", e)))?;
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        let id = ProposalId::derive(&content_bytes, &nonce);

        let now = now_millis();
        let expires_at = params
            .voting_period
            .map(|period| now.saturating_add(period.as_millis() as u64));
        let proposal = Proposal::new(
            id,
            params.group_id,
            params.content,
            m,
            total_members,
            group.merkle_root(),
            now,
            expires_at,
        )
        .with_voter_leaves(group.to_record().leaves);

        self.store.save_proposal(&proposal).await?;
        self.proposals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(Mutex::new(proposal.clone())));

        tracing::info!(
            proposal_id = %id,
            group_id = %proposal.group_id,
            threshold = m,
            total_members,
            root = %proposal.merkle_root_at_creation,
            expires_at = ?expires_at,
            "Created proposal"
        );
        Ok(proposal)
    }

    pub async fn get_proposal(&self, proposal_id: &ProposalId) -> ApprovalResult<Proposal> {
        let cell = self.cell(proposal_id)?;
        let proposal = cell.lock().await;
        Ok(proposal.clone())
    }

    /// The group as it stood when the proposal was created. Votes must be
    /// proven against this tree.
    pub async fn voting_group(&self, proposal_id: &ProposalId) -> ApprovalResult<Group> {
        let (group_id, leaves, root) = {
            let cell = self.cell(proposal_id)?;
            let proposal = cell.lock().await;
            (
                proposal.group_id.clone(),
                proposal.voter_leaves.clone(),
                proposal.merkle_root_at_creation,
            )
        };
        let config = self.registry.export_state(&group_id).await?.config;
        let group = Group::from_record(GroupRecord { config, leaves })?;
        if group.merkle_root() != root {
            return Err(ApprovalError::CorruptState(format!(
                "proposal {}: voter tree does not match root {}",
                proposal_id, root
            )));
        }
        Ok(group)
    }

    /// Proposals matching `filter`, oldest first.
    pub async fn list_proposals(&self, filter: &ProposalFilter) -> Vec<Proposal> {
        let cells: Vec<ProposalCell> = self
            .proposals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut matching = Vec::new();
        for cell in cells {
            let proposal = cell.lock().await;
            if matches_filter(&proposal, filter) {
                matching.push(proposal.clone());
            }
        }
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        matching
    }

    /// Validate and record a vote.
    pub async fn submit_vote(
        &self,
        proposal_id: &ProposalId,
        vote: Vote,
    ) -> ApprovalResult<VoteOutcome> {
        let cell = self.cell(proposal_id)?;

        let (group_id, frozen_root) = {
            let mut guard = cell.lock().await;
            self.precheck(&mut guard, &vote).await?;
            (guard.group_id.clone(), guard.merkle_root_at_creation)
        };

        if let Err(e) = self
            .validate_vote(proposal_id, &group_id, &frozen_root, &vote)
            .await
        {
            tracing::warn!(
                proposal_id = %proposal_id,
                vote_type = %vote.vote_type,
                nullifier = %vote.nullifier_hash,
                error = %e,
                "Rejected vote"
            );
            return Err(e);
        }

        let mut guard = cell.lock().await;
        self.precheck(&mut guard, &vote).await?;

        let now = now_millis();
        let mut staged = guard.clone();
        let nullifier = vote.nullifier_hash;
        let vote_type = vote.vote_type;
        let transition = staged.record_vote(vote, now);
        self.store.save_proposal(&staged).await?;
        *guard = staged;

        tracing::info!(
            proposal_id = %proposal_id,
            vote_type = %vote_type,
            nullifier = %nullifier,
            approvals = guard.approvals.len(),
            rejections = guard.rejections.len(),
            "Accepted vote"
        );
        if let Some(status) = transition {
            tracing::info!(proposal_id = %proposal_id, status = %status, "Proposal decided");
        }

        Ok(VoteOutcome {
            proposal_id: *proposal_id,
            vote_type,
            status: guard.status,
            approvals: guard.approvals.len(),
            rejections: guard.rejections.len(),
            decided: transition.is_some(),
        })
    }

    /// Current status, persisting an expiry if the deadline has passed.
    pub async fn check_status(&self, proposal_id: &ProposalId) -> ApprovalResult<ProposalStatus> {
        let cell = self.cell(proposal_id)?;
        let mut guard = cell.lock().await;
        self.expire_if_due(&mut guard).await?;
        Ok(guard.status)
    }

    /// Report the terminal outcome, expiring an overdue proposal first.
    ///
    /// Idempotent on terminal proposals. A pending proposal whose deadline has
    /// not passed (or that has none) fails with `StillPending`.
    pub async fn finalize(&self, proposal_id: &ProposalId) -> ApprovalResult<ProposalResult> {
        let cell = self.cell(proposal_id)?;
        let mut guard = cell.lock().await;
        self.expire_if_due(&mut guard).await?;
        if guard.is_pending() {
            return Err(ApprovalError::StillPending(proposal_id.to_string()));
        }
        tracing::debug!(proposal_id = %proposal_id, status = %guard.status, "Finalized proposal");
        Ok(ProposalResult {
            proposal_id: *proposal_id,
            status: guard.status,
            approvals: guard.approvals.len(),
            rejections: guard.rejections.len(),
            finalized_at: guard.updated_at,
        })
    }

    /// Evidence for an approved proposal, built from its current vote sets.
    pub async fn get_approval_evidence(
        &self,
        proposal_id: &ProposalId,
    ) -> ApprovalResult<ApprovalEvidence> {
        let proposal = self.get_proposal(proposal_id).await?;
        ApprovalEvidence::from_proposal(&proposal)
    }

    fn cell(&self, proposal_id: &ProposalId) -> ApprovalResult<ProposalCell> {
        self.proposals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(proposal_id)
            .cloned()
            .ok_or_else(|| ApprovalError::ProposalNotFound(proposal_id.to_string()))
    }

    async fn precheck(
        &self,
        guard: &mut MutexGuard<'_, Proposal>,
        vote: &Vote,
    ) -> ApprovalResult<()> {
        self.expire_if_due(guard).await?;
        if !guard.is_pending() {
            return Err(ApprovalError::ProposalClosed {
                proposal_id: guard.id.to_string(),
                status: guard.status,
            });
        }
        if guard.has_nullifier(vote.vote_type, &vote.nullifier_hash) {
            return Err(ApprovalError::DuplicateVote {
                proposal_id: guard.id.to_string(),
                vote_type: vote.vote_type,
                nullifier: vote.nullifier_hash,
            });
        }
        Ok(())
    }

    async fn expire_if_due(&self, guard: &mut MutexGuard<'_, Proposal>) -> ApprovalResult<()> {
        let now = now_millis();
        if !guard.is_pending() || guard.evaluate(now) == ProposalStatus::Pending {
            return Ok(());
        }
        let mut staged = (**guard).clone();
        if let Some(status) = staged.refresh(now) {
            self.store.save_proposal(&staged).await?;
            **guard = staged;
            tracing::info!(proposal_id = %guard.id, status = %status, "Proposal closed");
        }
        Ok(())
    }

    async fn validate_vote(
        &self,
        proposal_id: &ProposalId,
        group_id: &str,
        frozen_root: &MerkleRoot,
        vote: &Vote,
    ) -> ApprovalResult<()> {
        let proof = match &vote.proof {
            Proof::Real(proof) => proof,
            Proof::Unavailable { reason } => {
                return Err(ApprovalError::ProofUnavailable(reason.clone()))
            }
        };

        if proof.nullifier != vote.nullifier_hash {
            return Err(ApprovalError::InvalidProof(
                "proof nullifier does not match vote".to_string(),
            ));
        }
        if proof.merkle_tree_root != vote.merkle_tree_root {
            return Err(ApprovalError::InvalidProof(
                "proof root does not match vote".to_string(),
            ));
        }
        if proof.scope != vote.vote_type.external_nullifier(proposal_id) {
            return Err(ApprovalError::InvalidProof(format!(
                "proof is not scoped to {} on this proposal",
                vote.vote_type
            )));
        }
        if proof.message != vote.vote_type.signal(proposal_id) {
            return Err(ApprovalError::InvalidProof(
                "proof message does not match vote signal".to_string(),
            ));
        }

        // only members at creation time may vote
        if &vote.merkle_tree_root != frozen_root
            || !self.history.verify_historical_root(
                group_id,
                &vote.merkle_tree_root,
                self.vote_max_root_age,
            )
        {
            return Err(ApprovalError::StaleOrInvalidRoot {
                group_id: group_id.to_string(),
                root: vote.merkle_tree_root.to_string(),
            });
        }

        if !verify_with_timeout(self.proof_system.as_ref(), proof, self.proof_timeout).await? {
            return Err(ApprovalError::InvalidProof(
                "proof failed verification".to_string(),
            ));
        }
        Ok(())
    }
}

fn matches_filter(proposal: &Proposal, filter: &ProposalFilter) -> bool {
    filter
        .group_id
        .as_ref()
        .map_or(true, |g| &proposal.group_id == g)
        && filter.status.map_or(true, |s| proposal.status == s)
        && filter
            .created_after
            .map_or(true, |t| proposal.created_at >= t)
        && filter
            .created_before
            .map_or(true, |t| proposal.created_at <= t)
}
