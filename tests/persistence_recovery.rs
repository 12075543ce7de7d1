//! Persistence and recovery tests.
//!
//! Verifies that a protocol rebuilt from a `FileStore` sees the same groups,
//! root history, proposals and issued credentials as the one that wrote
//! them, and that inconsistent persisted state is refused.

use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use zkmpa::credential::{IssuedFilter, MockCredentialAgent};
use zkmpa::error::ErrorKind;
use zkmpa::group::{Commitment, GroupConfig};
use zkmpa::proof::MockProofSystem;
use zkmpa::proposal::{ProposalFilter, ProposalParams, ProposalStatus, VoteType};
use zkmpa::store::{FileStore, Store};
use zkmpa::{ApprovalError, ApprovalProtocol, ApprovalResult, Identity, ProtocolConfig};

async fn open(dir: &TempDir) -> ApprovalResult<ApprovalProtocol> {
    let store = Arc::new(FileStore::open(dir.path().join("store")).await.unwrap());
    ApprovalProtocol::restore(
        ProtocolConfig::default(),
        store,
        Arc::new(MockProofSystem::new(b"persist-proofs")),
        Arc::new(MockCredentialAgent::new(b"persist-agent")),
    )
    .await
}

#[tokio::test]
async fn test_restart_mid_vote_then_issue() {
    let dir = TempDir::new().unwrap();
    let members: Vec<Identity> = (0..3)
        .map(|i| Identity::from_secret(format!("persist-{}", i).as_bytes()))
        .collect();

    let (proposal_id, root_before) = {
        let protocol = open(&dir).await.unwrap();
        protocol
            .create_group(GroupConfig::new("council", "Council", 12))
            .await
            .unwrap();
        for m in &members {
            protocol.add_member("council", m.commitment()).await.unwrap();
        }
        let p = protocol
            .create_proposal(ProposalParams::new("council", json!({"role": "auditor"}), 2))
            .await
            .unwrap();
        protocol
            .cast_vote(&p.id, &members[0], VoteType::Approve)
            .await
            .unwrap();
        (p.id, protocol.registry().merkle_root("council").await.unwrap())
    };

    let protocol = open(&dir).await.unwrap();
    assert_eq!(
        protocol.registry().merkle_root("council").await.unwrap(),
        root_before
    );
    assert_eq!(protocol.history().get_root_history("council").len(), 4);
    assert_eq!(protocol.registry().member_count("council").await.unwrap(), 3);

    // the recorded nullifier survived the restart
    let err = protocol
        .cast_vote(&proposal_id, &members[0], VoteType::Approve)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let outcome = protocol
        .cast_vote(&proposal_id, &members[1], VoteType::Approve)
        .await
        .unwrap();
    assert_eq!(outcome.status, ProposalStatus::Approved);
    let issued = protocol
        .issue_credential(&proposal_id, json!({"id": "did:example:erin"}), None)
        .await
        .unwrap();
    drop(protocol);

    let protocol = open(&dir).await.unwrap();
    let approved = protocol
        .proposals()
        .list_proposals(&ProposalFilter {
            status: Some(ProposalStatus::Approved),
            ..Default::default()
        })
        .await;
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].approvals.len(), 2);

    let listed = protocol
        .issuer()
        .list_issued(&IssuedFilter {
            proposal_id: Some(proposal_id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed, vec![issued.clone()]);

    let result = protocol.verify_credential(&issued.credential).await;
    assert!(result.valid, "{:?}", result.details.errors);
}

#[tokio::test]
async fn test_removal_survives_restart() {
    let dir = TempDir::new().unwrap();
    let leaving = Identity::random();
    let staying = Identity::random();
    {
        let protocol = open(&dir).await.unwrap();
        protocol
            .create_group(GroupConfig::new("g", "G", 8))
            .await
            .unwrap();
        protocol.add_member("g", leaving.commitment()).await.unwrap();
        protocol.add_member("g", staying.commitment()).await.unwrap();
        protocol
            .remove_member("g", &leaving.commitment())
            .await
            .unwrap();
    }

    let protocol = open(&dir).await.unwrap();
    let state = protocol.registry().export_state("g").await.unwrap();
    assert_eq!(state.member_count, 1);
    assert!(!state.members.contains(&leaving.commitment()));

    // the survivor keeps its leaf index
    let proof = protocol
        .registry()
        .get_merkle_proof("g", &staying.commitment())
        .await
        .unwrap();
    assert_eq!(proof.leaf_index, 1);
}

#[tokio::test]
async fn test_prune_is_persisted() {
    let dir = TempDir::new().unwrap();
    {
        let protocol = open(&dir).await.unwrap();
        protocol
            .create_group(GroupConfig::new("g", "G", 8))
            .await
            .unwrap();
        for _ in 0..3 {
            protocol
                .add_member("g", Identity::random().commitment())
                .await
                .unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let pruned = protocol
            .prune_history("g", std::time::Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(pruned, 3);
    }

    let protocol = open(&dir).await.unwrap();
    assert_eq!(protocol.history().get_root_history("g").len(), 1);
}

#[tokio::test]
async fn test_tampered_group_record_is_corrupt() {
    let dir = TempDir::new().unwrap();
    {
        let protocol = open(&dir).await.unwrap();
        protocol
            .create_group(GroupConfig::new("g", "G", 8))
            .await
            .unwrap();
        protocol
            .add_member("g", Identity::random().commitment())
            .await
            .unwrap();
    }

    let store = FileStore::open(dir.path().join("store")).await.unwrap();
    let mut record = store.get_group("g").await.unwrap().unwrap();
    record.leaves.push(Some(Commitment::from_u64(42)));
    store.save_group(&record).await.unwrap();

    match open(&dir).await {
        Err(ApprovalError::CorruptState(_)) => {}
        Err(other) => panic!("expected CorruptState, got {other}"),
        Ok(_) => panic!("expected CorruptState, got a restored protocol"),
    }
}
