//! Integration tests for issuing and verifying approval credentials.
//!
//! Covers the evidence round trip, tamper detection, signature failures that
//! short-circuit evidence checks, and root-history lookups (recent window,
//! archive, age bound, pruning).

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use zkmpa::credential::{
    ApprovalEvidence, CredentialAgent, IssuedCredential, MockCredentialAgent, SignedCredential,
};
use zkmpa::error::ErrorKind;
use zkmpa::group::{GroupConfig, RootSource};
use zkmpa::proof::MockProofSystem;
use zkmpa::proposal::{ProposalParams, VoteType};
use zkmpa::store::MemoryStore;
use zkmpa::{ApprovalProtocol, Identity, ProtocolConfig};

const AGENT_KEY: &[u8] = b"issuer-agent";

struct Issued {
    protocol: ApprovalProtocol,
    issued: IssuedCredential,
}

async fn approved_credential(config: ProtocolConfig) -> Issued {
    let protocol = ApprovalProtocol::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(MockProofSystem::new(b"proofs")),
        Arc::new(MockCredentialAgent::new(AGENT_KEY)),
    );
    protocol
        .create_group(GroupConfig::new("board", "Board", 16).with_issuer_did("did:web:board.example"))
        .await
        .unwrap();
    let members: Vec<Identity> = (0..3).map(|_| Identity::random()).collect();
    for m in &members {
        protocol.add_member("board", m.commitment()).await.unwrap();
    }
    let p = protocol
        .create_proposal(ProposalParams::new("board", json!({"role": "auditor"}), 2))
        .await
        .unwrap();
    for outcome in protocol
        .cast_votes(
            &p.id,
            &[(&members[0], VoteType::Approve), (&members[1], VoteType::Approve)],
        )
        .await
    {
        outcome.unwrap();
    }
    let issued = protocol
        .issue_credential(&p.id, json!({"id": "did:example:dana", "role": "auditor"}), None)
        .await
        .unwrap();
    Issued { protocol, issued }
}

#[tokio::test]
async fn test_round_trip_is_valid() {
    let Issued { protocol, issued } = approved_credential(ProtocolConfig::default()).await;
    assert_eq!(issued.issuer_did, "did:web:board.example");

    let result = protocol.verify_credential(&issued.credential).await;
    assert!(result.valid, "{:?}", result.details.errors);
    assert!(result.checks.signature_valid);
    assert!(result.checks.evidence.evidence_valid);
    assert!(result.checks.evidence.threshold_met);
    assert!(result.checks.evidence.nullifiers_unique);
    assert!(result.checks.evidence.merkle_root_valid);
    assert!(result.checks.evidence.approval_proofs_valid);
    assert!(result.details.errors.is_empty());
    assert_eq!(result.details.merkle_root_source, Some(RootSource::Recent));
    assert_eq!(result.details.approval_count, Some(2));
    assert_eq!(result.details.approval_threshold, Some(2));

    let stored = protocol.issuer().get_issued(&issued.id).await.unwrap();
    assert_eq!(stored, issued);
}

#[tokio::test]
async fn test_duplicated_nullifier_is_detected() {
    let Issued { protocol, issued } = approved_credential(ProtocolConfig::default()).await;
    let mut credential = protocol.verifier().inspect(&issued.credential).await.unwrap();

    let mut evidence = ApprovalEvidence::find_in(&credential.evidence).unwrap();
    evidence.approvals.proofs[1].nullifier_hash = evidence.approvals.proofs[0].nullifier_hash;
    credential.evidence = vec![evidence.to_json().unwrap()];

    let result = protocol.verifier().verify_evidence(&credential).await;
    assert!(!result.valid);
    assert!(!result.checks.nullifiers_unique);
    assert!(result
        .details
        .errors
        .iter()
        .any(|e| e.contains("duplicate nullifiers")));
}

#[tokio::test]
async fn test_tampered_token_fails_stage_one_only() {
    let Issued { protocol, issued } = approved_credential(ProtocolConfig::default()).await;

    // Re-sign a doctored credential under a key the verifier does not trust
    let mut credential = protocol.verifier().inspect(&issued.credential).await.unwrap();
    credential.credential_subject = json!({"id": "did:example:mallory", "role": "admin"});
    let forged = MockCredentialAgent::new(b"attacker")
        .sign(&credential, &credential.issuer)
        .await
        .unwrap();

    let result = protocol.verify_credential(&forged).await;
    assert!(!result.valid);
    assert!(!result.checks.signature_valid);
    assert!(!result.checks.evidence.evidence_valid);
    assert!(!result.checks.evidence.approval_proofs_valid);
    assert_eq!(result.details.errors.len(), 1);
    assert_eq!(result.details.approval_count, None);

    let garbage = protocol
        .verify_credential(&SignedCredential("garbage".into()))
        .await;
    assert!(!garbage.valid);
    assert_eq!(garbage.details.errors.len(), 1);
}

#[tokio::test]
async fn test_archived_root_still_verifies() {
    let config = ProtocolConfig {
        recent_root_window: 1,
        ..Default::default()
    };
    let Issued { protocol, issued } = approved_credential(config).await;

    // membership moves on after issuance
    for _ in 0..2 {
        protocol
            .add_member("board", Identity::random().commitment())
            .await
            .unwrap();
    }
    let document = protocol.group_document("board").await.unwrap();
    assert!(!document.contains_recent_root(&issued.evidence.group_merkle_root));

    let result = protocol.verify_credential(&issued.credential).await;
    assert!(result.valid, "{:?}", result.details.errors);
    assert_eq!(result.details.merkle_root_source, Some(RootSource::Archive));
}

#[tokio::test]
async fn test_stale_root_fails_root_check() {
    let config = ProtocolConfig {
        max_root_age: Some(Duration::from_millis(30)),
        ..Default::default()
    };
    let Issued { protocol, issued } = approved_credential(config).await;
    tokio::time::sleep(Duration::from_millis(80)).await;

    let result = protocol.verify_credential(&issued.credential).await;
    assert!(!result.valid);
    assert!(result.checks.signature_valid);
    assert!(!result.checks.evidence.merkle_root_valid);
    assert!(result.checks.evidence.approval_proofs_valid);
    assert!(result.checks.evidence.threshold_met);
}

#[tokio::test]
async fn test_pruned_root_fails_root_check() {
    let Issued { protocol, issued } = approved_credential(ProtocolConfig::default()).await;
    protocol
        .add_member("board", Identity::random().commitment())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let pruned = protocol
        .prune_history("board", Duration::from_millis(5))
        .await
        .unwrap();
    assert!(pruned > 0);

    let result = protocol.verify_credential(&issued.credential).await;
    assert!(!result.checks.evidence.merkle_root_valid);
    assert!(!result.valid);
}

#[tokio::test]
async fn test_membership_change_during_vote_still_verifies() {
    let protocol = ApprovalProtocol::new(
        ProtocolConfig::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(MockProofSystem::new(b"proofs")),
        Arc::new(MockCredentialAgent::new(AGENT_KEY)),
    );
    protocol
        .create_group(GroupConfig::new("board", "Board", 16))
        .await
        .unwrap();
    let members: Vec<Identity> = (0..4).map(|_| Identity::random()).collect();
    for m in &members[..3] {
        protocol.add_member("board", m.commitment()).await.unwrap();
    }
    let p = protocol
        .create_proposal(ProposalParams::new("board", json!({}), 2))
        .await
        .unwrap();

    // membership moves on while the vote is open
    protocol
        .add_member("board", members[3].commitment())
        .await
        .unwrap();
    protocol
        .remove_member("board", &members[2].commitment())
        .await
        .unwrap();

    // the voter roster is the one frozen at creation
    let err = protocol
        .cast_vote(&p.id, &members[3], VoteType::Approve)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamFailure);

    protocol
        .cast_vote(&p.id, &members[0], VoteType::Approve)
        .await
        .unwrap();
    let outcome = protocol
        .cast_vote(&p.id, &members[1], VoteType::Approve)
        .await
        .unwrap();
    assert!(outcome.decided);

    let issued = protocol
        .issue_credential(&p.id, json!({}), Some("did:web:board.example"))
        .await
        .unwrap();
    assert_eq!(issued.evidence.group_merkle_root, p.merkle_root_at_creation);
    let result = protocol.verify_credential(&issued.credential).await;
    assert!(result.valid, "{:?}", result.details.errors);
    assert!(result.checks.evidence.approval_proofs_valid);
    assert_eq!(result.details.merkle_root_source, Some(RootSource::Recent));
}
