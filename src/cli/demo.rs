//! End-to-end demonstration run.
//!
//! Creates a three-member group, has two members approve a proposal with
//! threshold 2, shows the third member's late rejection being refused,
//! issues a credential on the approval and verifies it. Proofs and
//! signatures come from the shipped test doubles, so the output is a
//! walkthrough of the bookkeeping, not of real cryptography.

use super::config::{StorageBackend, ZkmpaConfig};
use serde_json::json;
use std::sync::Arc;
use zkmpa::credential::MockCredentialAgent;
use zkmpa::proof::MockProofSystem;
use zkmpa::proposal::{ProposalParams, VoteType};
use zkmpa::store::{FileStore, MemoryStore, Store};
use zkmpa::{ApprovalProtocol, Identity};

const DEMO_PROOF_KEY: &[u8] = b"zkmpa-demo-proof-key";
const DEMO_AGENT_KEY: &[u8] = b"zkmpa-demo-agent-key";

/// Run the demo and print the report as JSON
pub async fn execute(config: ZkmpaConfig) -> Result<(), Box<dyn std::error::Error>> {
    let report = run(&config).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn run(config: &ZkmpaConfig) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let store: Arc<dyn Store> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::File => Arc::new(FileStore::open(config.storage.resolved_path()).await?),
    };
    let protocol = ApprovalProtocol::restore(
        config.protocol.clone(),
        store,
        Arc::new(MockProofSystem::new(DEMO_PROOF_KEY)),
        Arc::new(MockCredentialAgent::new(DEMO_AGENT_KEY)),
    )
    .await?;

    // A persistent store may already hold earlier runs
    let group_id = if protocol.registry().contains("G") {
        format!("G-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
    } else {
        "G".to_string()
    };
    protocol
        .create_group(protocol.group_config(group_id.as_str(), "Demo group"))
        .await?;

    let (alice, bob, carol) = (Identity::random(), Identity::random(), Identity::random());
    for member in [&alice, &bob, &carol] {
        protocol.add_member(&group_id, member.commitment()).await?;
    }

    let proposal = protocol
        .create_proposal(
            ProposalParams::new(group_id.as_str(), json!({"role": "auditor"}), 2)
                .with_total_members(3),
        )
        .await?;

    let outcomes = protocol
        .cast_votes(
            &proposal.id,
            &[(&alice, VoteType::Approve), (&bob, VoteType::Approve)],
        )
        .await;
    for outcome in outcomes {
        outcome?;
    }

    let late_rejection = match protocol
        .cast_vote(&proposal.id, &carol, VoteType::Reject)
        .await
    {
        Ok(outcome) => json!({"accepted": true, "status": outcome.status}),
        Err(e) => json!({"accepted": false, "kind": format!("{:?}", e.kind()), "error": e.to_string()}),
    };

    let result = protocol.finalize(&proposal.id).await?;
    let issued = protocol
        .issue_credential(
            &proposal.id,
            json!({"id": "did:example:subject", "role": "auditor"}),
            None,
        )
        .await?;
    let verification = protocol.verify_credential(&issued.credential).await;

    Ok(json!({
        "group": protocol.group_document(&group_id).await?,
        "proposal": result,
        "lateRejection": late_rejection,
        "evidence": issued.evidence,
        "credential": {
            "id": issued.id,
            "issuer": issued.issuer_did,
        },
        "verification": verification,
    }))
}
