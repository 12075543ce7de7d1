//! Property-based tests for group membership and root history
//!
//! Tests for:
//! - Root/member atomicity: the live root is always in the history
//! - Duplicate rejection: re-adding a live member never changes the group
//! - Purity: the root depends only on the leaf layout, not on the path taken

use super::{
    tree::{verify_merkle_proof, MerkleTree},
    Commitment, GroupConfig, GroupRecord, GroupRegistry, MerkleRootHistory,
};
use crate::error::ApprovalError;
use crate::store::MemoryStore;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Add(u64),
    Remove(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![(1u64..16).prop_map(Op::Add), (1u64..16).prop_map(Op::Remove)]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// After every add/remove the current root is a tracked historical root
    /// and matches the model's member set.
    #[test]
    fn prop_root_member_atomicity(ops in proptest::collection::vec(op(), 1..40)) {
        runtime().block_on(async {
            let history = Arc::new(MerkleRootHistory::new());
            let registry = GroupRegistry::new(Arc::new(MemoryStore::new()), history.clone());
            registry.create_group(GroupConfig::new("g", "G", 6)).await.unwrap();
            let mut model = BTreeSet::new();

            for op in ops {
                match op {
                    Op::Add(v) => {
                        let result = registry.add_member("g", Commitment::from_u64(v)).await;
                        if model.insert(v) {
                            prop_assert!(result.is_ok());
                        } else {
                            let is_duplicate = matches!(result, Err(ApprovalError::DuplicateMember { .. }));
                            prop_assert!(is_duplicate);
                        }
                    }
                    Op::Remove(v) => {
                        let result = registry.remove_member("g", &Commitment::from_u64(v)).await;
                        if model.remove(&v) {
                            prop_assert!(result.is_ok());
                        } else {
                            let is_missing = matches!(result, Err(ApprovalError::MemberNotFound { .. }));
                            prop_assert!(is_missing);
                        }
                    }
                }

                let root = registry.merkle_root("g").await.unwrap();
                prop_assert!(history.verify_historical_root("g", &root, None));
                prop_assert_eq!(history.latest_root("g").unwrap().root, root);
                prop_assert_eq!(registry.member_count("g").await.unwrap(), model.len());
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Every live member's proof verifies against the current root.
    #[test]
    fn prop_proofs_verify(values in proptest::collection::btree_set(1u64..10_000, 1..30)) {
        let mut tree = MerkleTree::new(8).unwrap();
        for v in &values {
            tree.insert(Commitment::from_u64(*v)).unwrap();
        }
        let root = tree.root();
        for (i, v) in values.iter().enumerate() {
            let proof = tree.proof(i as u64).unwrap();
            prop_assert!(verify_merkle_proof(&root, &Commitment::from_u64(*v), &proof));
        }
    }

    /// Rebuilding from the persisted leaf layout yields the same root.
    #[test]
    fn prop_record_rebuild_is_exact(
        values in proptest::collection::vec(1u64..1_000, 0..20),
        removals in proptest::collection::vec(any::<proptest::sample::Index>(), 0..5),
    ) {
        let mut tree = MerkleTree::new(6).unwrap();
        let mut seen = BTreeSet::new();
        for v in values {
            if seen.insert(v) {
                tree.insert(Commitment::from_u64(v)).unwrap();
            }
        }
        if !tree.is_empty() {
            for idx in removals {
                let _ = tree.remove(idx.index(tree.len() as usize) as u64);
            }
        }

        let record = GroupRecord {
            config: GroupConfig::new("g", "G", 6),
            leaves: tree.leaves(),
        };
        let rebuilt = MerkleTree::from_leaves(6, &record.leaves).unwrap();
        prop_assert_eq!(rebuilt.root(), tree.root());
    }
}
