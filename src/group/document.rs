//! Public group document.
//!
//! The embeddable view of a group a verifier can fetch without access to
//! the issuer's store: current root, size, and the newest root records. The
//! `recent_roots` window is the first tier of the two-tier root lookup.

use super::types::{GroupState, MerkleRoot, RootRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDocument {
    /// Issuer DID when configured, otherwise `did:group:<group id>`.
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub merkle_root: MerkleRoot,
    pub tree_depth: u8,
    pub member_count: usize,
    pub recent_roots: Vec<RootRecord>,
    pub total_roots: usize,
}

impl GroupDocument {
    pub fn new(state: &GroupState, recent_roots: Vec<RootRecord>, total_roots: usize) -> Self {
        let id = state
            .config
            .issuer_did
            .clone()
            .unwrap_or_else(|| format!("did:group:{}", state.id));
        Self {
            id,
            group_id: state.id.clone(),
            name: state.config.name.clone(),
            merkle_root: state.merkle_root,
            tree_depth: state.tree_depth,
            member_count: state.member_count,
            recent_roots,
            total_roots,
        }
    }

    /// Whether `root` is in the published recent window.
    pub fn contains_recent_root(&self, root: &MerkleRoot) -> bool {
        self.recent_roots.iter().any(|r| &r.root == root)
    }
}
