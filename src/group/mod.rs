//! Groups, their Merkle trees, and the history of their roots.
//!
//! A group is the unit of membership: an ordered set of identity commitments
//! organised as a fixed-depth Merkle tree. The [`GroupRegistry`] is the only
//! code that mutates a group, and it appends to the [`MerkleRootHistory`]
//! under the same lock as every root change.
//!
//! ## Merkle path convention
//!
//! `MerkleProof::path_indices` holds the bits of the leaf index, least
//! significant first (`index % 2`, then `index /= 2`). A `0` means the path
//! node is the left child at that level. Proof systems consuming these paths
//! must use the same order; a mismatch fails verification silently.

pub mod document;
pub mod history;
pub mod registry;
pub mod tree;
pub mod types;

#[cfg(test)]
mod proptests;

pub use document::GroupDocument;
pub use history::{MerkleRootHistory, RootHistoryStats, RootMatch, RootSource};
pub use registry::{Group, GroupRegistry};
pub use tree::{verify_merkle_proof, MerkleTree, TreeError};
pub use types::{
    Commitment, GroupConfig, GroupRecord, GroupState, MerkleNode, MerkleProof, MerkleRoot,
    ParseCommitmentError, RootRecord, MAX_TREE_DEPTH, MIN_TREE_DEPTH,
};
