//! Fixed-depth incremental Merkle tree over identity commitments.
//!
//! - Leaves are the 32 big-endian bytes of a commitment; vacant leaves are zero.
//! - Internal nodes are `SHA-256(left ‖ right)`.
//! - Empty subtrees use a precomputed zero hash per level, so only populated
//!   nodes are stored and an empty tree of depth 32 costs nothing.
//!
//! Removing a member zeroes its leaf rather than compacting the tree, which
//! keeps every other member's leaf index (and therefore their proofs' path
//! indices) stable.

use super::types::{Commitment, MerkleNode, MerkleProof, MerkleRoot, MAX_TREE_DEPTH, MIN_TREE_DEPTH};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Tree errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("tree depth {0} outside 1..=32")]
    InvalidDepth(u8),

    #[error("tree is full ({0} leaves)")]
    Full(u64),

    #[error("leaf index {index} out of range ({len} leaves)")]
    IndexOutOfRange { index: u64, len: u64 },
}

/// Hash two child nodes into their parent.
pub fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    depth: u8,
    zeros: Vec<[u8; 32]>,
    // layers[0] are leaves, layers[depth] holds the root once anything is inserted
    layers: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    pub fn new(depth: u8) -> Result<Self, TreeError> {
        if !(MIN_TREE_DEPTH..=MAX_TREE_DEPTH).contains(&depth) {
            return Err(TreeError::InvalidDepth(depth));
        }
        let mut zeros = Vec::with_capacity(depth as usize + 1);
        zeros.push([0u8; 32]);
        for level in 0..depth as usize {
            let z = zeros[level];
            zeros.push(hash_pair(&z, &z));
        }
        Ok(Self {
            depth,
            zeros,
            layers: vec![Vec::new(); depth as usize + 1],
        })
    }

    /// Rebuild a tree from a persisted leaf layout.
    pub fn from_leaves(depth: u8, leaves: &[Option<Commitment>]) -> Result<Self, TreeError> {
        let mut tree = Self::new(depth)?;
        if leaves.len() as u64 > tree.capacity() {
            return Err(TreeError::Full(tree.capacity()));
        }
        tree.layers[0] = leaves
            .iter()
            .map(|leaf| leaf.map(|c| *c.as_bytes()).unwrap_or([0u8; 32]))
            .collect();
        for level in 0..depth as usize {
            let parents = tree.layers[level].len().div_ceil(2);
            let mut next = Vec::with_capacity(parents);
            for i in 0..parents {
                next.push(hash_pair(
                    &tree.node(level, 2 * i),
                    &tree.node(level, 2 * i + 1),
                ));
            }
            tree.layers[level + 1] = next;
        }
        Ok(tree)
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    /// Number of leaf slots used so far, vacated ones included.
    pub fn len(&self) -> u64 {
        self.layers[0].len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.layers[0].is_empty()
    }

    pub fn root(&self) -> MerkleRoot {
        MerkleNode::from_bytes(self.node(self.depth as usize, 0))
    }

    /// Leaf at `index`, `None` if vacant or never used.
    pub fn leaf(&self, index: u64) -> Option<Commitment> {
        self.layers[0]
            .get(index as usize)
            .filter(|bytes| **bytes != [0u8; 32])
            .map(|bytes| Commitment::from_bytes(*bytes))
    }

    /// Every used slot in order, vacated ones as `None`.
    pub fn leaves(&self) -> Vec<Option<Commitment>> {
        (0..self.len()).map(|i| self.leaf(i)).collect()
    }

    /// Append a leaf, returning its index.
    pub fn insert(&mut self, leaf: Commitment) -> Result<u64, TreeError> {
        let index = self.len();
        if index >= self.capacity() {
            return Err(TreeError::Full(self.capacity()));
        }
        self.layers[0].push([0u8; 32]);
        self.set(index, *leaf.as_bytes());
        Ok(index)
    }

    /// Vacate the leaf at `index`.
    pub fn remove(&mut self, index: u64) -> Result<(), TreeError> {
        if index >= self.len() {
            return Err(TreeError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        self.set(index, [0u8; 32]);
        Ok(())
    }

    /// Inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: u64) -> Result<MerkleProof, TreeError> {
        let leaf = self
            .leaf(index)
            .ok_or(TreeError::IndexOutOfRange {
                index,
                len: self.len(),
            })?;

        let mut siblings = Vec::with_capacity(self.depth as usize);
        let mut path_indices = Vec::with_capacity(self.depth as usize);
        let mut idx = index as usize;
        for level in 0..self.depth as usize {
            path_indices.push((idx % 2) as u8);
            siblings.push(MerkleNode::from_bytes(self.node(level, idx ^ 1)));
            idx /= 2;
        }

        Ok(MerkleProof {
            leaf,
            leaf_index: index,
            root: self.root(),
            siblings,
            path_indices,
        })
    }

    fn node(&self, level: usize, index: usize) -> [u8; 32] {
        self.layers[level]
            .get(index)
            .copied()
            .unwrap_or(self.zeros[level])
    }

    fn set(&mut self, index: u64, value: [u8; 32]) {
        let mut idx = index as usize;
        self.layers[0][idx] = value;
        for level in 0..self.depth as usize {
            let (left, right) = if idx % 2 == 0 {
                (self.node(level, idx), self.node(level, idx + 1))
            } else {
                (self.node(level, idx - 1), self.node(level, idx))
            };
            let parent = hash_pair(&left, &right);
            idx /= 2;
            let next = &mut self.layers[level + 1];
            if idx < next.len() {
                next[idx] = parent;
            } else {
                next.push(parent);
            }
        }
    }
}

/// Recompute the root implied by `proof` and compare it with `root`.
pub fn verify_merkle_proof(root: &MerkleRoot, leaf: &Commitment, proof: &MerkleProof) -> bool {
    if proof.siblings.len() != proof.path_indices.len() {
        return false;
    }
    let mut node = *leaf.as_bytes();
    for (sibling, bit) in proof.siblings.iter().zip(&proof.path_indices) {
        node = match bit {
            0 => hash_pair(&node, sibling.as_bytes()),
            1 => hash_pair(sibling.as_bytes(), &node),
            _ => return false,
        };
    }
    &node == root.as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(v: u64) -> Commitment {
        Commitment::from_u64(v)
    }

    #[test]
    fn test_depth_bounds() {
        assert_eq!(MerkleTree::new(0), Err(TreeError::InvalidDepth(0)));
        assert_eq!(MerkleTree::new(33), Err(TreeError::InvalidDepth(33)));
        assert!(MerkleTree::new(1).is_ok());
        assert!(MerkleTree::new(32).is_ok());
    }

    #[test]
    fn test_empty_root_is_zero_hash() {
        let tree = MerkleTree::new(2).unwrap();
        let z1 = hash_pair(&[0u8; 32], &[0u8; 32]);
        let z2 = hash_pair(&z1, &z1);
        assert_eq!(tree.root().as_bytes(), &z2);
    }

    #[test]
    fn test_root_matches_manual_computation() {
        let mut tree = MerkleTree::new(2).unwrap();
        tree.insert(c(1)).unwrap();
        tree.insert(c(2)).unwrap();
        tree.insert(c(3)).unwrap();

        let l = hash_pair(c(1).as_bytes(), c(2).as_bytes());
        let r = hash_pair(c(3).as_bytes(), &[0u8; 32]);
        assert_eq!(tree.root().as_bytes(), &hash_pair(&l, &r));
    }

    #[test]
    fn test_full_tree() {
        let mut tree = MerkleTree::new(1).unwrap();
        tree.insert(c(1)).unwrap();
        tree.insert(c(2)).unwrap();
        assert_eq!(tree.insert(c(3)), Err(TreeError::Full(2)));
    }

    #[test]
    fn test_path_indices_are_lsb_first() {
        let mut tree = MerkleTree::new(3).unwrap();
        for v in 1..=6 {
            tree.insert(c(v)).unwrap();
        }
        // index 5 = 0b101
        let proof = tree.proof(5).unwrap();
        assert_eq!(proof.path_indices, vec![1, 0, 1]);
        assert_eq!(proof.leaf, c(6));
        assert!(verify_merkle_proof(&tree.root(), &c(6), &proof));
    }

    #[test]
    fn test_every_proof_verifies() {
        let mut tree = MerkleTree::new(4).unwrap();
        for v in 1..=11 {
            tree.insert(c(v)).unwrap();
        }
        let root = tree.root();
        for i in 0..11 {
            let proof = tree.proof(i).unwrap();
            assert!(verify_merkle_proof(&root, &c(i + 1), &proof));
            assert!(!verify_merkle_proof(&root, &c(99), &proof));
        }
    }

    #[test]
    fn test_remove_keeps_other_indices() {
        let mut tree = MerkleTree::new(3).unwrap();
        tree.insert(c(1)).unwrap();
        tree.insert(c(2)).unwrap();
        tree.insert(c(3)).unwrap();
        tree.remove(1).unwrap();

        assert_eq!(tree.leaf(1), None);
        assert_eq!(tree.leaf(2), Some(c(3)));
        assert!(tree.proof(1).is_err());
        let proof = tree.proof(2).unwrap();
        assert!(verify_merkle_proof(&tree.root(), &c(3), &proof));
    }

    #[test]
    fn test_removing_everything_restores_empty_root() {
        let empty = MerkleTree::new(5).unwrap().root();
        let mut tree = MerkleTree::new(5).unwrap();
        tree.insert(c(7)).unwrap();
        assert_ne!(tree.root(), empty);
        tree.remove(0).unwrap();
        assert_eq!(tree.root(), empty);
    }

    #[test]
    fn test_from_leaves_reproduces_root() {
        let mut tree = MerkleTree::new(4).unwrap();
        for v in 1..=7 {
            tree.insert(c(v)).unwrap();
        }
        tree.remove(3).unwrap();

        let rebuilt = MerkleTree::from_leaves(4, &tree.leaves()).unwrap();
        assert_eq!(rebuilt.root(), tree.root());
        assert_eq!(rebuilt, tree);
    }

    #[test]
    fn test_tampered_path_fails() {
        let mut tree = MerkleTree::new(3).unwrap();
        tree.insert(c(1)).unwrap();
        tree.insert(c(2)).unwrap();
        let mut proof = tree.proof(0).unwrap();
        proof.path_indices[0] = 1;
        assert!(!verify_merkle_proof(&tree.root(), &c(1), &proof));
        proof.path_indices[0] = 2;
        assert!(!verify_merkle_proof(&tree.root(), &c(1), &proof));
    }
}
