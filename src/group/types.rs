//! Value types shared by the group registry, root history and verifiers.

use num_bigint::BigUint;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Smallest and largest supported tree depth.
pub const MIN_TREE_DEPTH: u8 = 1;
pub const MAX_TREE_DEPTH: u8 = 32;

/// Identity commitment, a 256-bit integer.
///
/// Commitments are large integers in every external representation (decimal
/// strings in JSON and CBOR). Internally they are 32 big-endian bytes. The
/// all-zero value marks a vacant leaf and is never a valid member.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Commitment([u8; 32]);

impl Commitment {
    pub const ZERO: Commitment = Commitment([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", BigUint::from_bytes_be(&self.0))
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", self)
    }
}

/// Commitment parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid commitment '{0}': expected a decimal integer below 2^256")]
pub struct ParseCommitmentError(pub String);

impl FromStr for Commitment {
    type Err = ParseCommitmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = BigUint::parse_bytes(s.trim().as_bytes(), 10)
            .ok_or_else(|| ParseCommitmentError(s.to_string()))?;
        let be = value.to_bytes_be();
        if be.len() > 32 {
            return Err(ParseCommitmentError(s.to_string()));
        }
        let mut bytes = [0u8; 32];
        bytes[32 - be.len()..].copy_from_slice(&be);
        Ok(Self(bytes))
    }
}

impl Serialize for Commitment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// A 32-byte Merkle tree node hash, hex encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct MerkleNode(#[serde(with = "crate::serialization::hex32")] [u8; 32]);

/// Roots are the top node of a group's tree.
pub type MerkleRoot = MerkleNode;

impl MerkleNode {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for MerkleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for MerkleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MerkleNode({})", self.to_hex())
    }
}

impl FromStr for MerkleNode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::serialization::decode_hex32(s).map(Self)
    }
}

/// Static configuration of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub tree_depth: u8,
    #[serde(default)]
    pub issuer_did: Option<String>,
}

impl GroupConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, tree_depth: u8) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            tree_depth,
            issuer_did: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_issuer_did(mut self, did: impl Into<String>) -> Self {
        self.issuer_did = Some(did.into());
        self
    }
}

/// Read-only export of a group for API responses and public documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupState {
    pub id: String,
    pub config: GroupConfig,
    pub merkle_root: MerkleRoot,
    pub tree_depth: u8,
    /// Live members in leaf order.
    pub members: Vec<Commitment>,
    pub member_count: usize,
}

/// Persisted form of a group.
///
/// Leaves keep vacated slots (`None`) so that a restored tree has the exact
/// leaf layout, and therefore the exact root, it had when saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub config: GroupConfig,
    pub leaves: Vec<Option<Commitment>>,
}

/// Inclusion path for one leaf.
///
/// `siblings[i]` is the sibling at level `i` (leaf level first) and
/// `path_indices[i]` is `0` when the path node at that level is a left child,
/// `1` when it is a right child. Indices are the bits of the leaf index,
/// least significant first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf: Commitment,
    pub leaf_index: u64,
    pub root: MerkleRoot,
    pub siblings: Vec<MerkleNode>,
    pub path_indices: Vec<u8>,
}

/// One root transition of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootRecord {
    pub group_id: String,
    pub root: MerkleRoot,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(default)]
    pub block_height: Option<u64>,
}
