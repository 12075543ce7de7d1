//! Group registry - the sole mutator of group membership.
//!
//! ## Atomicity
//!
//! Each group sits behind its own `tokio::sync::RwLock`. A membership change
//! takes the write lock, applies the change to a staged copy, persists the
//! new root record and then the group record, swaps the staged copy in and
//! appends the root to the history before releasing the lock. Readers
//! therefore never observe a root without its history record, and a failed
//! store write leaves the live group untouched.
//!
//! The outer id map is a short-held `std::sync::RwLock`, so operations on
//! different groups never wait on each other.

use super::history::MerkleRootHistory;
use super::tree::{MerkleTree, TreeError};
use super::types::{
    Commitment, GroupConfig, GroupRecord, GroupState, MerkleProof, MerkleRoot, RootRecord,
};
use crate::clock::now_millis;
use crate::error::{ApprovalError, ApprovalResult};
use crate::store::Store;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A group: configuration plus a Merkle tree of member commitments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    config: GroupConfig,
    tree: MerkleTree,
    // live member -> leaf index
    members: HashMap<Commitment, u64>,
}

impl Group {
    /// Empty group.
    pub fn new(config: GroupConfig) -> ApprovalResult<Self> {
        let tree = MerkleTree::new(config.tree_depth)
            .map_err(|e| ApprovalError::InvalidParameters(e.to_string()))?;
        Ok(Self {
            config,
            tree,
            members: HashMap::new(),
        })
    }

    /// Rebuild from a persisted record.
    pub fn from_record(record: GroupRecord) -> ApprovalResult<Self> {
        let tree = MerkleTree::from_leaves(record.config.tree_depth, &record.leaves)
            .map_err(|e| ApprovalError::CorruptState(format!("group {}: {}", record.config.id, e)))?;
        let mut members = HashMap::new();
        for (index, leaf) in record.leaves.iter().enumerate() {
            if let Some(commitment) = leaf {
                if members.insert(*commitment, index as u64).is_some() {
                    return Err(ApprovalError::CorruptState(format!(
                        "group {}: duplicate member {}",
                        record.config.id, commitment
                    )));
                }
            }
        }
        Ok(Self {
            config: record.config,
            tree,
            members,
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    /// Current root, always derived from the tree.
    pub fn merkle_root(&self) -> MerkleRoot {
        self.tree.root()
    }

    pub fn tree_depth(&self) -> u8 {
        self.tree.depth()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn has_member(&self, commitment: &Commitment) -> bool {
        self.members.contains_key(commitment)
    }

    /// Live members in leaf order.
    pub fn members(&self) -> Vec<Commitment> {
        self.tree.leaves().into_iter().flatten().collect()
    }

    pub fn merkle_proof(&self, commitment: &Commitment) -> ApprovalResult<MerkleProof> {
        let index = self
            .members
            .get(commitment)
            .ok_or_else(|| self.member_not_found(commitment))?;
        self.tree
            .proof(*index)
            .map_err(|e| ApprovalError::CorruptState(e.to_string()))
    }

    pub fn export_state(&self) -> GroupState {
        let members = self.members();
        GroupState {
            id: self.config.id.clone(),
            config: self.config.clone(),
            merkle_root: self.merkle_root(),
            tree_depth: self.tree_depth(),
            member_count: members.len(),
            members,
        }
    }

    pub fn to_record(&self) -> GroupRecord {
        GroupRecord {
            config: self.config.clone(),
            leaves: self.tree.leaves(),
        }
    }

    fn add_member(&mut self, commitment: Commitment) -> ApprovalResult<u64> {
        if commitment.is_zero() {
            return Err(ApprovalError::InvalidCommitment(
                "zero is reserved for vacant leaves".to_string(),
            ));
        }
        if self.has_member(&commitment) {
            return Err(ApprovalError::DuplicateMember {
                group_id: self.config.id.clone(),
                commitment,
            });
        }
        let index = self.tree.insert(commitment).map_err(|e| match e {
            TreeError::Full(capacity) => ApprovalError::GroupFull {
                group_id: self.config.id.clone(),
                capacity,
            },
            other => ApprovalError::CorruptState(other.to_string()),
        })?;
        self.members.insert(commitment, index);
        Ok(index)
    }

    fn remove_member(&mut self, commitment: &Commitment) -> ApprovalResult<u64> {
        let index = self
            .members
            .remove(commitment)
            .ok_or_else(|| self.member_not_found(commitment))?;
        self.tree
            .remove(index)
            .map_err(|e| ApprovalError::CorruptState(e.to_string()))?;
        Ok(index)
    }

    fn member_not_found(&self, commitment: &Commitment) -> ApprovalError {
        ApprovalError::MemberNotFound {
            group_id: self.config.id.clone(),
            commitment: *commitment,
        }
    }
}

type GroupCell = Arc<tokio::sync::RwLock<Group>>;

/// Registry of all groups.
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, GroupCell>>,
    history: Arc<MerkleRootHistory>,
    store: Arc<dyn Store>,
}

impl GroupRegistry {
    pub fn new(store: Arc<dyn Store>, history: Arc<MerkleRootHistory>) -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            history,
            store,
        }
    }

    /// Rebuild the registry and root history from the store.
    ///
    /// Every persisted group's rebuilt root must appear among its root
    /// records; otherwise the state is rejected as corrupt. Records saved
    /// after that one belong to a mutation whose group write never landed and
    /// are dropped from the store.
    pub async fn restore(
        store: Arc<dyn Store>,
        history: Arc<MerkleRootHistory>,
    ) -> ApprovalResult<Self> {
        let registry = Self::new(store.clone(), history.clone());
        let records = store.list_groups().await?;
        for record in records {
            let group = Group::from_record(record)?;
            let mut roots = store.list_roots(group.id()).await?;
            if roots.is_empty() {
                return Err(ApprovalError::CorruptState(format!(
                    "group {} has no root records",
                    group.id()
                )));
            }
            let Some(current) = roots.iter().rposition(|r| r.root == group.merkle_root())
            else {
                return Err(ApprovalError::CorruptState(format!(
                    "group {}: rebuilt root {} is not among its root records",
                    group.id(),
                    group.merkle_root()
                )));
            };
            for orphan in roots.split_off(current + 1) {
                tracing::warn!(
                    group_id = %group.id(),
                    root = %orphan.root,
                    "Dropping root record of an unfinished membership change"
                );
                store.delete_root(group.id(), &orphan.root).await?;
            }
            for root in roots {
                history.track_record(root);
            }
            tracing::info!(
                group_id = %group.id(),
                members = group.member_count(),
                root = %group.merkle_root(),
                "Restored group"
            );
            registry
                .groups
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(group.id().to_string(), Arc::new(tokio::sync::RwLock::new(group)));
        }
        Ok(registry)
    }

    pub fn history(&self) -> &Arc<MerkleRootHistory> {
        &self.history
    }

    /// Create an empty group and record its initial root.
    pub async fn create_group(&self, config: GroupConfig) -> ApprovalResult<GroupState> {
        let group = Group::new(config)?;
        let group_id = group.id().to_string();
        let cell: GroupCell = Arc::new(tokio::sync::RwLock::new(group));
        // held until persisted, so nobody reads a group without its root record
        let guard = cell.clone().write_owned().await;

        {
            let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
            if groups.contains_key(&group_id) {
                return Err(ApprovalError::DuplicateGroup(group_id));
            }
            groups.insert(group_id.clone(), cell);
        }

        let record = self.next_root_record(&group_id, guard.merkle_root());
        if let Err(e) = self.persist(&guard, &record).await {
            self.groups
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&group_id);
            return Err(e);
        }
        self.history.track_record(record);

        tracing::info!(
            group_id = %group_id,
            tree_depth = guard.tree_depth(),
            root = %guard.merkle_root(),
            "Created group"
        );
        Ok(guard.export_state())
    }

    /// Add a member; returns the new root record.
    pub async fn add_member(
        &self,
        group_id: &str,
        commitment: Commitment,
    ) -> ApprovalResult<RootRecord> {
        let cell = self.cell(group_id)?;
        let mut group = cell.write().await;

        let mut staged = group.clone();
        let index = staged.add_member(commitment)?;
        let record = self.next_root_record(group_id, staged.merkle_root());
        self.persist(&staged, &record).await?;

        *group = staged;
        let record = self.history.track_record(record);
        tracing::info!(
            group_id = %group_id,
            leaf_index = index,
            members = group.member_count(),
            root = %record.root,
            "Added member"
        );
        Ok(record)
    }

    /// Remove a member by vacating its leaf; returns the new root record.
    pub async fn remove_member(
        &self,
        group_id: &str,
        commitment: &Commitment,
    ) -> ApprovalResult<RootRecord> {
        let cell = self.cell(group_id)?;
        let mut group = cell.write().await;

        let mut staged = group.clone();
        let index = staged.remove_member(commitment)?;
        let record = self.next_root_record(group_id, staged.merkle_root());
        self.persist(&staged, &record).await?;

        *group = staged;
        let record = self.history.track_record(record);
        tracing::info!(
            group_id = %group_id,
            leaf_index = index,
            members = group.member_count(),
            root = %record.root,
            "Removed member"
        );
        Ok(record)
    }

    /// Inclusion proof for a member's current leaf.
    pub async fn get_merkle_proof(
        &self,
        group_id: &str,
        commitment: &Commitment,
    ) -> ApprovalResult<MerkleProof> {
        let cell = self.cell(group_id)?;
        let group = cell.read().await;
        group.merkle_proof(commitment)
    }

    pub async fn export_state(&self, group_id: &str) -> ApprovalResult<GroupState> {
        let cell = self.cell(group_id)?;
        let group = cell.read().await;
        Ok(group.export_state())
    }

    /// Alias of [`Self::export_state`].
    pub async fn get_group(&self, group_id: &str) -> ApprovalResult<GroupState> {
        self.export_state(group_id).await
    }

    /// Owned copy of a group, e.g. for handing to the proof system.
    pub async fn snapshot(&self, group_id: &str) -> ApprovalResult<Group> {
        let cell = self.cell(group_id)?;
        let group = cell.read().await;
        Ok(group.clone())
    }

    pub async fn merkle_root(&self, group_id: &str) -> ApprovalResult<MerkleRoot> {
        let cell = self.cell(group_id)?;
        let group = cell.read().await;
        Ok(group.merkle_root())
    }

    pub async fn member_count(&self, group_id: &str) -> ApprovalResult<usize> {
        let cell = self.cell(group_id)?;
        let group = cell.read().await;
        Ok(group.member_count())
    }

    /// Every group, ordered by id.
    pub async fn list_groups(&self) -> Vec<GroupState> {
        let mut cells: Vec<(String, GroupCell)> = {
            let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
            groups
                .iter()
                .map(|(id, cell)| (id.clone(), cell.clone()))
                .collect()
        };
        cells.sort_by(|a, b| a.0.cmp(&b.0));

        let mut states = Vec::with_capacity(cells.len());
        for (_, cell) in cells {
            states.push(cell.read().await.export_state());
        }
        states
    }

    pub fn contains(&self, group_id: &str) -> bool {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(group_id)
    }

    fn cell(&self, group_id: &str) -> ApprovalResult<GroupCell> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(group_id)
            .cloned()
            .ok_or_else(|| ApprovalError::GroupNotFound(group_id.to_string()))
    }

    fn next_root_record(&self, group_id: &str, root: MerkleRoot) -> RootRecord {
        let latest = self
            .history
            .latest_root(group_id)
            .map(|r| r.timestamp)
            .unwrap_or(0);
        RootRecord {
            group_id: group_id.to_string(),
            root,
            timestamp: now_millis().max(latest),
            block_height: None,
        }
    }

    /// Root first: a crash between the two writes leaves a trailing root
    /// record, which `restore` drops.
    async fn persist(&self, group: &Group, record: &RootRecord) -> ApprovalResult<()> {
        self.store.save_root(record).await?;
        self.store.save_group(&group.to_record()).await?;
        Ok(())
    }
}
