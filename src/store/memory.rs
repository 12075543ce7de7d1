//! In-memory store.
//!
//! Default backend for tests and the demo. Writes can be made to fail on
//! demand to exercise the engine's abort-on-store-failure paths.

use super::{Store, StoreError, StoreResult};
use crate::credential::IssuedCredential;
use crate::group::{GroupRecord, MerkleRoot, RootRecord};
use crate::proposal::Proposal;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Documents {
    groups: BTreeMap<String, GroupRecord>,
    roots: HashMap<String, Vec<RootRecord>>,
    proposals: BTreeMap<String, Proposal>,
    issued: BTreeMap<String, IssuedCredential>,
}

/// Store backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<Documents>,
    fail_writes: AtomicBool,
    fail_group_writes: AtomicBool,
    fail_root_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (for testing).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make only group record writes fail.
    pub fn set_fail_group_writes(&self, fail: bool) {
        self.fail_group_writes.store(fail, Ordering::SeqCst);
    }

    /// Make only root record writes fail.
    pub fn set_fail_root_writes(&self, fail: bool) {
        self.fail_root_writes.store(fail, Ordering::SeqCst);
    }

    fn check_flag(flag: &AtomicBool) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("writes disabled".to_string()));
        }
        Ok(())
    }

    fn check_writable(&self) -> StoreResult<()> {
        Self::check_flag(&self.fail_writes)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_group(&self, record: &GroupRecord) -> StoreResult<()> {
        self.check_writable()?;
        Self::check_flag(&self.fail_group_writes)?;
        let mut docs = self.docs.write().await;
        docs.groups.insert(record.config.id.clone(), record.clone());
        Ok(())
    }

    async fn get_group(&self, group_id: &str) -> StoreResult<Option<GroupRecord>> {
        Ok(self.docs.read().await.groups.get(group_id).cloned())
    }

    async fn list_groups(&self) -> StoreResult<Vec<GroupRecord>> {
        Ok(self.docs.read().await.groups.values().cloned().collect())
    }

    async fn save_root(&self, record: &RootRecord) -> StoreResult<()> {
        self.check_writable()?;
        Self::check_flag(&self.fail_root_writes)?;
        let mut docs = self.docs.write().await;
        let roots = docs.roots.entry(record.group_id.clone()).or_default();
        roots.retain(|r| r.root != record.root);
        roots.push(record.clone());
        Ok(())
    }

    async fn list_roots(&self, group_id: &str) -> StoreResult<Vec<RootRecord>> {
        Ok(self
            .docs
            .read()
            .await
            .roots
            .get(group_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_root(&self, group_id: &str, root: &MerkleRoot) -> StoreResult<()> {
        self.check_writable()?;
        let mut docs = self.docs.write().await;
        if let Some(roots) = docs.roots.get_mut(group_id) {
            roots.retain(|r| &r.root != root);
        }
        Ok(())
    }

    async fn save_proposal(&self, proposal: &Proposal) -> StoreResult<()> {
        self.check_writable()?;
        let mut docs = self.docs.write().await;
        docs.proposals
            .insert(proposal.id.to_string(), proposal.clone());
        Ok(())
    }

    async fn get_proposal(&self, proposal_id: &str) -> StoreResult<Option<Proposal>> {
        Ok(self.docs.read().await.proposals.get(proposal_id).cloned())
    }

    async fn list_proposals(&self) -> StoreResult<Vec<Proposal>> {
        Ok(self.docs.read().await.proposals.values().cloned().collect())
    }

    async fn save_issued(&self, issued: &IssuedCredential) -> StoreResult<()> {
        self.check_writable()?;
        let mut docs = self.docs.write().await;
        docs.issued.insert(issued.id.clone(), issued.clone());
        Ok(())
    }

    async fn get_issued(&self, id: &str) -> StoreResult<Option<IssuedCredential>> {
        Ok(self.docs.read().await.issued.get(id).cloned())
    }

    async fn list_issued(&self) -> StoreResult<Vec<IssuedCredential>> {
        Ok(self.docs.read().await.issued.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::GroupConfig;

    fn root_record(group: &str, b: u8, ts: u64) -> RootRecord {
        RootRecord {
            group_id: group.to_string(),
            root: MerkleRoot::from_bytes([b; 32]),
            timestamp: ts,
            block_height: None,
        }
    }

    #[tokio::test]
    async fn test_group_roundtrip() {
        let store = MemoryStore::new();
        let record = GroupRecord {
            config: GroupConfig::new("g", "Group", 4),
            leaves: vec![],
        };
        store.save_group(&record).await.unwrap();
        assert_eq!(store.get_group("g").await.unwrap(), Some(record));
        assert_eq!(store.get_group("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_roots_upsert_moves_to_end() {
        let store = MemoryStore::new();
        store.save_root(&root_record("g", 1, 10)).await.unwrap();
        store.save_root(&root_record("g", 2, 20)).await.unwrap();
        store.save_root(&root_record("g", 1, 30)).await.unwrap();

        let roots = store.list_roots("g").await.unwrap();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].root, MerkleRoot::from_bytes([2; 32]));
        assert_eq!(roots[1].timestamp, 30);

        store
            .delete_root("g", &MerkleRoot::from_bytes([2; 32]))
            .await
            .unwrap();
        assert_eq!(store.list_roots("g").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(store.save_root(&root_record("g", 1, 10)).await.is_err());
        store.set_fail_writes(false);
        assert!(store.save_root(&root_record("g", 1, 10)).await.is_ok());
    }
}
