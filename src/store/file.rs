//! File-backed store.
//!
//! One CBOR document per record under the store root:
//!
//! ```text
//! <root>/groups/<hex(group id)>.cbor       GroupRecord
//! <root>/roots/<hex(group id)>.cbor        Vec<RootRecord>, save order
//! <root>/proposals/<hex(proposal id)>.cbor Proposal
//! <root>/issued/<hex(issued id)>.cbor      IssuedCredential
//! ```
//!
//! File names are hex-encoded ids so arbitrary group ids never escape the
//! store directory. Documents are written to a temporary file and renamed
//! into place.

use super::{Store, StoreResult};
use crate::credential::IssuedCredential;
use crate::group::{GroupRecord, MerkleRoot, RootRecord};
use crate::proposal::Proposal;
use crate::serialization::{from_cbor, to_cbor};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

const GROUPS: &str = "groups";
const ROOTS: &str = "roots";
const PROPOSALS: &str = "proposals";
const ISSUED: &str = "issued";

/// Store writing CBOR documents to a directory tree.
pub struct FileStore {
    root: PathBuf,
    // serializes read-modify-write of root logs
    roots_lock: Mutex<()>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        for dir in [GROUPS, ROOTS, PROPOSALS, ISSUED] {
            fs::create_dir_all(root.join(dir)).await?;
        }
        tracing::debug!(path = %root.display(), "Opened file store");
        Ok(Self {
            root,
            roots_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    fn doc_path(&self, dir: &str, key: &str) -> PathBuf {
        self.root.join(dir).join(format!("{}.cbor", hex::encode(key)))
    }

    async fn write_doc<T: Serialize>(&self, path: &Path, value: &T) -> StoreResult<()> {
        let bytes = to_cbor(value)?;
        let tmp = path.with_extension("cbor.tmp");
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_doc<T: DeserializeOwned>(&self, path: &Path) -> StoreResult<Option<T>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(from_cbor(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_dir<T: DeserializeOwned>(&self, dir: &str) -> StoreResult<Vec<T>> {
        let mut entries = fs::read_dir(self.root.join(dir)).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "cbor") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut docs = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(doc) = self.read_doc(&path).await? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }
}

#[async_trait]
impl Store for FileStore {
    async fn save_group(&self, record: &GroupRecord) -> StoreResult<()> {
        let path = self.doc_path(GROUPS, &record.config.id);
        self.write_doc(&path, record).await
    }

    async fn get_group(&self, group_id: &str) -> StoreResult<Option<GroupRecord>> {
        self.read_doc(&self.doc_path(GROUPS, group_id)).await
    }

    async fn list_groups(&self) -> StoreResult<Vec<GroupRecord>> {
        self.read_dir(GROUPS).await
    }

    async fn save_root(&self, record: &RootRecord) -> StoreResult<()> {
        let _guard = self.roots_lock.lock().await;
        let path = self.doc_path(ROOTS, &record.group_id);
        let mut roots: Vec<RootRecord> = self.read_doc(&path).await?.unwrap_or_default();
        roots.retain(|r| r.root != record.root);
        roots.push(record.clone());
        self.write_doc(&path, &roots).await
    }

    async fn list_roots(&self, group_id: &str) -> StoreResult<Vec<RootRecord>> {
        let _guard = self.roots_lock.lock().await;
        Ok(self
            .read_doc(&self.doc_path(ROOTS, group_id))
            .await?
            .unwrap_or_default())
    }

    async fn delete_root(&self, group_id: &str, root: &MerkleRoot) -> StoreResult<()> {
        let _guard = self.roots_lock.lock().await;
        let path = self.doc_path(ROOTS, group_id);
        let Some(mut roots): Option<Vec<RootRecord>> = self.read_doc(&path).await? else {
            return Ok(());
        };
        roots.retain(|r| &r.root != root);
        self.write_doc(&path, &roots).await
    }

    async fn save_proposal(&self, proposal: &Proposal) -> StoreResult<()> {
        let path = self.doc_path(PROPOSALS, &proposal.id.to_string());
        self.write_doc(&path, proposal).await
    }

    async fn get_proposal(&self, proposal_id: &str) -> StoreResult<Option<Proposal>> {
        self.read_doc(&self.doc_path(PROPOSALS, proposal_id)).await
    }

    async fn list_proposals(&self) -> StoreResult<Vec<Proposal>> {
        self.read_dir(PROPOSALS).await
    }

    async fn save_issued(&self, issued: &IssuedCredential) -> StoreResult<()> {
        let path = self.doc_path(ISSUED, &issued.id);
        self.write_doc(&path, issued).await
    }

    async fn get_issued(&self, id: &str) -> StoreResult<Option<IssuedCredential>> {
        self.read_doc(&self.doc_path(ISSUED, id)).await
    }

    async fn list_issued(&self) -> StoreResult<Vec<IssuedCredential>> {
        self.read_dir(ISSUED).await
    }
}
