//! Persistence abstraction.
//!
//! The engine depends only on this narrow document CRUD contract:
//!
//! | Record | Key |
//! |---|---|
//! | `GroupRecord` | group id |
//! | `RootRecord` | (group id, root) |
//! | `Proposal` | proposal id |
//! | `IssuedCredential` | issued credential id |
//!
//! Saving an existing key replaces the stored document. Root records are
//! listed in save order; re-saving a root moves it to the end, so the last
//! record listed is always the group's most recent root.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::credential::IssuedCredential;
use crate::group::{GroupRecord, MerkleRoot, RootRecord};
use crate::proposal::Proposal;
use crate::serialization::SerializationError;
use async_trait::async_trait;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Document store used by the registry, proposal manager and issuer.
#[async_trait]
pub trait Store: Send + Sync {
    async fn save_group(&self, record: &GroupRecord) -> StoreResult<()>;
    async fn get_group(&self, group_id: &str) -> StoreResult<Option<GroupRecord>>;
    async fn list_groups(&self) -> StoreResult<Vec<GroupRecord>>;

    async fn save_root(&self, record: &RootRecord) -> StoreResult<()>;
    /// Root records of one group in save order.
    async fn list_roots(&self, group_id: &str) -> StoreResult<Vec<RootRecord>>;
    async fn delete_root(&self, group_id: &str, root: &MerkleRoot) -> StoreResult<()>;

    async fn save_proposal(&self, proposal: &Proposal) -> StoreResult<()>;
    async fn get_proposal(&self, proposal_id: &str) -> StoreResult<Option<Proposal>>;
    async fn list_proposals(&self) -> StoreResult<Vec<Proposal>>;

    async fn save_issued(&self, issued: &IssuedCredential) -> StoreResult<()>;
    async fn get_issued(&self, id: &str) -> StoreResult<Option<IssuedCredential>>;
    async fn list_issued(&self) -> StoreResult<Vec<IssuedCredential>>;
}
