//! Persistence interfaces
//!
//! File, folder, chunk, and share records live behind traits so the
//! engine can run against sqlite in production and the in-memory store
//! in tests. The chunk registry and the share counter are the only
//! parts with real invariants; everything else is plain CRUD.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;

/// A storage volume: one logical container of files, mapped to the
/// messaging channel that holds its chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRecord {
    pub id: Uuid,
    pub name: String,
    pub channel_id: String,
    pub created_at: DateTime<Utc>,
}

/// File metadata. `size` is the client-declared total; the file is
/// complete once the persisted chunks cover `0..total_chunks-1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: Uuid,
    pub name: String,
    pub size: u64,
    pub mime_type: Option<String>,
    /// Owning storage volume, when the upload named one
    pub storage_id: Option<Uuid>,
    pub folder_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// One persisted chunk. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub file_id: Uuid,
    pub chunk_index: u64,
    pub chunk_size: u64,
    /// Offset into the identity pool at upload time. Pools may grow
    /// but never shrink below a stored index.
    pub identity_index: usize,
    pub message_ref: String,
    pub content_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderRecord {
    pub id: Uuid,
    pub name: String,
    /// Materialized path from the root, `/a/b/c`
    pub path: String,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// What a share link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareTarget {
    File(Uuid),
    Folder(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareRecord {
    pub token: String,
    pub target: ShareTarget,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_downloads: Option<u32>,
    /// SHA-256 hex digest; never plaintext
    pub password_hash: Option<String>,
    pub download_count: u32,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Updatable share limits.
#[derive(Debug, Clone, Default)]
pub struct ShareLimits {
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub max_downloads: Option<Option<u32>>,
    pub password_hash: Option<Option<String>>,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn create_file(&self, record: &FileRecord) -> Result<()>;
    async fn get_file(&self, id: Uuid) -> Result<Option<FileRecord>>;
    async fn list_files(&self, folder_id: Option<Uuid>) -> Result<Vec<FileRecord>>;
    async fn rename_file(&self, id: Uuid, name: &str) -> Result<()>;
    async fn delete_file(&self, id: Uuid) -> Result<()>;

    /// Number of files still referencing a storage volume. Guards
    /// storage deletion.
    async fn count_files_in_storage(&self, storage_id: Uuid) -> Result<u64>;
}

#[async_trait]
pub trait StorageStore: Send + Sync {
    async fn create_storage(&self, record: &StorageRecord) -> Result<()>;
    async fn get_storage(&self, id: Uuid) -> Result<Option<StorageRecord>>;
    async fn list_storages(&self) -> Result<Vec<StorageRecord>>;
    async fn delete_storage(&self, id: Uuid) -> Result<()>;
}

/// Ordered chunk metadata per file. Append-only: a duplicate
/// `(file_id, chunk_index)` is rejected, never replaced.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Persist one chunk. Returns `false` when the index is already
    /// present for the file (the record is left untouched).
    async fn append_chunk(&self, record: &ChunkRecord) -> Result<bool>;

    /// All chunks of a file, sorted by ascending index.
    async fn list_chunks(&self, file_id: Uuid) -> Result<Vec<ChunkRecord>>;

    async fn delete_chunks(&self, file_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait FolderStore: Send + Sync {
    async fn create_folder(&self, record: &FolderRecord) -> Result<()>;
    async fn get_folder(&self, id: Uuid) -> Result<Option<FolderRecord>>;
    async fn list_folders(&self, parent_id: Option<Uuid>) -> Result<Vec<FolderRecord>>;
    async fn delete_folder(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait ShareStore: Send + Sync {
    async fn create_share(&self, record: &ShareRecord) -> Result<()>;
    async fn get_share(&self, token: &str) -> Result<Option<ShareRecord>>;
    async fn update_share(&self, token: &str, limits: &ShareLimits) -> Result<Option<ShareRecord>>;
    async fn delete_share(&self, token: &str) -> Result<()>;

    /// Atomic increment-with-limit-check. Returns `false` when the
    /// quota is already exhausted; the counter is only moved on
    /// success. This is the single hot shared counter, so it must not
    /// be implemented as read-then-write.
    async fn try_consume_download(&self, token: &str) -> Result<bool>;
}
