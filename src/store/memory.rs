//! In-memory store
//!
//! Implements every persistence trait over locked maps. Used by tests
//! and by dev mode when no database is configured.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::Result;

use super::{
    ChunkRecord, ChunkStore, FileRecord, FileStore, FolderRecord, FolderStore, ShareLimits,
    ShareRecord, ShareStore, StorageRecord, StorageStore,
};

#[derive(Default)]
struct MemoryStoreInner {
    storages: RwLock<HashMap<Uuid, StorageRecord>>,
    files: RwLock<HashMap<Uuid, FileRecord>>,
    /// chunk_index -> record, per file; BTreeMap keeps list order
    chunks: RwLock<HashMap<Uuid, BTreeMap<u64, ChunkRecord>>>,
    folders: RwLock<HashMap<Uuid, FolderRecord>>,
    /// Mutex (not RwLock) so consume is a single critical section
    shares: Mutex<HashMap<String, ShareRecord>>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn create_file(&self, record: &FileRecord) -> Result<()> {
        self.inner.files.write().await.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_file(&self, id: Uuid) -> Result<Option<FileRecord>> {
        Ok(self.inner.files.read().await.get(&id).cloned())
    }

    async fn list_files(&self, folder_id: Option<Uuid>) -> Result<Vec<FileRecord>> {
        let files = self.inner.files.read().await;
        let mut out: Vec<FileRecord> = files
            .values()
            .filter(|f| f.folder_id == folder_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn rename_file(&self, id: Uuid, name: &str) -> Result<()> {
        if let Some(file) = self.inner.files.write().await.get_mut(&id) {
            file.name = name.to_string();
        }
        Ok(())
    }

    async fn delete_file(&self, id: Uuid) -> Result<()> {
        self.inner.files.write().await.remove(&id);
        Ok(())
    }

    async fn count_files_in_storage(&self, storage_id: Uuid) -> Result<u64> {
        let files = self.inner.files.read().await;
        Ok(files
            .values()
            .filter(|f| f.storage_id == Some(storage_id))
            .count() as u64)
    }
}

#[async_trait]
impl StorageStore for MemoryStore {
    async fn create_storage(&self, record: &StorageRecord) -> Result<()> {
        self.inner
            .storages
            .write()
            .await
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn get_storage(&self, id: Uuid) -> Result<Option<StorageRecord>> {
        Ok(self.inner.storages.read().await.get(&id).cloned())
    }

    async fn list_storages(&self) -> Result<Vec<StorageRecord>> {
        let storages = self.inner.storages.read().await;
        let mut out: Vec<StorageRecord> = storages.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn delete_storage(&self, id: Uuid) -> Result<()> {
        self.inner.storages.write().await.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn append_chunk(&self, record: &ChunkRecord) -> Result<bool> {
        let mut chunks = self.inner.chunks.write().await;
        let per_file = chunks.entry(record.file_id).or_default();
        if per_file.contains_key(&record.chunk_index) {
            return Ok(false);
        }
        per_file.insert(record.chunk_index, record.clone());
        Ok(true)
    }

    async fn list_chunks(&self, file_id: Uuid) -> Result<Vec<ChunkRecord>> {
        let chunks = self.inner.chunks.read().await;
        Ok(chunks
            .get(&file_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_chunks(&self, file_id: Uuid) -> Result<()> {
        self.inner.chunks.write().await.remove(&file_id);
        Ok(())
    }
}

#[async_trait]
impl FolderStore for MemoryStore {
    async fn create_folder(&self, record: &FolderRecord) -> Result<()> {
        self.inner
            .folders
            .write()
            .await
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn get_folder(&self, id: Uuid) -> Result<Option<FolderRecord>> {
        Ok(self.inner.folders.read().await.get(&id).cloned())
    }

    async fn list_folders(&self, parent_id: Option<Uuid>) -> Result<Vec<FolderRecord>> {
        let folders = self.inner.folders.read().await;
        let mut out: Vec<FolderRecord> = folders
            .values()
            .filter(|f| f.parent_id == parent_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn delete_folder(&self, id: Uuid) -> Result<()> {
        self.inner.folders.write().await.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl ShareStore for MemoryStore {
    async fn create_share(&self, record: &ShareRecord) -> Result<()> {
        self.inner
            .shares
            .lock()
            .await
            .insert(record.token.clone(), record.clone());
        Ok(())
    }

    async fn get_share(&self, token: &str) -> Result<Option<ShareRecord>> {
        Ok(self.inner.shares.lock().await.get(token).cloned())
    }

    async fn update_share(&self, token: &str, limits: &ShareLimits) -> Result<Option<ShareRecord>> {
        let mut shares = self.inner.shares.lock().await;
        let Some(share) = shares.get_mut(token) else {
            return Ok(None);
        };

        if let Some(expires_at) = &limits.expires_at {
            share.expires_at = *expires_at;
        }
        if let Some(max_downloads) = &limits.max_downloads {
            share.max_downloads = *max_downloads;
        }
        if let Some(password_hash) = &limits.password_hash {
            share.password_hash = password_hash.clone();
        }

        Ok(Some(share.clone()))
    }

    async fn delete_share(&self, token: &str) -> Result<()> {
        self.inner.shares.lock().await.remove(token);
        Ok(())
    }

    async fn try_consume_download(&self, token: &str) -> Result<bool> {
        // Check and increment under one lock so two concurrent
        // requests can never both pass a shared pre-check.
        let mut shares = self.inner.shares.lock().await;
        let Some(share) = shares.get_mut(token) else {
            return Ok(false);
        };

        if let Some(max) = share.max_downloads {
            if share.download_count >= max {
                return Ok(false);
            }
        }

        share.download_count += 1;
        Ok(true)
    }
}
