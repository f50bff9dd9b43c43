//! Application state management

use std::sync::Arc;

use crate::archive::ArchiveBuilder;
use crate::backend::{MemoryBackend, RemoteBackend, TelegramBackend};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::identity::{RotationStrategy, RoundRobinRotation};
use crate::share::ShareGate;
use crate::store::{
    ChunkStore, FileStore, FolderStore, MemoryStore, ShareStore, SqliteStore, StorageStore,
};
use crate::transfer::{Reassembler, Uploader};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    backend: Arc<dyn RemoteBackend>,
    storages: Arc<dyn StorageStore>,
    files: Arc<dyn FileStore>,
    chunks: Arc<dyn ChunkStore>,
    folders: Arc<dyn FolderStore>,
    shares: Arc<dyn ShareStore>,
    uploader: Uploader,
    reassembler: Arc<Reassembler>,
    archive_builder: ArchiveBuilder,
    share_gate: ShareGate,
}

impl AppState {
    /// Wire the engine against any store/backend pair.
    pub fn new<S>(config: Config, store: S, backend: Arc<dyn RemoteBackend>) -> Self
    where
        S: StorageStore + FileStore + ChunkStore + FolderStore + ShareStore + Clone + 'static,
    {
        let storages: Arc<dyn StorageStore> = Arc::new(store.clone());
        let files: Arc<dyn FileStore> = Arc::new(store.clone());
        let chunks: Arc<dyn ChunkStore> = Arc::new(store.clone());
        let folders: Arc<dyn FolderStore> = Arc::new(store.clone());
        let shares: Arc<dyn ShareStore> = Arc::new(store);

        let pool_size = config.telegram.bot_tokens.len().max(1);
        let rotation: Arc<dyn RotationStrategy> = Arc::new(RoundRobinRotation::new(pool_size));

        let uploader = Uploader::new(
            Arc::clone(&files),
            Arc::clone(&chunks),
            Arc::clone(&backend),
            Arc::clone(&rotation),
            config.limits.clone(),
        );

        let reassembler = Arc::new(Reassembler::new(
            Arc::clone(&chunks),
            Arc::clone(&backend),
            Arc::clone(&rotation),
            config.limits.download_parallelism,
            config.limits.retry_attempts,
        ));

        let archive_builder = ArchiveBuilder::new(
            Arc::clone(&files),
            Arc::clone(&folders),
            Arc::clone(&reassembler),
        );

        let share_gate = ShareGate::new(Arc::clone(&shares));

        Self {
            inner: Arc::new(AppStateInner {
                config,
                backend,
                storages,
                files,
                chunks,
                folders,
                shares,
                uploader,
                reassembler,
                archive_builder,
                share_gate,
            }),
        }
    }

    /// Production wiring: sqlite metadata, Telegram blob backend.
    pub fn with_sqlite(config: Config, store: SqliteStore) -> Result<Self> {
        let backend: Arc<dyn RemoteBackend> = if config.telegram.bot_tokens.is_empty() {
            tracing::warn!("No bot tokens configured, using the in-memory backend");
            Arc::new(MemoryBackend::new())
        } else {
            Arc::new(
                TelegramBackend::new(&config.telegram)
                    .map_err(|e| AppError::Internal(e.to_string()))?,
            )
        };

        Ok(Self::new(config, store, backend))
    }

    /// Fully in-memory wiring for tests and dev mode.
    pub fn in_memory(config: Config) -> Self {
        Self::new(config, MemoryStore::new(), Arc::new(MemoryBackend::new()))
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn backend(&self) -> &Arc<dyn RemoteBackend> {
        &self.inner.backend
    }

    pub fn storages(&self) -> &Arc<dyn StorageStore> {
        &self.inner.storages
    }

    pub fn files(&self) -> &Arc<dyn FileStore> {
        &self.inner.files
    }

    pub fn chunks(&self) -> &Arc<dyn ChunkStore> {
        &self.inner.chunks
    }

    pub fn folders(&self) -> &Arc<dyn FolderStore> {
        &self.inner.folders
    }

    pub fn shares(&self) -> &Arc<dyn ShareStore> {
        &self.inner.shares
    }

    pub fn uploader(&self) -> &Uploader {
        &self.inner.uploader
    }

    pub fn reassembler(&self) -> &Reassembler {
        &self.inner.reassembler
    }

    pub fn archive_builder(&self) -> &ArchiveBuilder {
        &self.inner.archive_builder
    }

    pub fn share_gate(&self) -> &ShareGate {
        &self.inner.share_gate
    }
}
