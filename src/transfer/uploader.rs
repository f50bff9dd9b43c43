//! Chunk accept path

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::backend::{with_retry, BackendError, RemoteBackend, RemoteRef};
use crate::chunk::ChunkDeclaration;
use crate::config::LimitsConfig;
use crate::error::{AppError, Result};
use crate::identity::RotationStrategy;
use crate::store::{ChunkRecord, ChunkStore, FileRecord, FileStore};

/// One incoming chunk with its client-declared position.
pub struct ChunkUpload {
    pub bytes: Vec<u8>,
    pub declaration: ChunkDeclaration,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub storage_id: Option<Uuid>,
    pub folder_id: Option<Uuid>,
    /// Required for every call after the first; the first call (index
    /// 0, no id) creates the File record.
    pub file_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct ChunkUploadOutcome {
    pub file_id: Uuid,
    pub chunk_index: u64,
    pub total_chunks: u64,
    pub is_complete: bool,
    pub uploaded_bytes: u64,
}

/// Accepts chunks, rotates identities, uploads, and persists chunk
/// provenance.
pub struct Uploader {
    files: Arc<dyn FileStore>,
    chunks: Arc<dyn ChunkStore>,
    backend: Arc<dyn RemoteBackend>,
    rotation: Arc<dyn RotationStrategy>,
    limits: LimitsConfig,
}

impl Uploader {
    pub fn new(
        files: Arc<dyn FileStore>,
        chunks: Arc<dyn ChunkStore>,
        backend: Arc<dyn RemoteBackend>,
        rotation: Arc<dyn RotationStrategy>,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            files,
            chunks,
            backend,
            rotation,
            limits,
        }
    }

    pub async fn accept_chunk(&self, upload: ChunkUpload) -> Result<ChunkUploadOutcome> {
        let decl = &upload.declaration;
        decl.validate(self.limits.max_chunk_size)?;

        if upload.bytes.len() as u64 != decl.chunk_len {
            return Err(AppError::InvalidChunkDeclaration(format!(
                "declared {} bytes but received {}",
                decl.chunk_len,
                upload.bytes.len()
            )));
        }

        let file = match upload.file_id {
            Some(file_id) => {
                let file = self
                    .files
                    .get_file(file_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("file {}", file_id)))?;

                if file.size != decl.file_size {
                    return Err(AppError::InvalidChunkDeclaration(format!(
                        "declared file size {} does not match record ({})",
                        decl.file_size, file.size
                    )));
                }

                file
            }
            None => {
                if decl.chunk_index != 0 {
                    return Err(AppError::InvalidChunkDeclaration(
                        "fileId is required for every chunk after the first".to_string(),
                    ));
                }

                let file = FileRecord {
                    id: Uuid::new_v4(),
                    name: upload.file_name.clone(),
                    size: decl.file_size,
                    mime_type: upload.mime_type.clone(),
                    storage_id: upload.storage_id,
                    folder_id: upload.folder_id,
                    created_at: Utc::now(),
                };
                self.files.create_file(&file).await?;

                tracing::info!(
                    file_id = %file.id,
                    name = %file.name,
                    size = file.size,
                    total_chunks = decl.total_chunks,
                    "Created file record"
                );

                file
            }
        };

        // Cheap early duplicate check; the registry's append is still
        // the authority under races.
        let existing = self.chunks.list_chunks(file.id).await?;
        if existing.iter().any(|c| c.chunk_index == decl.chunk_index) {
            return Err(AppError::InvalidChunkDeclaration(format!(
                "chunk {} already uploaded for file {}",
                decl.chunk_index, file.id
            )));
        }

        let (identity_index, remote) = self.upload_with_rotation(&upload.bytes).await?;

        let record = ChunkRecord {
            file_id: file.id,
            chunk_index: decl.chunk_index,
            chunk_size: decl.chunk_len,
            identity_index,
            message_ref: remote.message_ref.clone(),
            content_ref: remote.content_ref,
        };

        if !self.chunks.append_chunk(&record).await? {
            // A concurrent retry beat us to this index. The registry is
            // append-only, so drop the blob we just pushed.
            if let Err(e) = self.backend.delete(identity_index, &remote.message_ref).await {
                tracing::warn!(
                    file_id = %file.id,
                    chunk_index = decl.chunk_index,
                    error = %e,
                    "Failed to delete superseded chunk upload"
                );
            }
            return Err(AppError::InvalidChunkDeclaration(format!(
                "chunk {} already uploaded for file {}",
                decl.chunk_index, file.id
            )));
        }

        let stored = self.chunks.list_chunks(file.id).await?;
        let uploaded_bytes: u64 = stored.iter().map(|c| c.chunk_size).sum();
        let is_complete = stored.len() as u64 == decl.total_chunks;

        tracing::debug!(
            file_id = %file.id,
            chunk_index = decl.chunk_index,
            identity_index,
            uploaded_bytes,
            is_complete,
            "Accepted chunk"
        );

        Ok(ChunkUploadOutcome {
            file_id: file.id,
            chunk_index: decl.chunk_index,
            total_chunks: decl.total_chunks,
            is_complete,
            uploaded_bytes,
        })
    }

    /// Push one chunk through the pool. Each attempt draws a fresh
    /// identity from the rotator, so an identity that exhausts its
    /// transient-retry budget is routed around rather than hammered.
    async fn upload_with_rotation(&self, bytes: &[u8]) -> Result<(usize, RemoteRef)> {
        let attempts = self.limits.identity_attempts.max(1);
        let mut last_err: Option<BackendError> = None;

        for _ in 0..attempts {
            let identity_index = self.rotation.next();

            match with_retry(self.limits.retry_attempts, || {
                self.backend.upload(identity_index, bytes)
            })
            .await
            {
                Ok(remote) => return Ok((identity_index, remote)),
                Err(err @ BackendError::Permanent(_)) => {
                    return Err(AppError::upload(err));
                }
                Err(err) => {
                    tracing::warn!(
                        identity_index,
                        error = %err,
                        "Identity exhausted its retry budget, rotating"
                    );
                    last_err = Some(err);
                }
            }
        }

        Err(AppError::UploadFailed(
            last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no identities available".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::identity::RoundRobinRotation;
    use crate::store::MemoryStore;

    fn limits() -> LimitsConfig {
        LimitsConfig {
            max_chunk_size: 4,
            retry_attempts: 2,
            identity_attempts: 2,
            download_parallelism: 3,
        }
    }

    fn uploader(backend: MemoryBackend, store: MemoryStore) -> Uploader {
        Uploader::new(
            Arc::new(store.clone()),
            Arc::new(store),
            Arc::new(backend),
            Arc::new(RoundRobinRotation::new(2)),
            limits(),
        )
    }

    fn upload(
        bytes: &[u8],
        index: u64,
        total: u64,
        file_size: u64,
        file_id: Option<Uuid>,
    ) -> ChunkUpload {
        ChunkUpload {
            bytes: bytes.to_vec(),
            declaration: ChunkDeclaration {
                chunk_index: index,
                total_chunks: total,
                file_size,
                chunk_len: bytes.len() as u64,
            },
            file_name: "notes.txt".to_string(),
            mime_type: Some("text/plain".to_string()),
            storage_id: None,
            folder_id: None,
            file_id,
        }
    }

    #[tokio::test]
    async fn test_first_chunk_creates_file() {
        let store = MemoryStore::new();
        let uploader = uploader(MemoryBackend::new(), store.clone());

        let outcome = uploader
            .accept_chunk(upload(b"abcd", 0, 2, 6, None))
            .await
            .unwrap();

        assert!(!outcome.is_complete);
        assert_eq!(outcome.uploaded_bytes, 4);

        let file = crate::store::FileStore::get_file(&store, outcome.file_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(file.size, 6);
    }

    #[tokio::test]
    async fn test_final_chunk_marks_complete() {
        let store = MemoryStore::new();
        let uploader = uploader(MemoryBackend::new(), store.clone());

        let first = uploader
            .accept_chunk(upload(b"abcd", 0, 2, 6, None))
            .await
            .unwrap();
        let second = uploader
            .accept_chunk(upload(b"ef", 1, 2, 6, Some(first.file_id)))
            .await
            .unwrap();

        assert!(second.is_complete);
        assert_eq!(second.uploaded_bytes, 6);
    }

    #[tokio::test]
    async fn test_later_chunk_requires_file_id() {
        let uploader = uploader(MemoryBackend::new(), MemoryStore::new());

        let err = uploader
            .accept_chunk(upload(b"ab", 1, 2, 6, None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidChunkDeclaration(_)));
    }

    #[tokio::test]
    async fn test_duplicate_index_rejected() {
        let store = MemoryStore::new();
        let uploader = uploader(MemoryBackend::new(), store.clone());

        let first = uploader
            .accept_chunk(upload(b"abcd", 0, 2, 6, None))
            .await
            .unwrap();
        let err = uploader
            .accept_chunk(upload(b"abcd", 0, 2, 6, Some(first.file_id)))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidChunkDeclaration(_)));
        let stored = crate::store::ChunkStore::list_chunks(&store, first.file_id)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_identity_is_rotated_around() {
        let backend = MemoryBackend::new();
        backend.fail_identity(0).await;
        let store = MemoryStore::new();
        let uploader = uploader(backend, store.clone());

        let outcome = uploader
            .accept_chunk(upload(b"abcd", 0, 1, 4, None))
            .await
            .unwrap();

        let stored = crate::store::ChunkStore::list_chunks(&store, outcome.file_id)
            .await
            .unwrap();
        assert_eq!(stored[0].identity_index, 1);
    }
}
