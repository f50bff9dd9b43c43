//! Ordered reconstruction of chunked files

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::backend::{with_retry, RemoteBackend};
use crate::error::{AppError, Result};
use crate::identity::RotationStrategy;
use crate::store::{ChunkRecord, ChunkStore, FileRecord};

/// Reconstructs a file from its persisted chunks, byte-identical to the
/// original upload regardless of fetch completion order.
pub struct Reassembler {
    chunks: Arc<dyn ChunkStore>,
    backend: Arc<dyn RemoteBackend>,
    rotation: Arc<dyn RotationStrategy>,
    parallelism: usize,
    retry_attempts: u32,
}

impl Reassembler {
    pub fn new(
        chunks: Arc<dyn ChunkStore>,
        backend: Arc<dyn RemoteBackend>,
        rotation: Arc<dyn RotationStrategy>,
        parallelism: usize,
        retry_attempts: u32,
    ) -> Self {
        Self {
            chunks,
            backend,
            rotation,
            parallelism: parallelism.max(1),
            retry_attempts,
        }
    }

    /// Validate that the registry holds a complete, well-formed chunk
    /// sequence for the file before any fetch is issued.
    async fn complete_chunks(&self, file: &FileRecord) -> Result<Vec<ChunkRecord>> {
        let chunks = self.chunks.list_chunks(file.id).await?;

        if chunks.is_empty() {
            return Err(AppError::DownloadFailed(format!(
                "file {} has no chunks",
                file.id
            )));
        }

        for (expected, chunk) in chunks.iter().enumerate() {
            if chunk.chunk_index != expected as u64 {
                return Err(AppError::DownloadFailed(format!(
                    "file {} chunk sequence has a gap at index {}",
                    file.id, expected
                )));
            }
            if chunk.identity_index >= self.rotation.pool_size() {
                return Err(AppError::DownloadFailed(format!(
                    "file {} chunk {} references identity {} beyond pool size {}",
                    file.id,
                    chunk.chunk_index,
                    chunk.identity_index,
                    self.rotation.pool_size()
                )));
            }
        }

        let total: u64 = chunks.iter().map(|c| c.chunk_size).sum();
        if total != file.size {
            return Err(AppError::DownloadFailed(format!(
                "file {} is incomplete: {} of {} bytes persisted",
                file.id, total, file.size
            )));
        }

        Ok(chunks)
    }

    /// Reconstruct the file as an ordered byte stream.
    ///
    /// Fetches run with bounded parallelism; `buffered` keeps up to
    /// `parallelism` downloads in flight while yielding strictly in
    /// index order. Any chunk failure after retries surfaces as an
    /// error item; the caller must abort, never emit partial output.
    pub async fn reconstruct(
        &self,
        file: &FileRecord,
    ) -> Result<impl Stream<Item = Result<Bytes>> + Send + 'static> {
        let chunks = self.complete_chunks(file).await?;

        tracing::debug!(
            file_id = %file.id,
            chunk_count = chunks.len(),
            size = file.size,
            "Starting reconstruction"
        );

        let backend = Arc::clone(&self.backend);
        let retry_attempts = self.retry_attempts;

        let stream = stream::iter(chunks)
            .map(move |chunk| {
                let backend = Arc::clone(&backend);
                async move {
                    let bytes = with_retry(retry_attempts, || {
                        backend.download(chunk.identity_index, &chunk.content_ref)
                    })
                    .await
                    .map_err(AppError::download)?;

                    if bytes.len() as u64 != chunk.chunk_size {
                        return Err(AppError::DownloadFailed(format!(
                            "chunk {} of file {} returned {} bytes, expected {}",
                            chunk.chunk_index,
                            chunk.file_id,
                            bytes.len(),
                            chunk.chunk_size
                        )));
                    }

                    Ok(Bytes::from(bytes))
                }
            })
            .buffered(self.parallelism);

        Ok(stream)
    }

    /// Reconstruct the whole file into memory. Used by the archive
    /// builder, which needs complete entries.
    pub async fn reconstruct_bytes(&self, file: &FileRecord) -> Result<Vec<u8>> {
        let mut stream = Box::pin(self.reconstruct(file).await?);
        let mut out = Vec::with_capacity(file.size as usize);

        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk?);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::identity::RoundRobinRotation;
    use crate::store::{FileStore, MemoryStore};
    use chrono::Utc;
    use uuid::Uuid;

    async fn seed_file(
        store: &MemoryStore,
        backend: &MemoryBackend,
        parts: &[&[u8]],
    ) -> FileRecord {
        let file = FileRecord {
            id: Uuid::new_v4(),
            name: "data.bin".to_string(),
            size: parts.iter().map(|p| p.len() as u64).sum(),
            mime_type: None,
            storage_id: None,
            folder_id: None,
            created_at: Utc::now(),
        };
        store.create_file(&file).await.unwrap();

        for (index, part) in parts.iter().enumerate() {
            let remote = backend.upload(index % 2, part).await.unwrap();
            let record = ChunkRecord {
                file_id: file.id,
                chunk_index: index as u64,
                chunk_size: part.len() as u64,
                identity_index: index % 2,
                message_ref: remote.message_ref,
                content_ref: remote.content_ref,
            };
            crate::store::ChunkStore::append_chunk(store, &record)
                .await
                .unwrap();
        }

        file
    }

    fn reassembler(store: MemoryStore, backend: MemoryBackend) -> Reassembler {
        Reassembler::new(
            Arc::new(store),
            Arc::new(backend),
            Arc::new(RoundRobinRotation::new(2)),
            3,
            2,
        )
    }

    #[tokio::test]
    async fn test_reconstruct_joins_in_order() {
        let store = MemoryStore::new();
        let backend = MemoryBackend::new();
        let file = seed_file(&store, &backend, &[b"hello ", b"chunked ", b"world"]).await;

        let bytes = reassembler(store, backend)
            .reconstruct_bytes(&file)
            .await
            .unwrap();
        assert_eq!(bytes, b"hello chunked world");
    }

    #[tokio::test]
    async fn test_incomplete_file_rejected() {
        let store = MemoryStore::new();
        let backend = MemoryBackend::new();
        let mut file = seed_file(&store, &backend, &[b"hello"]).await;
        file.size += 1;

        let err = reassembler(store, backend)
            .reconstruct_bytes(&file)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DownloadFailed(_)));
    }

    #[tokio::test]
    async fn test_gap_in_sequence_rejected() {
        let store = MemoryStore::new();
        let backend = MemoryBackend::new();
        let file = FileRecord {
            id: Uuid::new_v4(),
            name: "gap.bin".to_string(),
            size: 4,
            mime_type: None,
            storage_id: None,
            folder_id: None,
            created_at: Utc::now(),
        };
        store.create_file(&file).await.unwrap();

        let remote = backend.upload(0, b"abcd").await.unwrap();
        crate::store::ChunkStore::append_chunk(
            &store,
            &ChunkRecord {
                file_id: file.id,
                chunk_index: 1,
                chunk_size: 4,
                identity_index: 0,
                message_ref: remote.message_ref,
                content_ref: remote.content_ref,
            },
        )
        .await
        .unwrap();

        let err = reassembler(store, backend)
            .reconstruct_bytes(&file)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DownloadFailed(_)));
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_whole_reconstruction() {
        let store = MemoryStore::new();
        let backend = MemoryBackend::new();
        let file = seed_file(&store, &backend, &[b"aa", b"bb", b"cc"]).await;

        let chunks = crate::store::ChunkStore::list_chunks(&store, file.id)
            .await
            .unwrap();
        backend.poison_content(&chunks[1].content_ref).await;

        let err = reassembler(store, backend)
            .reconstruct_bytes(&file)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DownloadFailed(_)));
    }
}
