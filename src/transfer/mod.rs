//! Chunk transfer engine
//!
//! The uploader accepts client-declared chunks and pushes them through
//! rotating identities; the reassembler reconstructs files byte-exact
//! with bounded-parallel fetches. Remote cleanup on file deletion is
//! best effort and never blocks metadata removal.

mod reassembler;
mod uploader;

pub use reassembler::Reassembler;
pub use uploader::{ChunkUpload, ChunkUploadOutcome, Uploader};

use std::sync::Arc;

use futures::future::join_all;

use crate::backend::RemoteBackend;
use crate::store::ChunkRecord;

/// Issue remote deletes for all chunks in parallel and wait for them to
/// settle. Failures are logged and tolerated; orphaned remote data is
/// preferred over blocking a user-facing deletion.
pub async fn purge_remote(backend: &Arc<dyn RemoteBackend>, chunks: &[ChunkRecord]) {
    let deletes = chunks.iter().map(|chunk| {
        let backend = Arc::clone(backend);
        async move {
            if let Err(e) = backend
                .delete(chunk.identity_index, &chunk.message_ref)
                .await
            {
                tracing::warn!(
                    file_id = %chunk.file_id,
                    chunk_index = chunk.chunk_index,
                    error = %e,
                    "Remote chunk delete failed, leaving orphan"
                );
            }
        }
    });

    join_all(deletes).await;
}
