//! Remote blob backend
//!
//! The external messaging service is used purely as write-once blob
//! storage via its attachment mechanism. It sits behind a narrow trait
//! so the Telegram client can be swapped for the in-memory backend in
//! tests and dev mode.

mod memory;
mod retry;
mod telegram;

pub use memory::MemoryBackend;
pub use retry::with_retry;
pub use telegram::TelegramBackend;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the remote backend, split by whether a retry can help.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Network-level or 5xx failure; retrying may succeed.
    #[error("Transient backend failure: {0}")]
    Transient(String),

    /// Backend asked us to slow down; retry after the given delay.
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Auth failure, malformed reference, or other non-retryable
    /// condition. Surfaced immediately.
    #[error("Permanent backend failure: {0}")]
    Permanent(String),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, BackendError::Permanent(_))
    }
}

/// References returned by a successful chunk upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    /// Message the chunk was posted as; needed for deletion.
    pub message_ref: String,
    /// Attachment handle; needed for download.
    pub content_ref: String,
}

/// Upload, download, and delete of one chunk against the external
/// service. Implementations are responsible for a *single* attempt;
/// retry policy lives in [`with_retry`].
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Push one chunk through the given identity. A failed upload
    /// leaves no orphaned reference behind.
    async fn upload(&self, identity_index: usize, bytes: &[u8])
        -> Result<RemoteRef, BackendError>;

    /// Fetch a chunk's bytes by its content reference.
    async fn download(
        &self,
        identity_index: usize,
        content_ref: &str,
    ) -> Result<Vec<u8>, BackendError>;

    /// Remove the message holding a chunk. Best effort; callers
    /// tolerate failure.
    async fn delete(&self, identity_index: usize, message_ref: &str) -> Result<(), BackendError>;
}
