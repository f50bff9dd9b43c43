//! In-memory backend
//!
//! Drop-in [`RemoteBackend`] used by tests and by dev mode when no bot
//! tokens are configured. Supports failure injection so transfer and
//! archive error paths can be exercised deterministically.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BackendError, RemoteBackend, RemoteRef};

#[derive(Default)]
struct MemoryBackendInner {
    /// content_ref -> chunk bytes
    objects: RwLock<HashMap<String, Vec<u8>>>,
    /// message_ref -> content_ref, for delete
    messages: RwLock<HashMap<String, String>>,
    /// content refs that fail every download
    poisoned: RwLock<HashSet<String>>,
    /// identities that fail every upload with a transient error
    failing_identities: RwLock<HashSet<usize>>,
}

/// In-memory blob store keyed by generated references.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<MemoryBackendInner>,
    next_id: Arc<AtomicU64>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every download of `content_ref` fail with a transient error.
    pub async fn poison_content(&self, content_ref: &str) {
        self.inner
            .poisoned
            .write()
            .await
            .insert(content_ref.to_string());
    }

    /// Make every upload through `identity_index` fail with a transient
    /// error.
    pub async fn fail_identity(&self, identity_index: usize) {
        self.inner
            .failing_identities
            .write()
            .await
            .insert(identity_index);
    }

    /// Number of stored objects.
    pub async fn object_count(&self) -> usize {
        self.inner.objects.read().await.len()
    }
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    async fn upload(
        &self,
        identity_index: usize,
        bytes: &[u8],
    ) -> Result<RemoteRef, BackendError> {
        if self
            .inner
            .failing_identities
            .read()
            .await
            .contains(&identity_index)
        {
            return Err(BackendError::Transient(format!(
                "identity {} unavailable",
                identity_index
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message_ref = format!("msg-{}", id);
        let content_ref = format!("blob-{}", id);

        self.inner
            .objects
            .write()
            .await
            .insert(content_ref.clone(), bytes.to_vec());
        self.inner
            .messages
            .write()
            .await
            .insert(message_ref.clone(), content_ref.clone());

        Ok(RemoteRef {
            message_ref,
            content_ref,
        })
    }

    async fn download(
        &self,
        _identity_index: usize,
        content_ref: &str,
    ) -> Result<Vec<u8>, BackendError> {
        if self.inner.poisoned.read().await.contains(content_ref) {
            return Err(BackendError::Transient(format!(
                "content {} unavailable",
                content_ref
            )));
        }

        self.inner
            .objects
            .read()
            .await
            .get(content_ref)
            .cloned()
            .ok_or_else(|| {
                BackendError::Permanent(format!("unknown content ref {}", content_ref))
            })
    }

    async fn delete(&self, _identity_index: usize, message_ref: &str) -> Result<(), BackendError> {
        let content_ref = self.inner.messages.write().await.remove(message_ref);
        match content_ref {
            Some(content_ref) => {
                self.inner.objects.write().await.remove(&content_ref);
                Ok(())
            }
            None => Err(BackendError::Permanent(format!(
                "unknown message ref {}",
                message_ref
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_download_delete() {
        let backend = MemoryBackend::new();

        let remote = backend.upload(0, b"hello").await.unwrap();
        assert_eq!(backend.download(0, &remote.content_ref).await.unwrap(), b"hello");

        backend.delete(0, &remote.message_ref).await.unwrap();
        assert!(backend.download(0, &remote.content_ref).await.is_err());
        assert_eq!(backend.object_count().await, 0);
    }

    #[tokio::test]
    async fn test_poisoned_content_fails_download() {
        let backend = MemoryBackend::new();
        let remote = backend.upload(0, b"data").await.unwrap();

        backend.poison_content(&remote.content_ref).await;
        let err = backend.download(0, &remote.content_ref).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_failing_identity_rejects_upload() {
        let backend = MemoryBackend::new();
        backend.fail_identity(1).await;

        assert!(backend.upload(1, b"x").await.is_err());
        assert!(backend.upload(0, b"x").await.is_ok());
    }
}
