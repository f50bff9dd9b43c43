//! Engine-level integration tests against the in-memory backend and
//! store: split/upload/reassemble round trips, quota races, and gate
//! ordering.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use televault_server::backend::MemoryBackend;
use televault_server::chunk::{self, ChunkDeclaration};
use televault_server::config::LimitsConfig;
use televault_server::error::AppError;
use televault_server::identity::RoundRobinRotation;
use televault_server::share::ShareGate;
use televault_server::store::{MemoryStore, ShareRecord, ShareStore, ShareTarget};
use televault_server::transfer::{ChunkUpload, Reassembler, Uploader};

const CHUNK_LIMIT: u64 = 2_000_000;

struct Engine {
    store: MemoryStore,
    backend: MemoryBackend,
    uploader: Uploader,
    reassembler: Reassembler,
}

fn engine(pool_size: usize) -> Engine {
    let store = MemoryStore::new();
    let backend = MemoryBackend::new();
    let rotation = Arc::new(RoundRobinRotation::new(pool_size));
    let limits = LimitsConfig {
        max_chunk_size: CHUNK_LIMIT,
        retry_attempts: 2,
        identity_attempts: pool_size as u32,
        download_parallelism: 3,
    };

    let uploader = Uploader::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(backend.clone()),
        rotation.clone(),
        limits,
    );
    let reassembler = Reassembler::new(
        Arc::new(store.clone()),
        Arc::new(backend.clone()),
        rotation,
        3,
        2,
    );

    Engine {
        store,
        backend,
        uploader,
        reassembler,
    }
}

/// Deterministic pseudo-random content so corruption or reordering
/// cannot cancel out.
fn test_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

fn split(content: &[u8]) -> Vec<Vec<u8>> {
    content
        .chunks(CHUNK_LIMIT as usize)
        .map(|c| c.to_vec())
        .collect()
}

async fn upload_parts(eng: &Engine, content: &[u8], order: &[usize]) -> Uuid {
    let parts = split(content);
    let total = parts.len() as u64;

    // Index 0 must go first to create the file record
    let first = eng
        .uploader
        .accept_chunk(ChunkUpload {
            bytes: parts[0].clone(),
            declaration: ChunkDeclaration {
                chunk_index: 0,
                total_chunks: total,
                file_size: content.len() as u64,
                chunk_len: parts[0].len() as u64,
            },
            file_name: "payload.bin".to_string(),
            mime_type: Some("application/octet-stream".to_string()),
            storage_id: None,
            folder_id: None,
            file_id: None,
        })
        .await
        .unwrap();

    for &index in order {
        if index == 0 {
            continue;
        }
        eng.uploader
            .accept_chunk(ChunkUpload {
                bytes: parts[index].clone(),
                declaration: ChunkDeclaration {
                    chunk_index: index as u64,
                    total_chunks: total,
                    file_size: content.len() as u64,
                    chunk_len: parts[index].len() as u64,
                },
                file_name: "payload.bin".to_string(),
                mime_type: None,
                storage_id: None,
                folder_id: None,
                file_id: Some(first.file_id),
            })
            .await
            .unwrap();
    }

    first.file_id
}

async fn reconstruct(eng: &Engine, file_id: Uuid) -> Vec<u8> {
    let file = televault_server::store::FileStore::get_file(&eng.store, file_id)
        .await
        .unwrap()
        .unwrap();
    eng.reassembler.reconstruct_bytes(&file).await.unwrap()
}

#[tokio::test]
async fn test_ten_megabyte_round_trip() {
    let eng = engine(3);
    let content = test_content(10_000_000);
    assert_eq!(chunk::total_chunks(content.len() as u64, CHUNK_LIMIT), 5);

    let file_id = upload_parts(&eng, &content, &[1, 2, 3, 4]).await;

    let chunks = televault_server::store::ChunkStore::list_chunks(&eng.store, file_id)
        .await
        .unwrap();
    assert_eq!(chunks.len(), 5);

    let restored = reconstruct(&eng, file_id).await;
    assert_eq!(restored.len(), 10_000_000);
    assert_eq!(Sha256::digest(&restored), Sha256::digest(&content));
}

#[tokio::test]
async fn test_out_of_order_persistence_still_reconstructs() {
    let eng = engine(2);
    let content = test_content(7_500_000);

    // Network retries can reorder arrival; the registry tolerates it.
    let file_id = upload_parts(&eng, &content, &[3, 1, 2]).await;

    let restored = reconstruct(&eng, file_id).await;
    assert_eq!(Sha256::digest(&restored), Sha256::digest(&content));
}

#[tokio::test]
async fn test_unpadded_final_chunk() {
    let eng = engine(1);
    let content = test_content(4_500_001);

    let file_id = upload_parts(&eng, &content, &[1, 2]).await;
    let restored = reconstruct(&eng, file_id).await;
    assert_eq!(restored, content);
}

#[tokio::test]
async fn test_duplicate_resubmission_is_rejected_and_not_duplicated() {
    let eng = engine(2);
    let content = test_content(3_000_000);
    let file_id = upload_parts(&eng, &content, &[1]).await;

    let parts = split(&content);
    let err = eng
        .uploader
        .accept_chunk(ChunkUpload {
            bytes: parts[1].clone(),
            declaration: ChunkDeclaration {
                chunk_index: 1,
                total_chunks: 2,
                file_size: content.len() as u64,
                chunk_len: parts[1].len() as u64,
            },
            file_name: "payload.bin".to_string(),
            mime_type: None,
            storage_id: None,
            folder_id: None,
            file_id: Some(file_id),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidChunkDeclaration(_)));
    let chunks = televault_server::store::ChunkStore::list_chunks(&eng.store, file_id)
        .await
        .unwrap();
    assert_eq!(chunks.len(), 2);
}

#[tokio::test]
async fn test_identity_failover_is_recorded() {
    let eng = engine(2);
    eng.backend.fail_identity(0).await;

    let content = test_content(1_000);
    let file_id = upload_parts(&eng, &content, &[]).await;

    let chunks = televault_server::store::ChunkStore::list_chunks(&eng.store, file_id)
        .await
        .unwrap();
    assert_eq!(chunks[0].identity_index, 1);

    let restored = reconstruct(&eng, file_id).await;
    assert_eq!(restored, content);
}

#[tokio::test]
async fn test_chunk_failure_never_yields_partial_output() {
    let eng = engine(1);
    let content = test_content(6_000_000);
    let file_id = upload_parts(&eng, &content, &[1, 2]).await;

    let chunks = televault_server::store::ChunkStore::list_chunks(&eng.store, file_id)
        .await
        .unwrap();
    eng.backend.poison_content(&chunks[2].content_ref).await;

    let file = televault_server::store::FileStore::get_file(&eng.store, file_id)
        .await
        .unwrap()
        .unwrap();
    let result = eng.reassembler.reconstruct_bytes(&file).await;
    assert!(matches!(result, Err(AppError::DownloadFailed(_))));
}

fn quota_share(token: &str, max_downloads: u32) -> ShareRecord {
    ShareRecord {
        token: token.to_string(),
        target: ShareTarget::File(Uuid::new_v4()),
        expires_at: None,
        max_downloads: Some(max_downloads),
        password_hash: None,
        download_count: 0,
        created_by: None,
        created_at: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn test_concurrent_consumption_never_exceeds_quota() {
    let store = MemoryStore::new();
    store.create_share(&quota_share("t", 5)).await.unwrap();
    let gate = Arc::new(ShareGate::new(Arc::new(store.clone())));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let gate = Arc::clone(&gate);
        handles.push(tokio::spawn(async move {
            gate.consume("t", None, chrono::Utc::now()).await.is_ok()
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }

    assert_eq!(successes, 5);
    let share = store.get_share("t").await.unwrap().unwrap();
    assert_eq!(share.download_count, 5);
}

#[tokio::test]
async fn test_single_download_share_race() {
    let store = MemoryStore::new();
    store.create_share(&quota_share("once", 1)).await.unwrap();
    let gate = Arc::new(ShareGate::new(Arc::new(store)));

    let a = {
        let gate = Arc::clone(&gate);
        tokio::spawn(async move { gate.consume("once", None, chrono::Utc::now()).await })
    };
    let b = {
        let gate = Arc::clone(&gate);
        tokio::spawn(async move { gate.consume("once", None, chrono::Utc::now()).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let ok = results.iter().filter(|r| r.is_ok()).count();
    let quota_exceeded = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::QuotaExceeded)))
        .count();

    assert_eq!(ok, 1);
    assert_eq!(quota_exceeded, 1);
}
