//! Chunk upload endpoint
//!
//! `POST /api/v1/upload/chunks` takes one multipart chunk per call. The
//! first call (chunk index 0, no `fileId`) creates the file record;
//! every later call must carry the returned `fileId`.

use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::chunk::ChunkDeclaration;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::transfer::ChunkUpload;

pub fn router() -> Router<AppState> {
    Router::new().route("/chunks", post(upload_chunk))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadResponse {
    pub file_id: Uuid,
    pub chunk_index: u64,
    pub total_chunks: u64,
    pub is_complete: bool,
    pub uploaded_bytes: u64,
}

#[derive(Default)]
struct ChunkForm {
    bytes: Option<Vec<u8>>,
    chunk_index: Option<u64>,
    total_chunks: Option<u64>,
    file_name: Option<String>,
    file_size: Option<u64>,
    mime_type: Option<String>,
    storage_id: Option<Uuid>,
    folder_id: Option<Uuid>,
    file_id: Option<Uuid>,
}

impl ChunkForm {
    async fn parse(mut multipart: Multipart) -> Result<Self> {
        let mut form = ChunkForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("malformed multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "chunk" => {
                    let bytes = field.bytes().await.map_err(|e| {
                        AppError::BadRequest(format!("failed to read chunk bytes: {}", e))
                    })?;
                    form.bytes = Some(bytes.to_vec());
                }
                "chunkIndex" => form.chunk_index = Some(parse_field(&name, field).await?),
                "totalChunks" => form.total_chunks = Some(parse_field(&name, field).await?),
                "fileSize" => form.file_size = Some(parse_field(&name, field).await?),
                "fileName" => form.file_name = Some(text_field(&name, field).await?),
                "mimeType" => form.mime_type = Some(text_field(&name, field).await?),
                "storageId" => form.storage_id = Some(parse_field(&name, field).await?),
                "folderId" => form.folder_id = Some(parse_field(&name, field).await?),
                "fileId" => form.file_id = Some(parse_field(&name, field).await?),
                _ => {}
            }
        }

        Ok(form)
    }

    fn require<T>(value: Option<T>, name: &str) -> Result<T> {
        value.ok_or_else(|| AppError::BadRequest(format!("missing field {}", name)))
    }
}

async fn text_field(name: &str, field: axum::extract::multipart::Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(format!("failed to read field {}: {}", name, e)))
}

async fn parse_field<T: std::str::FromStr>(
    name: &str,
    field: axum::extract::multipart::Field<'_>,
) -> Result<T> {
    let text = text_field(name, field).await?;
    text.parse()
        .map_err(|_| AppError::BadRequest(format!("invalid value for field {}", name)))
}

async fn upload_chunk(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ChunkUploadResponse>> {
    let form = ChunkForm::parse(multipart).await?;

    // The first chunk creates the file record, so its storage volume
    // must exist up front.
    if let (Some(storage_id), None) = (form.storage_id, form.file_id) {
        state
            .storages()
            .get_storage(storage_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("storage {}", storage_id)))?;
    }

    let bytes = ChunkForm::require(form.bytes, "chunk")?;
    let declaration = ChunkDeclaration {
        chunk_index: ChunkForm::require(form.chunk_index, "chunkIndex")?,
        total_chunks: ChunkForm::require(form.total_chunks, "totalChunks")?,
        file_size: ChunkForm::require(form.file_size, "fileSize")?,
        chunk_len: bytes.len() as u64,
    };

    let outcome = state
        .uploader()
        .accept_chunk(ChunkUpload {
            bytes,
            declaration,
            file_name: ChunkForm::require(form.file_name, "fileName")?,
            mime_type: form.mime_type,
            storage_id: form.storage_id,
            folder_id: form.folder_id,
            file_id: form.file_id,
        })
        .await?;

    Ok(Json(ChunkUploadResponse {
        file_id: outcome.file_id,
        chunk_index: outcome.chunk_index,
        total_chunks: outcome.total_chunks,
        is_complete: outcome.is_complete,
        uploaded_bytes: outcome.uploaded_bytes,
    }))
}
