//! File routes: metadata, download, rename, delete

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::store::FileRecord;
use crate::transfer;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_files))
        .route(
            "/:id",
            get(get_file).patch(rename_file).delete(delete_file),
        )
        .route("/:id/download", get(download_file))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResponse {
    pub id: Uuid,
    pub name: String,
    pub size: u64,
    pub mime_type: Option<String>,
    pub storage_id: Option<Uuid>,
    pub folder_id: Option<Uuid>,
    pub created_at: String,
}

impl From<FileRecord> for FileResponse {
    fn from(record: FileRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            size: record.size,
            mime_type: record.mime_type,
            storage_id: record.storage_id,
            folder_id: record.folder_id,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    folder_id: Option<Uuid>,
}

async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<FileResponse>>> {
    let files = state.files().list_files(query.folder_id).await?;
    Ok(Json(files.into_iter().map(FileResponse::from).collect()))
}

async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FileResponse>> {
    let file = fetch_file(&state, id).await?;
    Ok(Json(file.into()))
}

#[derive(Deserialize)]
struct RenameRequest {
    name: String,
}

async fn rename_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RenameRequest>,
) -> Result<Json<FileResponse>> {
    if request.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    fetch_file(&state, id).await?;
    state.files().rename_file(id, &request.name).await?;
    let file = fetch_file(&state, id).await?;
    Ok(Json(file.into()))
}

async fn download_file(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Response> {
    let file = fetch_file(&state, id).await?;
    file_response(&state, &file).await
}

/// Delete a file: remote chunk deletes settle in parallel, best
/// effort, then local metadata goes unconditionally.
async fn delete_file(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    let file = fetch_file(&state, id).await?;
    let chunks = state.chunks().list_chunks(id).await?;

    transfer::purge_remote(state.backend(), &chunks).await;

    state.chunks().delete_chunks(id).await?;
    state.files().delete_file(id).await?;

    tracing::info!(file_id = %id, name = %file.name, "File deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn fetch_file(state: &AppState, id: Uuid) -> Result<FileRecord> {
    state
        .files()
        .get_file(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("file {}", id)))
}

/// Stream a reconstructed file as an attachment response.
pub(crate) async fn file_response(state: &AppState, file: &FileRecord) -> Result<Response> {
    let stream = state.reassembler().reconstruct(file).await?;

    let content_type = file
        .mime_type
        .clone()
        .or_else(|| {
            mime_guess::from_path(&file.name)
                .first_raw()
                .map(str::to_string)
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, file.size)
        .header(header::CONTENT_DISPOSITION, content_disposition(&file.name))
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// RFC 5987 attachment header: percent-encoded UTF-8 name plus an
/// ASCII-safe fallback for clients that ignore `filename*`.
pub(crate) fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if c.is_ascii() && c != '"' && c != '\\' && !c.is_ascii_control() {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(name)
    )
}
