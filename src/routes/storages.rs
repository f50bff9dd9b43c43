//! Storage volume routes
//!
//! A storage is a logical container of files tied to the messaging
//! channel that holds its chunks. Deletion is refused while any file
//! still references the volume.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::store::StorageRecord;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_storages).post(create_storage))
        .route("/:id", get(get_storage).delete(delete_storage))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageResponse {
    pub id: Uuid,
    pub name: String,
    pub channel_id: String,
    pub created_at: String,
}

impl From<StorageRecord> for StorageResponse {
    fn from(record: StorageRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            channel_id: record.channel_id,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateStorageRequest {
    name: String,
    /// Channel backing this volume; defaults to the configured one
    channel_id: Option<String>,
}

async fn create_storage(
    State(state): State<AppState>,
    Json(request): Json<CreateStorageRequest>,
) -> Result<(StatusCode, Json<StorageResponse>)> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("storage name cannot be empty".to_string()));
    }

    let record = StorageRecord {
        id: Uuid::new_v4(),
        name: name.to_string(),
        channel_id: request
            .channel_id
            .unwrap_or_else(|| state.config().telegram.channel_id.clone()),
        created_at: Utc::now(),
    };
    state.storages().create_storage(&record).await?;

    tracing::info!(storage_id = %record.id, name = %record.name, "Storage created");
    Ok((StatusCode::CREATED, Json(record.into())))
}

async fn list_storages(State(state): State<AppState>) -> Result<Json<Vec<StorageResponse>>> {
    let storages = state.storages().list_storages().await?;
    Ok(Json(storages.into_iter().map(StorageResponse::from).collect()))
}

async fn get_storage(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StorageResponse>> {
    let storage = state
        .storages()
        .get_storage(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("storage {}", id)))?;
    Ok(Json(storage.into()))
}

async fn delete_storage(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    state
        .storages()
        .get_storage(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("storage {}", id)))?;

    let file_count = state.files().count_files_in_storage(id).await?;
    if file_count > 0 {
        return Err(AppError::BadRequest(format!(
            "storage still holds {} file(s)",
            file_count
        )));
    }

    state.storages().delete_storage(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
