//! Folder routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::store::FolderRecord;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_folders).post(create_folder))
        .route("/:id", get(get_folder).delete(delete_folder))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderResponse {
    pub id: Uuid,
    pub name: String,
    pub path: String,
    pub parent_id: Option<Uuid>,
    pub created_at: String,
}

impl From<FolderRecord> for FolderResponse {
    fn from(record: FolderRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            path: record.path,
            parent_id: record.parent_id,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateFolderRequest {
    name: String,
    parent_id: Option<Uuid>,
}

async fn create_folder(
    State(state): State<AppState>,
    Json(request): Json<CreateFolderRequest>,
) -> Result<(StatusCode, Json<FolderResponse>)> {
    let name = request.name.trim();
    if name.is_empty() || name.contains('/') {
        return Err(AppError::BadRequest("invalid folder name".to_string()));
    }

    let path = match request.parent_id {
        None => format!("/{}", name),
        Some(parent_id) => {
            let parent = state
                .folders()
                .get_folder(parent_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("folder {}", parent_id)))?;
            format!("{}/{}", parent.path, name)
        }
    };

    let folder = FolderRecord {
        id: Uuid::new_v4(),
        name: name.to_string(),
        path,
        parent_id: request.parent_id,
        created_at: Utc::now(),
    };
    state.folders().create_folder(&folder).await?;

    tracing::info!(folder_id = %folder.id, path = %folder.path, "Folder created");
    Ok((StatusCode::CREATED, Json(folder.into())))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    parent_id: Option<Uuid>,
}

async fn list_folders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<FolderResponse>>> {
    let folders = state.folders().list_folders(query.parent_id).await?;
    Ok(Json(folders.into_iter().map(FolderResponse::from).collect()))
}

async fn get_folder(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FolderResponse>> {
    let folder = state
        .folders()
        .get_folder(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("folder {}", id)))?;
    Ok(Json(folder.into()))
}

/// Folders must be emptied before deletion; the engine never cascades
/// a delete through a subtree implicitly.
async fn delete_folder(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    state
        .folders()
        .get_folder(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("folder {}", id)))?;

    if !state.files().list_files(Some(id)).await?.is_empty() {
        return Err(AppError::BadRequest(
            "cannot delete a folder that still contains files".to_string(),
        ));
    }
    if !state.folders().list_folders(Some(id)).await?.is_empty() {
        return Err(AppError::BadRequest(
            "cannot delete a folder that still contains subfolders".to_string(),
        ));
    }

    state.folders().delete_folder(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
