//! Share link routes
//!
//! Creation and limit updates for share links, plus the anonymous
//! access paths: `GET ?action=info` reads metadata without consuming
//! quota; `POST` runs the gate, consumes one download, and serves the
//! content; `POST /archive` builds a zip of a folder share.

use std::collections::HashSet;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::archive::ArchiveSelection;
use crate::error::{AppError, Result};
use crate::share::hash_password;
use crate::state::AppState;
use crate::store::{FolderRecord, ShareLimits, ShareRecord, ShareTarget};

use super::files::{content_disposition, fetch_file, file_response};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_share))
        .route(
            "/:token",
            get(share_info)
                .post(access_share)
                .patch(update_share)
                .delete(delete_share),
        )
        .route("/:token/archive", post(archive_share))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateShareRequest {
    file_id: Option<Uuid>,
    folder_id: Option<Uuid>,
    expires_in_days: Option<i64>,
    max_downloads: Option<u32>,
    password: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShareResponse {
    token: String,
    share_url: String,
    expires_at: Option<String>,
    max_downloads: Option<u32>,
    created_at: String,
}

impl ShareResponse {
    fn from_record(record: &ShareRecord, public_url: &str) -> Self {
        Self {
            token: record.token.clone(),
            share_url: format!("{}/s/{}", public_url.trim_end_matches('/'), record.token),
            expires_at: record.expires_at.map(|t| t.to_rfc3339()),
            max_downloads: record.max_downloads,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

async fn create_share(
    State(state): State<AppState>,
    Json(request): Json<CreateShareRequest>,
) -> Result<(StatusCode, Json<ShareResponse>)> {
    let target = match (request.file_id, request.folder_id) {
        (Some(file_id), None) => {
            fetch_file(&state, file_id).await?;
            ShareTarget::File(file_id)
        }
        (None, Some(folder_id)) => {
            fetch_folder(&state, folder_id).await?;
            ShareTarget::Folder(folder_id)
        }
        _ => {
            return Err(AppError::BadRequest(
                "exactly one of fileId or folderId is required".to_string(),
            ))
        }
    };

    let now = Utc::now();
    let record = ShareRecord {
        token: Uuid::new_v4().simple().to_string(),
        target,
        expires_at: request.expires_in_days.map(|days| now + Duration::days(days)),
        max_downloads: request.max_downloads,
        password_hash: request.password.as_deref().map(hash_password),
        download_count: 0,
        created_by: None,
        created_at: now,
    };
    state.shares().create_share(&record).await?;

    tracing::info!(token = %record.token, "Share link created");
    Ok((
        StatusCode::CREATED,
        Json(ShareResponse::from_record(
            &record,
            &state.config().server.public_url,
        )),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateShareRequest {
    expires_in_days: Option<i64>,
    max_downloads: Option<u32>,
    password: Option<String>,
}

async fn update_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(request): Json<UpdateShareRequest>,
) -> Result<Json<ShareResponse>> {
    let limits = ShareLimits {
        expires_at: request
            .expires_in_days
            .map(|days| Some(Utc::now() + Duration::days(days))),
        max_downloads: request.max_downloads.map(Some),
        password_hash: request.password.map(|p| Some(hash_password(&p))),
    };

    let record = state
        .shares()
        .update_share(&token, &limits)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("share {}", token)))?;

    Ok(Json(ShareResponse::from_record(
        &record,
        &state.config().server.public_url,
    )))
}

async fn delete_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<StatusCode> {
    state
        .shares()
        .get_share(&token)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("share {}", token)))?;

    state.shares().delete_share(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShareInfoResponse {
    token: String,
    target_type: &'static str,
    name: String,
    size: Option<u64>,
    requires_password: bool,
    expires_at: Option<String>,
    max_downloads: Option<u32>,
    download_count: u32,
    created_at: String,
}

#[derive(Deserialize)]
struct InfoQuery {
    action: Option<String>,
}

/// Metadata via `GET ?action=info`, without consuming quota.
async fn share_info(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<InfoQuery>,
) -> Result<Json<ShareInfoResponse>> {
    if query.action.as_deref() != Some("info") {
        return Err(AppError::BadRequest(
            "unsupported share action, expected action=info".to_string(),
        ));
    }

    let share = state.share_gate().peek(&token, Utc::now()).await?;

    let (target_type, name, size) = match share.target {
        ShareTarget::File(id) => {
            let file = fetch_file(&state, id).await?;
            ("file", file.name, Some(file.size))
        }
        ShareTarget::Folder(id) => {
            let folder = fetch_folder(&state, id).await?;
            ("folder", folder.name, None)
        }
    };

    Ok(Json(ShareInfoResponse {
        token: share.token,
        target_type,
        name,
        size,
        requires_password: share.password_hash.is_some(),
        expires_at: share.expires_at.map(|t| t.to_rfc3339()),
        max_downloads: share.max_downloads,
        download_count: share.download_count,
        created_at: share.created_at.to_rfc3339(),
    }))
}

#[derive(Deserialize, Default)]
struct AccessRequest {
    password: Option<String>,
}

/// Gated content access. The quota consumption happens before the
/// body starts streaming.
async fn access_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(request): Json<AccessRequest>,
) -> Result<Response> {
    let share = state
        .share_gate()
        .consume(&token, request.password.as_deref(), Utc::now())
        .await?;

    match share.target {
        ShareTarget::File(id) => {
            let file = fetch_file(&state, id).await?;
            file_response(&state, &file).await
        }
        ShareTarget::Folder(id) => {
            let folder = fetch_folder(&state, id).await?;
            archive_response(&state, &folder, &ArchiveSelection::All).await
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ArchiveRequest {
    password: Option<String>,
    /// Slash-separated subfolder path under the share root; scopes the
    /// archive to that subtree
    path: Option<String>,
    item_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    all: bool,
}

/// Archive access for folder shares. A `path` scopes the archive to a
/// subfolder of the share root; a selection naming exactly one file is
/// served directly instead of being wrapped in a zip.
async fn archive_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(request): Json<ArchiveRequest>,
) -> Result<Response> {
    let share = state
        .share_gate()
        .consume(&token, request.password.as_deref(), Utc::now())
        .await?;

    let ShareTarget::Folder(folder_id) = share.target else {
        return Err(AppError::BadRequest(
            "archive access requires a folder share".to_string(),
        ));
    };
    let mut folder = fetch_folder(&state, folder_id).await?;

    if let Some(path) = request.path.as_deref() {
        folder = resolve_subfolder(&state, &folder, path).await?;
    }

    let selection = match (&request.item_ids, request.all) {
        (Some(ids), false) if !ids.is_empty() => {
            // Single-file direct mode
            if ids.len() == 1 {
                if let Some(file) = state.files().get_file(ids[0]).await? {
                    if file.folder_id == Some(folder.id) {
                        return file_response(&state, &file).await;
                    }
                }
            }
            ArchiveSelection::Items(ids.iter().copied().collect::<HashSet<_>>())
        }
        _ => ArchiveSelection::All,
    };

    archive_response(&state, &folder, &selection).await
}

async fn archive_response(
    state: &AppState,
    folder: &FolderRecord,
    selection: &ArchiveSelection,
) -> Result<Response> {
    let output = state.archive_builder().build(folder, selection).await?;

    if !output.failures.is_empty() {
        tracing::warn!(
            folder_id = %folder.id,
            skipped = output.failures.len(),
            "Archive delivered with skipped files"
        );
    }

    let archive_name = format!("{}.zip", folder.name);
    let length = output.bytes.len();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, length)
        .header(header::CONTENT_DISPOSITION, content_disposition(&archive_name))
        .body(Body::from(output.bytes))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Walk `path` segment by segment under `root`. The path never
/// escapes the share: each hop only moves to a direct child by name.
async fn resolve_subfolder(
    state: &AppState,
    root: &FolderRecord,
    path: &str,
) -> Result<FolderRecord> {
    let mut current = root.clone();

    for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
        let children = state.folders().list_folders(Some(current.id)).await?;
        current = children
            .into_iter()
            .find(|f| f.name == segment)
            .ok_or_else(|| {
                AppError::NotFound(format!("path {} under shared folder {}", path, root.name))
            })?;
    }

    Ok(current)
}

async fn fetch_folder(state: &AppState, id: Uuid) -> Result<FolderRecord> {
    state
        .folders()
        .get_folder(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("folder {}", id)))
}
