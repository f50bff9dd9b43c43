//! HTTP routes

pub mod files;
pub mod folders;
pub mod shares;
pub mod storages;
pub mod upload;

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1/storages", storages::router())
        .nest("/api/v1/files", files::router())
        .nest("/api/v1/folders", folders::router())
        .nest("/api/v1/shares", shares::router())
        .nest("/api/v1/upload", upload::router())
        .with_state(state)
}
