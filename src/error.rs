//! Error types for the TeleVault server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::backend::BackendError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
///
/// Every terminal error maps to a stable status code and a
/// machine-readable error kind.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Share link has expired")]
    Expired,

    #[error("Share download quota exceeded")]
    QuotaExceeded,

    #[error("Password required")]
    PasswordRequired,

    #[error("Incorrect password")]
    IncorrectPassword,

    #[error("Invalid chunk declaration: {0}")]
    InvalidChunkDeclaration(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Lift a backend failure into the upload-side taxonomy.
    pub fn upload(err: BackendError) -> Self {
        AppError::UploadFailed(err.to_string())
    }

    /// Lift a backend failure into the download-side taxonomy.
    pub fn download(err: BackendError) -> Self {
        AppError::DownloadFailed(err.to_string())
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(rename = "requiresPassword", skip_serializing_if = "Option::is_none")]
    requires_password: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, requires_password) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", None),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden", None),
            AppError::Expired => (StatusCode::GONE, "expired", None),
            AppError::QuotaExceeded => (StatusCode::FORBIDDEN, "quota_exceeded", None),
            AppError::PasswordRequired => {
                (StatusCode::UNAUTHORIZED, "password_required", Some(true))
            }
            AppError::IncorrectPassword => {
                (StatusCode::UNAUTHORIZED, "incorrect_password", Some(true))
            }
            AppError::InvalidChunkDeclaration(_) => {
                (StatusCode::BAD_REQUEST, "invalid_chunk", None)
            }
            AppError::UploadFailed(msg) => {
                tracing::error!("Upload failed: {}", msg);
                (StatusCode::BAD_GATEWAY, "upload_failed", None)
            }
            AppError::DownloadFailed(msg) => {
                tracing::error!("Download failed: {}", msg);
                (StatusCode::BAD_GATEWAY, "download_failed", None)
            }
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request", None),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let message = match &self {
            AppError::Database(_) => "Database error".to_string(),
            AppError::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            requires_password,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Expired, StatusCode::GONE),
            (AppError::QuotaExceeded, StatusCode::FORBIDDEN),
            (AppError::PasswordRequired, StatusCode::UNAUTHORIZED),
            (AppError::IncorrectPassword, StatusCode::UNAUTHORIZED),
            (
                AppError::InvalidChunkDeclaration("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (AppError::UploadFailed("x".into()), StatusCode::BAD_GATEWAY),
            (AppError::DownloadFailed("x".into()), StatusCode::BAD_GATEWAY),
        ];

        for (err, expected) in cases {
            let response = err.into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
