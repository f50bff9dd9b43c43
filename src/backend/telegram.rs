//! Telegram Bot API backend
//!
//! Stores each chunk as a document message in a channel. Uploads go
//! through `sendDocument`, downloads resolve the attachment path via
//! `getFile` and fetch it from the file endpoint, deletes use
//! `deleteMessage`. The identity index selects which bot token serves
//! the call.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{BackendError, RemoteBackend, RemoteRef};
use crate::config::TelegramConfig;

const API_BASE: &str = "https://api.telegram.org";

/// Generous timeouts: chunk uploads can be tens of megabytes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
    document: Option<DocumentInfo>,
}

#[derive(Debug, Deserialize)]
struct DocumentInfo {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file_path: Option<String>,
}

/// Telegram-backed implementation of [`RemoteBackend`].
pub struct TelegramBackend {
    client: reqwest::Client,
    tokens: Vec<String>,
    channel_id: String,
}

impl TelegramBackend {
    pub fn new(config: &TelegramConfig) -> Result<Self, BackendError> {
        if config.bot_tokens.is_empty() {
            return Err(BackendError::Permanent(
                "no bot tokens configured".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Permanent(format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            tokens: config.bot_tokens.clone(),
            channel_id: config.channel_id.clone(),
        })
    }

    fn token(&self, identity_index: usize) -> Result<&str, BackendError> {
        self.tokens
            .get(identity_index)
            .map(String::as_str)
            .ok_or_else(|| {
                BackendError::Permanent(format!(
                    "identity index {} out of range (pool size {})",
                    identity_index,
                    self.tokens.len()
                ))
            })
    }

    fn classify_status(status: StatusCode, retry_after: Option<u64>, detail: &str) -> BackendError {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return BackendError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(1),
            };
        }
        if status.is_server_error() {
            return BackendError::Transient(format!("{}: {}", status, detail));
        }
        BackendError::Permanent(format!("{}: {}", status, detail))
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BackendError> {
        let status = response.status();
        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| BackendError::Transient(format!("malformed API response: {}", e)))?;

        if body.ok {
            return body.result.ok_or_else(|| {
                BackendError::Transient("API response missing result".to_string())
            });
        }

        let description = body.description.unwrap_or_else(|| "unknown error".to_string());
        let retry_after = body.parameters.and_then(|p| p.retry_after);
        Err(Self::classify_status(status, retry_after, &description))
    }
}

#[async_trait]
impl RemoteBackend for TelegramBackend {
    async fn upload(
        &self,
        identity_index: usize,
        bytes: &[u8],
    ) -> Result<RemoteRef, BackendError> {
        let token = self.token(identity_index)?;
        let url = format!("{}/bot{}/sendDocument", API_BASE, token);

        let form = Form::new()
            .text("chat_id", self.channel_id.clone())
            .part(
                "document",
                Part::bytes(bytes.to_vec()).file_name("chunk.bin"),
            );

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| BackendError::Transient(format!("upload request failed: {}", e)))?;

        let message: SentMessage = Self::parse_response(response).await?;
        let document = message.document.ok_or_else(|| {
            BackendError::Transient("upload response carried no document".to_string())
        })?;

        Ok(RemoteRef {
            message_ref: message.message_id.to_string(),
            content_ref: document.file_id,
        })
    }

    async fn download(
        &self,
        identity_index: usize,
        content_ref: &str,
    ) -> Result<Vec<u8>, BackendError> {
        let token = self.token(identity_index)?;

        // Resolve the attachment path first
        let url = format!("{}/bot{}/getFile", API_BASE, token);
        let response = self
            .client
            .get(&url)
            .query(&[("file_id", content_ref)])
            .send()
            .await
            .map_err(|e| BackendError::Transient(format!("getFile request failed: {}", e)))?;

        let info: FileInfo = Self::parse_response(response).await?;
        let file_path = info.file_path.ok_or_else(|| {
            BackendError::Permanent(format!("no file path for content ref {}", content_ref))
        })?;

        // Then fetch the bytes from the file endpoint
        let file_url = format!("{}/file/bot{}/{}", API_BASE, token, file_path);
        let response = self
            .client
            .get(&file_url)
            .send()
            .await
            .map_err(|e| BackendError::Transient(format!("file fetch failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::classify_status(status, None, "file fetch rejected"));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::Transient(format!("file body read failed: {}", e)))?;

        Ok(bytes.to_vec())
    }

    async fn delete(&self, identity_index: usize, message_ref: &str) -> Result<(), BackendError> {
        let token = self.token(identity_index)?;
        let message_id: i64 = message_ref.parse().map_err(|_| {
            BackendError::Permanent(format!("malformed message ref: {}", message_ref))
        })?;

        let url = format!("{}/bot{}/deleteMessage", API_BASE, token);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "chat_id": self.channel_id,
                "message_id": message_id,
            }))
            .send()
            .await
            .map_err(|e| BackendError::Transient(format!("delete request failed: {}", e)))?;

        let _: bool = Self::parse_response(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelegramConfig;

    fn config(tokens: &[&str]) -> TelegramConfig {
        TelegramConfig {
            bot_tokens: tokens.iter().map(|t| t.to_string()).collect(),
            channel_id: "-100123".to_string(),
        }
    }

    #[test]
    fn test_requires_tokens() {
        assert!(TelegramBackend::new(&config(&[])).is_err());
    }

    #[test]
    fn test_identity_bounds() {
        let backend = TelegramBackend::new(&config(&["a", "b"])).unwrap();
        assert_eq!(backend.token(0).unwrap(), "a");
        assert!(backend.token(1).is_ok());
        assert!(matches!(
            backend.token(2),
            Err(BackendError::Permanent(_))
        ));
    }

    #[test]
    fn test_rate_limit_classification() {
        let err = TelegramBackend::classify_status(StatusCode::TOO_MANY_REQUESTS, Some(7), "slow");
        assert!(matches!(
            err,
            BackendError::RateLimited { retry_after_secs: 7 }
        ));

        let err = TelegramBackend::classify_status(StatusCode::BAD_GATEWAY, None, "down");
        assert!(err.is_transient());

        let err = TelegramBackend::classify_status(StatusCode::UNAUTHORIZED, None, "bad token");
        assert!(!err.is_transient());
    }
}
