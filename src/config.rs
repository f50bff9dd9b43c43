//! Configuration management for the TeleVault server

use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub telegram: TelegramConfig,
    pub limits: LimitsConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL used when building share link URLs
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot tokens rotated across chunk uploads. Empty means the server
    /// runs against the in-memory backend (dev/test mode).
    pub bot_tokens: Vec<String>,
    /// Channel used as the blob store
    pub channel_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Backend-imposed ceiling on a single chunk
    pub max_chunk_size: u64,
    /// Transient-failure retry attempts per backend call
    pub retry_attempts: u32,
    /// Distinct identities tried per chunk before giving up
    pub identity_attempts: u32,
    /// Concurrent in-flight chunk fetches during reassembly
    pub download_parallelism: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                public_url: "http://localhost:3000".to_string(),
            },
            telegram: TelegramConfig {
                bot_tokens: Vec::new(),
                channel_id: String::new(),
            },
            limits: LimitsConfig {
                max_chunk_size: 20 * 1024 * 1024,
                retry_attempts: 3,
                identity_attempts: 2,
                download_parallelism: 3,
            },
            database: DatabaseConfig {
                url: "sqlite:./televault.db".to_string(),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(defaults.server.port),
                public_url: env::var("PUBLIC_URL").unwrap_or(defaults.server.public_url),
            },
            telegram: TelegramConfig {
                bot_tokens: env::var("TELEGRAM_BOT_TOKENS")
                    .map(|raw| {
                        raw.split(',')
                            .map(|t| t.trim().to_string())
                            .filter(|t| !t.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
                channel_id: env::var("TELEGRAM_CHANNEL_ID").unwrap_or_default(),
            },
            limits: LimitsConfig {
                max_chunk_size: env::var("MAX_CHUNK_SIZE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.limits.max_chunk_size),
                retry_attempts: env::var("RETRY_ATTEMPTS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.limits.retry_attempts),
                identity_attempts: env::var("IDENTITY_ATTEMPTS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.limits.identity_attempts),
                download_parallelism: env::var("DOWNLOAD_PARALLELISM")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.limits.download_parallelism),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
            },
        })
    }
}
