//! TeleVault Server
//!
//! Chunked blob storage over a Telegram channel with time/quota/
//! password-gated share links.

use std::net::SocketAddr;

use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use televault_server::config::Config;
use televault_server::state::AppState;
use televault_server::store::SqliteStore;
use televault_server::{db, routes};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "televault_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting TeleVault Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Identity pool: {} bot token(s), chunk ceiling: {} bytes",
        config.telegram.bot_tokens.len(),
        config.limits.max_chunk_size
    );

    // Initialize database
    let pool = db::create_pool(&config.database.url)
        .await
        .expect("Failed to initialize database");
    let store = SqliteStore::new(pool);
    store.init().await.expect("Failed to initialize schema");
    tracing::info!("Database initialized at {}", config.database.url);

    // Create application state
    let state =
        AppState::with_sqlite(config.clone(), store).expect("Failed to initialize backend");

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .expect("Invalid SERVER_HOST/SERVER_PORT");
    tracing::info!("TeleVault Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    tracing::info!("Server shutdown complete");
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
