//! # vitrine-server
//!
//! Relay server for shared photo + chat sessions.
//!
//! This binary provides:
//! - **WebSocket relay** (`/ws`) that fans every text frame out to all
//!   connected clients without parsing it
//! - **Photo storage** on local disk, filled by multipart uploads to
//!   `/upload-photo` and served back under `/photos/{filename}`
//! - **REST API** (axum) for health checks, service info, and photo
//!   browsing

mod api;
mod config;
mod error;
mod photo_store;
mod relay;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::photo_store::PhotoStore;
use crate::relay::RelayHub;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,vitrine_server=debug")),
        )
        .init();

    info!("Starting Vitrine relay server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Photo store (creates the directory if missing)
    let photo_store = Arc::new(
        PhotoStore::new(config.photo_dir.clone(), config.max_photo_bytes).await?,
    );

    // Relay hub for the single shared session
    let hub = RelayHub::new();

    let http_addr = config.http_addr;
    let app_state = AppState {
        hub,
        photo_store,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
