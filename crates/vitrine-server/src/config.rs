//! Server configuration from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::warn;

use vitrine_shared::constants::{DEFAULT_HTTP_PORT, MAX_PHOTO_SIZE};

/// Server configuration.
///
/// Every setting has a default suitable for a single-host deployment, so
/// the binary runs with no environment at all.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP and WebSocket server binds to.
    /// Env: `VITRINE_HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Directory where uploaded photos are stored.
    /// Env: `VITRINE_PHOTO_DIR`
    /// Default: `./photos`
    pub photo_dir: PathBuf,

    /// Maximum accepted photo size in bytes.
    /// Env: `VITRINE_MAX_PHOTO_BYTES`
    /// Default: 10 MiB
    pub max_photo_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_HTTP_PORT)),
            photo_dir: PathBuf::from("./photos"),
            max_photo_bytes: MAX_PHOTO_SIZE,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("VITRINE_HTTP_ADDR") {
            match addr.parse() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => warn!("Invalid VITRINE_HTTP_ADDR '{}', using default", addr),
            }
        }

        if let Ok(dir) = std::env::var("VITRINE_PHOTO_DIR") {
            if dir.is_empty() {
                warn!("Empty VITRINE_PHOTO_DIR, using default");
            } else {
                config.photo_dir = PathBuf::from(dir);
            }
        }

        if let Ok(max) = std::env::var("VITRINE_MAX_PHOTO_BYTES") {
            match max.parse::<usize>() {
                Ok(parsed) if parsed > 0 => config.max_photo_bytes = parsed,
                _ => warn!("Invalid VITRINE_MAX_PHOTO_BYTES '{}', using default", max),
            }
        }

        config
    }
}
