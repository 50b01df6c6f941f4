//! Client configuration loaded from environment variables.
//!
//! Both settings default to a relay on localhost, so a development client
//! runs with zero configuration.

use vitrine_shared::constants::{DEFAULT_HTTP_PORT, WS_PATH};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP origin of the relay, used for uploads and photo browsing.
    /// Env: `VITRINE_HTTP_BASE`
    /// Default: `http://127.0.0.1:8080`
    pub http_base: String,

    /// Full WebSocket URL of the relay.
    /// Env: `VITRINE_WS_URL`
    /// Default: derived from `http_base` by swapping the scheme to
    /// `ws`/`wss` and appending the socket path
    pub ws_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let http_base = format!("http://127.0.0.1:{DEFAULT_HTTP_PORT}");
        let ws_url = derive_ws_url(&http_base);
        Self { http_base, ws_url }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults. An explicit `VITRINE_WS_URL` always wins over derivation.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base) = std::env::var("VITRINE_HTTP_BASE") {
            config.http_base = base.trim_end_matches('/').to_string();
            config.ws_url = derive_ws_url(&config.http_base);
        }

        if let Ok(url) = std::env::var("VITRINE_WS_URL") {
            config.ws_url = url;
        }

        config
    }
}

/// Swap an HTTP origin's scheme for its WebSocket sibling and append the
/// relay's socket path. Origins without a scheme get `ws://`.
fn derive_ws_url(http_base: &str) -> String {
    let origin = http_base.trim_end_matches('/');
    let ws_origin = if let Some(rest) = origin.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = origin.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("ws://{origin}")
    };
    format!("{ws_origin}{WS_PATH}")
}
