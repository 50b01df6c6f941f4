/// Protocol version string reported by the server info endpoints
pub const PROTOCOL_VERSION: &str = "vitrine/1";

/// Application name
pub const APP_NAME: &str = "Vitrine";

/// WebSocket route of the session relay
pub const WS_PATH: &str = "/ws";

/// HTTP route accepting multipart photo uploads
pub const UPLOAD_PATH: &str = "/upload-photo";

/// HTTP route listing stored photos, and the prefix they are served under
pub const PHOTOS_PATH: &str = "/photos";

/// Multipart field name carrying the photo bytes
pub const UPLOAD_FIELD: &str = "file";

/// Prefix of client-assigned upload filenames (`photo-<epoch-ms>.jpg`)
pub const UPLOAD_FILENAME_PREFIX: &str = "photo-";

/// Maximum photo size in bytes (10 MiB)
pub const MAX_PHOTO_SIZE: usize = 10 * 1024 * 1024;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Envelopes buffered for transmission while the link is down
pub const OUTBOUND_BUFFER_CAPACITY: usize = 32;

/// Initial reconnect backoff delay in milliseconds
pub const BACKOFF_BASE_MS: u64 = 500;

/// Reconnect backoff cap in milliseconds (30 s)
pub const BACKOFF_CAP_MS: u64 = 30_000;
