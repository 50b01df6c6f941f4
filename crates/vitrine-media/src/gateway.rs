//! Photo gateway: upload and listing against the relay's HTTP endpoints.
//!
//! Capture is delegated to whatever camera layer embeds this crate; the
//! gateway's input contract is a file path or raw bytes.

use std::path::Path;

use bytes::Bytes;
use chrono::Utc;
use reqwest::multipart;
use thiserror::Error;
use tracing::{debug, info};

use vitrine_shared::constants::{
    MAX_PHOTO_SIZE, PHOTOS_PATH, UPLOAD_FIELD, UPLOAD_FILENAME_PREFIX, UPLOAD_PATH,
};
use vitrine_shared::{PhotoListing, PhotoRef, UploadResponse};

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Failed to read photo: {0}")]
    Io(#[from] std::io::Error),

    #[error("Photo too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server answered {0}")]
    UpstreamStatus(reqwest::StatusCode),

    #[error("Upload response carries no url")]
    MissingUrl,
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadedPhoto {
    /// Server-relative path, as returned by the relay.
    pub relative_url: String,
    /// The relative path resolved against the configured base; this is what
    /// goes into a `photo_select` envelope.
    pub absolute_url: String,
}

/// Client for the relay's photo endpoints.
///
/// Holds a connection-pooled HTTP client; cheap to clone.
#[derive(Debug, Clone)]
pub struct PhotoGateway {
    http: reqwest::Client,
    base: String,
}

impl PhotoGateway {
    /// `http_base` is the relay origin, e.g. `http://127.0.0.1:8080`.
    pub fn new(http_base: impl Into<String>) -> Self {
        let base = http_base.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    /// Resolve a server-relative path against the configured base. Already
    /// absolute URLs pass through untouched.
    pub fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{}", self.base, url)
        } else {
            format!("{}/{}", self.base, url)
        }
    }

    /// Upload one photo under the `photo-<epoch-ms>.jpg` naming convention.
    ///
    /// A non-2xx answer or a response without a usable `url` is an error and
    /// leaves nothing to broadcast; the payload is size-checked before any
    /// network write.
    pub async fn upload_bytes(&self, data: Bytes) -> Result<UploadedPhoto, MediaError> {
        if data.len() > MAX_PHOTO_SIZE {
            return Err(MediaError::TooLarge {
                size: data.len(),
                max: MAX_PHOTO_SIZE,
            });
        }

        let filename = upload_filename(Utc::now().timestamp_millis());
        let size = data.len();
        let part = multipart::Part::bytes(data.to_vec())
            .file_name(filename.clone())
            .mime_str("image/jpeg")?;
        let form = multipart::Form::new().part(UPLOAD_FIELD, part);

        let resp = self
            .http
            .post(format!("{}{}", self.base, UPLOAD_PATH))
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(MediaError::UpstreamStatus(resp.status()));
        }

        let body: UploadResponse = resp.json().await?;
        if body.url.is_empty() {
            return Err(MediaError::MissingUrl);
        }

        let absolute_url = self.absolute_url(&body.url);
        info!(filename = %filename, size, url = %body.url, "Photo uploaded");
        Ok(UploadedPhoto {
            relative_url: body.url,
            absolute_url,
        })
    }

    /// Read a photo from disk and upload it.
    pub async fn upload_file(&self, path: impl AsRef<Path>) -> Result<UploadedPhoto, MediaError> {
        let data = tokio::fs::read(path.as_ref()).await?;
        self.upload_bytes(Bytes::from(data)).await
    }

    /// Fetch the stored-photo listing. An empty listing is not an error.
    pub async fn list(&self) -> Result<Vec<PhotoRef>, MediaError> {
        let resp = self
            .http
            .get(format!("{}{}", self.base, PHOTOS_PATH))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(MediaError::UpstreamStatus(resp.status()));
        }

        let listing: PhotoListing = resp.json().await?;
        debug!(count = listing.photos.len(), "Photo listing fetched");
        Ok(listing.photos)
    }
}

/// Client-assigned upload filename: `photo-<epoch-ms>.jpg`.
fn upload_filename(epoch_ms: i64) -> String {
    format!("{UPLOAD_FILENAME_PREFIX}{epoch_ms}.jpg")
}
