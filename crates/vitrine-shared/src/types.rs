use serde::{Deserialize, Serialize};

/// One stored photo as returned by the listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhotoRef {
    pub filename: String,
    /// Server-relative path, e.g. `/photos/photo-1756200000000.jpg`.
    pub url: String,
}

/// Body of `GET /photos`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PhotoListing {
    pub photos: Vec<PhotoRef>,
}

/// Body of a successful `POST /upload-photo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Server-relative path the stored photo is served under.
    pub url: String,
}
