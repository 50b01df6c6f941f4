//! Disk-backed photo store.
//!
//! Photos are plain files in one directory, named
//! `photo-<epoch-ms>.<ext>` so a directory listing reads in upload
//! order. Only the extension of the client's filename is trusted.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use vitrine_shared::constants::UPLOAD_FILENAME_PREFIX;

use crate::error::ServerError;

/// Extensions served with an image content type; anything else is
/// stored as `.jpg`.
const KNOWN_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Verify that a resolved path stays within the store directory.
/// Prevents path traversal through crafted filenames.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, ServerError> {
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    // Call sites build `target` by joining onto `base`, which may still be
    // relative; strip whichever form it carries before re-anchoring.
    let relative = target
        .strip_prefix(base)
        .or_else(|_| target.strip_prefix(&canonical_base))
        .unwrap_or(target);
    let mut resolved = canonical_base.clone();
    for component in relative.components() {
        match component {
            std::path::Component::Normal(c) => resolved.push(c),
            std::path::Component::ParentDir => {
                return Err(ServerError::BadRequest(
                    "Path traversal detected".to_string(),
                ));
            }
            _ => {} // RootDir, CurDir, Prefix -- skip
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(ServerError::BadRequest(
            "Path traversal detected".to_string(),
        ));
    }
    Ok(resolved)
}

/// Create and fill a photo file, refusing to replace an existing one.
async fn write_new(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await?;
    Ok(())
}

/// Reject filenames that could escape the store directory.
fn check_filename(filename: &str) -> Result<(), ServerError> {
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
    {
        return Err(ServerError::BadRequest(format!(
            "Invalid photo filename: '{filename}'"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PhotoStore {
    base_path: PathBuf,
    max_size: usize,
}

impl PhotoStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::PhotoStorage(format!(
                "Failed to create photo directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        // Pin a relative configured directory (the default is `./photos`) to
        // its absolute location before any traversal comparison.
        let base_path = fs::canonicalize(&base_path).await.map_err(|e| {
            ServerError::PhotoStorage(format!(
                "Failed to resolve photo directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Photo store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    /// Store uploaded photo bytes under a server-assigned name and return
    /// that name. `original_name` contributes only its extension.
    pub async fn store_photo(
        &self,
        original_name: &str,
        data: &[u8],
    ) -> Result<String, ServerError> {
        if data.is_empty() {
            return Err(ServerError::BadRequest("Empty photo upload".to_string()));
        }
        if data.len() > self.max_size {
            return Err(ServerError::PhotoTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let ext = normalize_extension(original_name);
        let mut filename = format!(
            "{UPLOAD_FILENAME_PREFIX}{}.{ext}",
            Utc::now().timestamp_millis()
        );
        let path = self.safe_photo_path(&filename)?;

        // Uploads landing in the same millisecond race for this name.
        // `create_new` lets exactly one claim it; the rest retry under a
        // suffixed name instead of overwriting.
        if let Err(e) = write_new(&path, data).await {
            if e.kind() != std::io::ErrorKind::AlreadyExists {
                return Err(ServerError::PhotoStorage(format!(
                    "Failed to write photo {}: {}",
                    filename, e
                )));
            }
            filename = format!(
                "{UPLOAD_FILENAME_PREFIX}{}-{}.{ext}",
                Utc::now().timestamp_millis(),
                Uuid::new_v4()
            );
            let path = self.safe_photo_path(&filename)?;
            write_new(&path, data).await.map_err(|e| {
                ServerError::PhotoStorage(format!("Failed to write photo {}: {}", filename, e))
            })?;
        }

        debug!(filename = %filename, size = data.len(), "Stored photo");
        Ok(filename)
    }

    pub async fn get_photo(&self, filename: &str) -> Result<Vec<u8>, ServerError> {
        let path = self.safe_photo_path(filename)?;

        if !path.exists() {
            return Err(ServerError::PhotoNotFound(filename.to_string()));
        }

        let data = fs::read(&path).await.map_err(|e| {
            ServerError::PhotoStorage(format!("Failed to read photo {}: {}", filename, e))
        })?;

        debug!(filename = %filename, size = data.len(), "Retrieved photo");
        Ok(data)
    }

    /// Filenames of every stored photo, sorted ascending. With the
    /// timestamped naming scheme this is upload order.
    pub async fn list_photos(&self) -> Result<Vec<String>, ServerError> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.base_path)
            .await
            .map_err(|e| ServerError::PhotoStorage(format!("Failed to list photos: {}", e)))?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            ServerError::PhotoStorage(format!("Failed to read directory entry: {}", e))
        })? {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Photo path validated against traversal.
    fn safe_photo_path(&self, filename: &str) -> Result<PathBuf, ServerError> {
        check_filename(filename)?;
        let raw = self.base_path.join(filename);
        ensure_within(&self.base_path, &raw)
    }
}

/// Lowercased extension of the client's filename, or `jpg` when it is
/// missing or not a known image extension.
fn normalize_extension(original_name: &str) -> String {
    let ext = original_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if KNOWN_EXTENSIONS.contains(&ext.as_str()) {
        ext
    } else {
        "jpg".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (PhotoStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = PhotoStore::new(dir.path().to_path_buf(), 1024 * 1024)
            .await
            .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let (store, _dir) = test_store().await;
        let data = b"fake-jpeg-bytes";

        let filename = store.store_photo("selfie.jpg", data).await.unwrap();
        assert!(filename.starts_with("photo-"));
        assert!(filename.ends_with(".jpg"));

        let retrieved = store.get_photo(&filename).await.unwrap();
        assert_eq!(retrieved, data);
    }

    #[tokio::test]
    async fn test_unknown_extension_becomes_jpg() {
        let (store, _dir) = test_store().await;

        let filename = store.store_photo("payload.exe", b"data").await.unwrap();
        assert!(filename.ends_with(".jpg"));

        let filename = store.store_photo("noext", b"data").await.unwrap();
        assert!(filename.ends_with(".jpg"));

        let filename = store.store_photo("Shot.PNG", b"data").await.unwrap();
        assert!(filename.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_colliding_uploads_get_distinct_names() {
        let (store, _dir) = test_store().await;

        // Same millisecond is likely here; distinct names either way.
        let first = store.store_photo("a.jpg", b"one").await.unwrap();
        let second = store.store_photo("b.jpg", b"two").await.unwrap();
        assert_ne!(first, second);

        assert_eq!(store.get_photo(&first).await.unwrap(), b"one");
        assert_eq!(store.get_photo(&second).await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_concurrent_uploads_never_share_a_name() {
        let (store, _dir) = test_store().await;

        let uploads = (0..8).map(|i| {
            let store = store.clone();
            async move {
                let data = format!("payload-{i}");
                let filename = store.store_photo("a.jpg", data.as_bytes()).await.unwrap();
                (filename, data)
            }
        });
        let stored = futures::future::join_all(uploads).await;

        let mut names: Vec<_> = stored.iter().map(|(name, _)| name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), stored.len());

        // Every upload survives under its own name.
        for (filename, data) in stored {
            assert_eq!(store.get_photo(&filename).await.unwrap(), data.as_bytes());
        }
    }

    #[tokio::test]
    async fn test_relative_photo_dir_is_usable() {
        // The default configuration hands the store `./photos`.
        let cwd = TempDir::new().unwrap();
        std::env::set_current_dir(cwd.path()).unwrap();

        let store = PhotoStore::new(PathBuf::from("./photos"), 1024)
            .await
            .unwrap();
        let filename = store.store_photo("a.jpg", b"relative").await.unwrap();

        assert_eq!(store.get_photo(&filename).await.unwrap(), b"relative");
        assert_eq!(store.list_photos().await.unwrap(), vec![filename]);
    }

    #[tokio::test]
    async fn test_not_found() {
        let (store, _dir) = test_store().await;
        assert!(matches!(
            store.get_photo("photo-0.jpg").await,
            Err(ServerError::PhotoNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_upload_rejected() {
        let (store, _dir) = test_store().await;
        assert!(store.store_photo("a.jpg", b"").await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected() {
        let dir = TempDir::new().unwrap();
        let store = PhotoStore::new(dir.path().to_path_buf(), 8).await.unwrap();

        match store.store_photo("a.jpg", b"way too many bytes").await {
            Err(ServerError::PhotoTooLarge { size, max }) => {
                assert_eq!(size, 18);
                assert_eq!(max, 8);
            }
            other => panic!("expected PhotoTooLarge, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let (store, _dir) = test_store().await;
        assert!(store.get_photo("../etc/passwd").await.is_err());
        assert!(store.get_photo("..").await.is_err());
        assert!(store.get_photo("a/b.jpg").await.is_err());
        assert!(store.get_photo("").await.is_err());
    }

    #[tokio::test]
    async fn test_listing_is_sorted() {
        let (store, dir) = test_store().await;
        // Write names out of order directly; the store sorts.
        for name in ["photo-3.jpg", "photo-1.jpg", "photo-2.jpg"] {
            tokio::fs::write(dir.path().join(name), b"x").await.unwrap();
        }

        let names = store.list_photos().await.unwrap();
        assert_eq!(names, vec!["photo-1.jpg", "photo-2.jpg", "photo-3.jpg"]);
    }

    #[tokio::test]
    async fn test_listing_skips_hidden_files_and_directories() {
        let (store, dir) = test_store().await;
        tokio::fs::write(dir.path().join(".keep"), b"").await.unwrap();
        tokio::fs::create_dir(dir.path().join("thumbs")).await.unwrap();
        tokio::fs::write(dir.path().join("photo-1.jpg"), b"x")
            .await
            .unwrap();

        let names = store.list_photos().await.unwrap();
        assert_eq!(names, vec!["photo-1.jpg"]);
    }
}
