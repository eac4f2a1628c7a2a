use std::path::{Path, PathBuf};

use axum::http::{HeaderMap, header};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ApiError;

/// 10 MB upload limit for photos
pub const MAX_PHOTO_SIZE: usize = 10 * 1024 * 1024;

/// URL prefix under which stored photos are served.
pub const PHOTO_ROUTE: &str = "/photos";

/// Disk-backed blob store for user and group photos. The core only ever
/// sees the URL this hands back.
#[derive(Debug, Clone)]
pub struct PhotoStore {
    dir: PathBuf,
}

impl PhotoStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the photo under a fresh name and return its public URL.
    pub async fn save(&self, bytes: &[u8], mime_type: &str) -> Result<String, ApiError> {
        if bytes.is_empty() {
            return Err(ApiError::BadRequest("photo is empty".into()));
        }
        if bytes.len() > MAX_PHOTO_SIZE {
            return Err(ApiError::PayloadTooLarge);
        }
        let ext = extension_for(mime_type)?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            error!("Failed to create photo directory {}: {}", self.dir.display(), e);
            ApiError::Internal("photo storage unavailable".into())
        })?;

        let file_name = format!("{}.{}", Uuid::new_v4(), ext);
        let file_path = self.dir.join(&file_name);
        let mut file = tokio::fs::File::create(&file_path).await.map_err(|e| {
            error!("Failed to create file {}: {}", file_path.display(), e);
            ApiError::Internal("photo storage unavailable".into())
        })?;
        file.write_all(bytes).await.map_err(|e| {
            error!("Failed to write file {}: {}", file_path.display(), e);
            ApiError::Internal("photo storage unavailable".into())
        })?;
        file.flush().await.map_err(|e| {
            error!("Failed to flush file {}: {}", file_path.display(), e);
            ApiError::Internal("photo storage unavailable".into())
        })?;

        info!("Stored photo {} ({} bytes)", file_name, bytes.len());
        Ok(format!("{}/{}", PHOTO_ROUTE, file_name))
    }

    /// Remove a photo saved by [`save`](Self::save) whose owning update was
    /// rejected. URLs this store did not hand out are ignored.
    pub async fn discard(&self, url: &str) {
        let Some(file_name) = url
            .strip_prefix(PHOTO_ROUTE)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| {
                !name.is_empty() && !name.starts_with('.') && !name.contains(['/', '\\'])
            })
        else {
            return;
        };

        let file_path = self.dir.join(file_name);
        match tokio::fs::remove_file(&file_path).await {
            Ok(()) => debug!("Discarded photo {}", file_name),
            Err(e) => warn!("Failed to discard photo {}: {}", file_path.display(), e),
        }
    }
}

/// Photo MIME type from the request's Content-Type header.
pub fn content_type(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase())
        .ok_or_else(|| ApiError::BadRequest("missing Content-Type".into()))
}

fn extension_for(mime_type: &str) -> Result<&'static str, ApiError> {
    match mime_type.to_ascii_lowercase().as_str() {
        "image/jpeg" => Ok("jpg"),
        "image/png" => Ok("png"),
        other => Err(ApiError::BadRequest(format!(
            "unsupported photo type '{}': only JPEG and PNG are allowed",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saves_under_fresh_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = PhotoStore::new(dir.path().join("photos"));

        let url = store.save(b"\x89PNG", "image/png").await.unwrap();
        assert!(url.starts_with("/photos/") && url.ends_with(".png"));

        let name = url.trim_start_matches("/photos/");
        let stored = std::fs::read(store.dir().join(name)).unwrap();
        assert_eq!(stored, b"\x89PNG");
    }

    #[tokio::test]
    async fn discard_removes_only_own_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = PhotoStore::new(dir.path());
        let keep = dir.path().join("keep.png");
        std::fs::write(&keep, b"x").unwrap();

        let url = store.save(b"\xff\xd8\xff", "image/jpeg").await.unwrap();
        store.discard(&url).await;
        store.discard("/photos/../keep.png").await;
        store.discard("/elsewhere/keep.png").await;

        let left: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(left.len(), 1);
        assert!(keep.exists());
    }

    #[tokio::test]
    async fn rejects_unsupported_types() {
        let dir = tempfile::tempdir().unwrap();
        let store = PhotoStore::new(dir.path());

        assert!(matches!(
            store.save(b"GIF89a", "image/gif").await,
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            store.save(b"", "image/png").await,
            Err(ApiError::BadRequest(_))
        ));
    }
}
