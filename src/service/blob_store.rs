// service/blob_store.rs
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::service::error::CollaboratorError;

#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug {
    /// Store `bytes` under `path` and return the public URL.
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String, CollaboratorError>;
}

/// Files under a local directory, served from `base_url`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Only plain relative segments are accepted.
fn sanitize(path: &str) -> Result<PathBuf, CollaboratorError> {
    let candidate = Path::new(path);
    let mut clean = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(segment) => clean.push(segment),
            _ => {
                return Err(CollaboratorError::Rejected(format!(
                    "invalid blob path: {}",
                    path
                )))
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(CollaboratorError::Rejected("empty blob path".to_string()));
    }
    Ok(clean)
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String, CollaboratorError> {
        let relative = sanitize(path)?;
        let target = self.root.join(&relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;

        let url_path = relative
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect::<Vec<_>>()
            .join("/");
        Ok(format!("{}/{}", self.base_url, url_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_is_rejected() {
        assert!(sanitize("../etc/passwd").is_err());
        assert!(sanitize("/abs/file.jpg").is_err());
        assert!(sanitize("").is_err());
        assert_eq!(
            sanitize("quote-requests/r1/photo.jpg").unwrap(),
            PathBuf::from("quote-requests/r1/photo.jpg")
        );
    }

    #[tokio::test]
    async fn upload_writes_under_root() {
        let root = std::env::temp_dir().join(format!("blob-test-{}", uuid::Uuid::new_v4()));
        let store = LocalBlobStore::new(&root, "http://localhost:8000/uploads/");
        let url = store.upload("r1/a.jpg", b"jpeg".to_vec()).await.unwrap();
        assert_eq!(url, "http://localhost:8000/uploads/r1/a.jpg");
        assert_eq!(tokio::fs::read(root.join("r1/a.jpg")).await.unwrap(), b"jpeg");
        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
