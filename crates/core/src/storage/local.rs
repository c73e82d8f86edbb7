//! Local filesystem storage backend.

use std::collections::HashMap;
use std::path::PathBuf;

use opendal::{ErrorKind, Operator, services};

use super::config::ThumbnailOptions;
use super::error::StorageError;
use super::key::{generate_key, join_url};
use super::provider::{THUMBNAIL_PREFIX, StorageFile, StorageProvider, StorageResult};
use super::thumbnail;

/// Filesystem-backed storage provider.
///
/// Keys are relative paths under a base directory resolved once at
/// construction; parent directories appear on demand during writes. Object
/// URLs are the configured public base URL joined with the key.
pub struct LocalStorage {
    op: Operator,
    base_url: String,
}

impl LocalStorage {
    /// Create a local storage provider rooted at `root`.
    ///
    /// The root directory is created if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the root cannot be created or is
    /// not valid UTF-8.
    pub fn new(
        root: impl Into<PathBuf>,
        base_url: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let root = root.into();

        std::fs::create_dir_all(&root)
            .map_err(|e| StorageError::configuration(format!("{}: {e}", root.display())))?;

        let root_str = root
            .to_str()
            .ok_or_else(|| StorageError::configuration("storage root is not valid UTF-8"))?;
        let builder = services::Fs::default().root(root_str);
        let op = Operator::new(builder)
            .map_err(|e| StorageError::configuration(e.to_string()))?
            .finish();

        tracing::info!(root = %root.display(), "local storage ready");
        Ok(Self {
            op,
            base_url: base_url.into(),
        })
    }

    fn object_url(&self, key: &str) -> String {
        join_url(&self.base_url, key)
    }
}

#[async_trait::async_trait]
impl StorageProvider for LocalStorage {
    async fn upload(
        &self,
        file: &StorageFile,
        destination: &str,
    ) -> Result<StorageResult, StorageError> {
        let key = generate_key(&file.original_name, destination)?;

        self.op
            .write(&key, file.buffer.clone())
            .await
            .map_err(StorageError::from)?;

        tracing::info!(key = %key, size = file.size(), "stored object");

        let mut metadata = HashMap::new();
        metadata.insert("original_name".to_string(), file.original_name.clone());

        Ok(StorageResult {
            url: self.object_url(&key),
            key,
            size: file.size(),
            mime_type: file.mime_type.clone(),
            metadata,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match self.op.delete(key).await {
            Ok(()) => {
                tracing::info!(key = %key, "deleted object");
                Ok(())
            }
            // Idempotent: deleting an absent key is a success.
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self.op.stat(key).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn url(&self, key: &str) -> Result<String, StorageError> {
        if self.exists(key).await? {
            Ok(self.object_url(key))
        } else {
            Err(StorageError::not_found(key))
        }
    }

    async fn generate_thumbnail(
        &self,
        file: &StorageFile,
        options: &ThumbnailOptions,
    ) -> Result<StorageResult, StorageError> {
        let bytes = thumbnail::render_thumbnail(file, options)?;
        let derived = StorageFile::new(
            bytes,
            thumbnail::thumbnail_name(&file.original_name),
            "image/jpeg",
        );
        self.upload(&derived, THUMBNAIL_PREFIX).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
        self.op.rename(from, to).await.map_err(StorageError::from)
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError> {
        self.op.copy(from, to).await.map_err(StorageError::from)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let normalized = if prefix.is_empty() || prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{prefix}/")
        };

        let entries = self
            .op
            .list_with(&normalized)
            .recursive(true)
            .await
            .map_err(StorageError::from)?;

        Ok(entries
            .iter()
            .map(opendal::Entry::path)
            .filter(|path| !path.ends_with('/'))
            .map(|path| path.strip_prefix(&normalized).unwrap_or(path).to_string())
            .collect())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
