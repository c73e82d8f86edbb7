//! Storage provider contract and value types.

use std::collections::HashMap;

use bytes::Bytes;

use super::config::ThumbnailOptions;
use super::error::StorageError;

/// Destination prefix under which derived thumbnails are stored.
pub const THUMBNAIL_PREFIX: &str = "thumbnails";

/// A file buffer handed to a provider for storage.
#[derive(Debug, Clone)]
pub struct StorageFile {
    /// Raw byte content.
    pub buffer: Bytes,
    /// Name the file was uploaded under.
    pub original_name: String,
    /// MIME type reported by the uploader.
    pub mime_type: String,
}

impl StorageFile {
    /// Create a storage file from a byte buffer and its provenance.
    #[must_use]
    pub fn new(
        buffer: impl Into<Bytes>,
        original_name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            buffer: buffer.into(),
            original_name: original_name.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Byte length of the content.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.buffer.len() as u64
    }

    /// Whether the reported MIME type is an image type.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Result of a successful store operation.
#[derive(Debug, Clone)]
pub struct StorageResult {
    /// Externally resolvable address of the stored object.
    pub url: String,
    /// Canonical provider-scoped identifier of the object.
    pub key: String,
    /// Stored byte length.
    pub size: u64,
    /// MIME type of the stored content.
    pub mime_type: String,
    /// Echoed and derived attributes.
    pub metadata: HashMap<String, String>,
}

/// Contract implemented by every storage backend.
///
/// `upload`, `delete`, `exists`, and `url` are mandatory. The remaining
/// operations are optional capabilities: the default implementations fail
/// with an unsupported-operation error, and backends override the ones
/// they can honor.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait StorageProvider: Send + Sync {
    /// Store a file under a freshly generated key, optionally prefixed by
    /// `destination`, and return its canonical key and resolvable URL.
    async fn upload(
        &self,
        file: &StorageFile,
        destination: &str,
    ) -> Result<StorageResult, StorageError>;

    /// Remove an object. Deleting an absent key succeeds silently.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Whether an object exists under the key.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Resolve the public URL for a key.
    async fn url(&self, key: &str) -> Result<String, StorageError>;

    /// Derive a thumbnail from an image file and store it as a first-class
    /// object under [`THUMBNAIL_PREFIX`].
    async fn generate_thumbnail(
        &self,
        file: &StorageFile,
        options: &ThumbnailOptions,
    ) -> Result<StorageResult, StorageError> {
        let _ = (file, options);
        Err(StorageError::unsupported(format!(
            "thumbnail generation on provider '{}'",
            self.name()
        )))
    }

    /// Move an object to a new key.
    async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let _ = (from, to);
        Err(StorageError::unsupported(format!(
            "rename on provider '{}'",
            self.name()
        )))
    }

    /// Copy an object to a new key.
    async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let _ = (from, to);
        Err(StorageError::unsupported(format!(
            "copy on provider '{}'",
            self.name()
        )))
    }

    /// Recursively enumerate keys under a prefix, relative to the prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let _ = prefix;
        Err(StorageError::unsupported(format!(
            "list on provider '{}'",
            self.name()
        )))
    }

    /// Provider discriminator for logging and persisted metadata.
    fn name(&self) -> &'static str;
}
