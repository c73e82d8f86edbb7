//! Media service facade.
//!
//! The service is constructed once by the application's composition root
//! and passed to call sites explicitly; there is no process-global
//! provider instance.

use std::sync::Arc;

use super::config::{StorageBackend, StorageConfig};
use super::error::StorageError;
use super::local::LocalStorage;
use super::provider::{StorageFile, StorageProvider, StorageResult};
use super::s3::S3Storage;

/// Policy-enforcing facade over the configured storage provider.
pub struct MediaService {
    provider: Arc<dyn StorageProvider>,
    config: StorageConfig,
}

impl MediaService {
    /// Instantiate the provider selected by the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the provider cannot be built.
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        let provider: Arc<dyn StorageProvider> = match &config.backend {
            StorageBackend::Local(local) => Arc::new(LocalStorage::new(
                local.root.clone(),
                local.base_url.clone(),
            )?),
            StorageBackend::S3(s3) => Arc::new(S3Storage::new(s3.clone())?),
        };

        Ok(Self { provider, config })
    }

    /// Build a service around an existing provider.
    ///
    /// Injection seam for tests and for applications that construct
    /// providers themselves.
    #[must_use]
    pub fn with_provider(provider: Arc<dyn StorageProvider>, config: StorageConfig) -> Self {
        Self { provider, config }
    }

    /// Store a file, enforcing the configured size limit first.
    ///
    /// # Errors
    ///
    /// Returns a file-too-large error before touching the provider when
    /// the buffer exceeds the configured maximum, or any provider error.
    pub async fn upload(
        &self,
        file: &StorageFile,
        destination: &str,
    ) -> Result<StorageResult, StorageError> {
        if file.size() > self.config.max_file_size {
            return Err(StorageError::file_too_large(
                file.size(),
                self.config.max_file_size,
            ));
        }
        self.provider.upload(file, destination).await
    }

    /// Derive and store a thumbnail using the configured options.
    ///
    /// # Errors
    ///
    /// Returns an unsupported-operation error when thumbnail derivation is
    /// disabled by configuration, plus any provider error.
    pub async fn thumbnail(&self, file: &StorageFile) -> Result<StorageResult, StorageError> {
        if !self.config.generate_thumbnails {
            return Err(StorageError::unsupported(
                "thumbnail generation is disabled",
            ));
        }
        self.provider
            .generate_thumbnail(file, &self.config.thumbnails)
            .await
    }

    /// Remove an object.
    ///
    /// # Errors
    ///
    /// Returns any provider error; deleting an absent key is a success.
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.provider.delete(key).await
    }

    /// Whether an object exists under the key.
    ///
    /// # Errors
    ///
    /// Returns any provider error.
    pub async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.provider.exists(key).await
    }

    /// Resolve the public URL for a key.
    ///
    /// # Errors
    ///
    /// Returns any provider error, including not-found for backends that
    /// verify existence.
    pub async fn url(&self, key: &str) -> Result<String, StorageError> {
        self.provider.url(key).await
    }

    /// Name of the configured provider.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// The resolved configuration.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::TempDir;

    use super::super::provider::MockStorageProvider;
    use super::*;

    fn local_config(dir: &TempDir) -> StorageConfig {
        StorageConfig::new(StorageBackend::local(dir.path(), "/files"))
    }

    fn stub_result(key: &str) -> StorageResult {
        StorageResult {
            url: format!("/files/{key}"),
            key: key.to_string(),
            size: 4,
            mime_type: "application/pdf".to_string(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_new_builds_local_provider() {
        let dir = TempDir::new().expect("tempdir");
        let service = MediaService::new(local_config(&dir)).expect("builds");
        assert_eq!(service.provider_name(), "local");
    }

    #[tokio::test]
    async fn test_new_builds_s3_provider() {
        let config = StorageConfig::new(StorageBackend::S3(super::super::S3Settings {
            bucket: "media".to_string(),
            region: "auto".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            endpoint: Some("https://account.r2.cloudflarestorage.com".to_string()),
            cdn_url: None,
        }));

        let service = MediaService::new(config).expect("builds");
        assert_eq!(service.provider_name(), "s3");
    }

    #[tokio::test]
    async fn test_upload_delegates_when_size_ok() {
        let dir = TempDir::new().expect("tempdir");

        let mut provider = MockStorageProvider::new();
        provider
            .expect_upload()
            .withf(|file, destination| file.original_name == "a.pdf" && destination == "docs")
            .times(1)
            .returning(|_, _| Ok(stub_result("docs/a.pdf")));

        let service = MediaService::with_provider(Arc::new(provider), local_config(&dir));
        let file = StorageFile::new(vec![0u8; 4], "a.pdf", "application/pdf");

        let result = service.upload(&file, "docs").await.expect("uploads");
        assert_eq!(result.key, "docs/a.pdf");
    }

    #[tokio::test]
    async fn test_upload_enforces_size_limit_before_provider() {
        let dir = TempDir::new().expect("tempdir");

        // No expectation set: a provider call would panic the mock.
        let provider = MockStorageProvider::new();
        let config = local_config(&dir).with_max_file_size(8);
        let service = MediaService::with_provider(Arc::new(provider), config);

        let file = StorageFile::new(vec![0u8; 16], "big.bin", "application/octet-stream");
        let err = service.upload(&file, "").await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::FileTooLarge { size: 16, max: 8 }
        ));
    }

    #[tokio::test]
    async fn test_thumbnail_disabled_short_circuits() {
        let dir = TempDir::new().expect("tempdir");

        let provider = MockStorageProvider::new();
        let config = local_config(&dir).with_thumbnails(false);
        let service = MediaService::with_provider(Arc::new(provider), config);

        let file = StorageFile::new(vec![0u8; 4], "cover.png", "image/png");
        let err = service.thumbnail(&file).await.unwrap_err();
        assert!(matches!(err, StorageError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn test_thumbnail_passes_configured_options() {
        let dir = TempDir::new().expect("tempdir");

        let mut provider = MockStorageProvider::new();
        provider
            .expect_generate_thumbnail()
            .withf(|_, options| options.width == 64 && options.height == 32)
            .times(1)
            .returning(|_, _| Ok(stub_result("thumbnails/cover.jpg")));

        let config = local_config(&dir).with_thumbnail_options(super::super::ThumbnailOptions {
            width: 64,
            height: 32,
            quality: 70,
        });
        let service = MediaService::with_provider(Arc::new(provider), config);

        let file = StorageFile::new(vec![0u8; 4], "cover.png", "image/png");
        let result = service.thumbnail(&file).await.expect("thumbnail");
        assert_eq!(result.key, "thumbnails/cover.jpg");
    }

    #[tokio::test]
    async fn test_delete_exists_url_delegate() {
        let dir = TempDir::new().expect("tempdir");

        let mut provider = MockStorageProvider::new();
        provider
            .expect_delete()
            .withf(|key| key == "a.pdf")
            .times(1)
            .returning(|_| Ok(()));
        provider
            .expect_exists()
            .withf(|key| key == "a.pdf")
            .times(1)
            .returning(|_| Ok(true));
        provider
            .expect_url()
            .withf(|key| key == "a.pdf")
            .times(1)
            .returning(|_| Ok("/files/a.pdf".to_string()));

        let service = MediaService::with_provider(Arc::new(provider), local_config(&dir));

        service.delete("a.pdf").await.expect("delete");
        assert!(service.exists("a.pdf").await.expect("exists"));
        assert_eq!(service.url("a.pdf").await.expect("url"), "/files/a.pdf");
    }
}
