//! S3-compatible storage backend.

use std::collections::HashMap;

use opendal::{ErrorKind, Operator, services};

use super::config::S3Settings;
use super::error::StorageError;
use super::key::{generate_key, join_url};
use super::provider::{StorageFile, StorageProvider, StorageResult};

/// Object-store provider for S3 and S3-compatible services (R2, Spaces,
/// MinIO).
///
/// Uses the same key scheme as the local backend. Object URLs prefer the
/// CDN front-end when one is configured; otherwise they are derived from
/// the custom endpoint or the bucket's virtual-host address. Unlike the
/// local backend, `url` performs no existence check: keys are constructed,
/// not verified.
///
/// Thumbnail derivation and the optional rename/copy/list capabilities are
/// not supported by this backend.
pub struct S3Storage {
    op: Operator,
    settings: S3Settings,
}

impl S3Storage {
    /// Create an S3 provider from connection settings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the operator cannot be built.
    pub fn new(settings: S3Settings) -> Result<Self, StorageError> {
        let mut builder = services::S3::default()
            .bucket(&settings.bucket)
            .region(&settings.region)
            .access_key_id(&settings.access_key_id)
            .secret_access_key(&settings.secret_access_key);
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint(endpoint);
        }

        let op = Operator::new(builder)
            .map_err(|e| StorageError::configuration(e.to_string()))?
            .finish();

        tracing::info!(bucket = %settings.bucket, region = %settings.region, "s3 storage ready");
        Ok(Self { op, settings })
    }

    fn object_url(&self, key: &str) -> String {
        if let Some(cdn) = &self.settings.cdn_url {
            return join_url(cdn, key);
        }
        if let Some(endpoint) = &self.settings.endpoint {
            let base = format!(
                "{}/{}",
                endpoint.trim_end_matches('/'),
                self.settings.bucket
            );
            return join_url(&base, key);
        }
        let base = format!(
            "https://{}.s3.{}.amazonaws.com",
            self.settings.bucket, self.settings.region
        );
        join_url(&base, key)
    }
}

#[async_trait::async_trait]
impl StorageProvider for S3Storage {
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

        tracing::info!(key = %key, size = file.size(), bucket = %self.settings.bucket, "stored object");

        let mut metadata = HashMap::new();
        metadata.insert("original_name".to_string(), file.original_name.clone());
        metadata.insert("bucket".to_string(), self.settings.bucket.clone());

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
        Ok(self.object_url(key))
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}
