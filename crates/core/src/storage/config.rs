//! Typed storage configuration.
//!
//! The raw environment settings from `cosmicboard-shared` are converted
//! into a tagged backend union here, so every consumer matches
//! exhaustively instead of branching on provider strings at runtime.

use std::path::PathBuf;

use cosmicboard_shared::{AppConfig, StorageSettings};
use serde::{Deserialize, Serialize};

use super::error::StorageError;

/// Provider names that are recognized but have no implementation yet.
const RESERVED_PROVIDERS: [&str; 3] = ["cloudinary", "azure", "gcs"];

/// Settings for the local filesystem backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSettings {
    /// Root directory all keys resolve under.
    pub root: PathBuf,
    /// Public URL prefix joined with keys to form object URLs.
    pub base_url: String,
}

/// Settings for the S3-compatible backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Settings {
    /// Bucket name.
    pub bucket: String,
    /// Bucket region.
    pub region: String,
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Custom endpoint for S3-compatible stores (R2, MinIO, Spaces).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// CDN front-end preferred over the raw bucket URL when set.
    #[serde(default)]
    pub cdn_url: Option<String>,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageBackend {
    /// Local filesystem.
    Local(LocalSettings),
    /// S3-compatible object store.
    S3(S3Settings),
}

impl StorageBackend {
    /// Create a local filesystem backend.
    #[must_use]
    pub fn local(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self::Local(LocalSettings {
            root: root.into(),
            base_url: base_url.into(),
        })
    }

    /// Get the provider name for logging and persisted metadata.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::S3(_) => "s3",
        }
    }
}

/// Thumbnail derivation options.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThumbnailOptions {
    /// Bounding-box width in pixels.
    pub width: u32,
    /// Bounding-box height in pixels.
    pub height: u32,
    /// JPEG quality of the derived image.
    pub quality: u8,
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self {
            width: 300,
            height: 300,
            quality: 80,
        }
    }
}

/// Storage service configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Backend selection and connection settings.
    pub backend: StorageBackend,
    /// Maximum accepted upload size in bytes.
    pub max_file_size: u64,
    /// Whether thumbnail derivation is enabled.
    pub generate_thumbnails: bool,
    /// Options applied to derived thumbnails.
    pub thumbnails: ThumbnailOptions,
}

impl StorageConfig {
    /// Default max file size: 10MB.
    pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

    /// Create a new storage config with default policy settings.
    #[must_use]
    pub fn new(backend: StorageBackend) -> Self {
        Self {
            backend,
            max_file_size: Self::DEFAULT_MAX_FILE_SIZE,
            generate_thumbnails: true,
            thumbnails: ThumbnailOptions::default(),
        }
    }

    /// Set maximum file size in bytes.
    #[must_use]
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Enable or disable thumbnail derivation.
    #[must_use]
    pub fn with_thumbnails(mut self, enabled: bool) -> Self {
        self.generate_thumbnails = enabled;
        self
    }

    /// Set thumbnail derivation options.
    #[must_use]
    pub fn with_thumbnail_options(mut self, options: ThumbnailOptions) -> Self {
        self.thumbnails = options;
        self
    }

    /// Convert raw environment settings into a typed configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the provider is unknown or not
    /// implemented, or if a required connection setting is missing.
    pub fn from_settings(settings: &StorageSettings) -> Result<Self, StorageError> {
        let backend = match settings.storage_provider.as_str() {
            "local" => StorageBackend::local(
                settings.storage_local_path.clone(),
                settings.storage_local_url.clone(),
            ),
            "s3" => StorageBackend::S3(S3Settings {
                bucket: require(&settings.aws_s3_bucket, "AWS_S3_BUCKET")?,
                region: require(&settings.aws_region, "AWS_REGION")?,
                access_key_id: require(&settings.aws_access_key_id, "AWS_ACCESS_KEY_ID")?,
                secret_access_key: require(
                    &settings.aws_secret_access_key,
                    "AWS_SECRET_ACCESS_KEY",
                )?,
                endpoint: settings.aws_s3_endpoint.clone(),
                cdn_url: settings.aws_cloudfront_url.clone(),
            }),
            reserved if RESERVED_PROVIDERS.contains(&reserved) => {
                return Err(StorageError::configuration(format!(
                    "storage provider '{reserved}' is not implemented"
                )));
            }
            unknown => {
                return Err(StorageError::configuration(format!(
                    "unknown storage provider '{unknown}'"
                )));
            }
        };

        Ok(Self {
            backend,
            max_file_size: settings.max_file_size_mb * 1024 * 1024,
            generate_thumbnails: settings.generate_thumbnails,
            thumbnails: ThumbnailOptions {
                width: settings.thumbnail_width,
                height: settings.thumbnail_height,
                quality: settings.thumbnail_quality,
            },
        })
    }

    /// Resolve configuration from the process environment.
    ///
    /// Intended for the composition root; everything downstream receives
    /// the resolved value by injection.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the environment cannot be read or
    /// describes an unusable backend.
    pub fn from_env() -> Result<Self, StorageError> {
        let app = AppConfig::load().map_err(|e| StorageError::configuration(e.to_string()))?;
        Self::from_settings(&app.storage)
    }
}

fn require(value: &Option<String>, name: &str) -> Result<String, StorageError> {
    value
        .clone()
        .ok_or_else(|| StorageError::configuration(format!("{name} is required for provider 's3'")))
}
