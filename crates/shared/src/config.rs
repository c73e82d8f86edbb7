//! Application configuration management.
//!
//! Configuration is environment-driven. The raw settings deserialized here
//! mirror the deployment's environment variables one-to-one; the typed
//! storage configuration is derived from them in the core crate.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Storage configuration as read from the environment.
    pub storage: StorageSettings,
}

/// Raw storage settings, one field per environment variable.
///
/// `STORAGE_PROVIDER` selects the backend; the `STORAGE_LOCAL_*` and
/// `AWS_*` groups configure the local and S3 backends respectively. The
/// remaining variables are global upload policy.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Backend discriminator (`STORAGE_PROVIDER`).
    #[serde(default = "default_provider")]
    pub storage_provider: String,
    /// Root directory for the local backend (`STORAGE_LOCAL_PATH`).
    #[serde(default = "default_local_path")]
    pub storage_local_path: String,
    /// Public URL prefix for the local backend (`STORAGE_LOCAL_URL`).
    #[serde(default = "default_local_url")]
    pub storage_local_url: String,
    /// S3 bucket name (`AWS_S3_BUCKET`).
    #[serde(default)]
    pub aws_s3_bucket: Option<String>,
    /// S3 region (`AWS_REGION`).
    #[serde(default)]
    pub aws_region: Option<String>,
    /// S3 access key id (`AWS_ACCESS_KEY_ID`).
    #[serde(default)]
    pub aws_access_key_id: Option<String>,
    /// S3 secret access key (`AWS_SECRET_ACCESS_KEY`).
    #[serde(default)]
    pub aws_secret_access_key: Option<String>,
    /// Custom S3 endpoint for S3-compatible stores (`AWS_S3_ENDPOINT`).
    #[serde(default)]
    pub aws_s3_endpoint: Option<String>,
    /// CDN front-end preferred for object URLs (`AWS_CLOUDFRONT_URL`).
    #[serde(default)]
    pub aws_cloudfront_url: Option<String>,
    /// Maximum accepted upload size in megabytes (`MAX_FILE_SIZE_MB`).
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    /// Whether thumbnail derivation is enabled (`GENERATE_THUMBNAILS`).
    #[serde(default = "default_generate_thumbnails")]
    pub generate_thumbnails: bool,
    /// Thumbnail bounding-box width in pixels (`THUMBNAIL_WIDTH`).
    #[serde(default = "default_thumbnail_width")]
    pub thumbnail_width: u32,
    /// Thumbnail bounding-box height in pixels (`THUMBNAIL_HEIGHT`).
    #[serde(default = "default_thumbnail_height")]
    pub thumbnail_height: u32,
    /// JPEG quality for derived thumbnails (`THUMBNAIL_QUALITY`).
    #[serde(default = "default_thumbnail_quality")]
    pub thumbnail_quality: u8,
}

fn default_provider() -> String {
    "local".to_string()
}

fn default_local_path() -> String {
    "./uploads".to_string()
}

fn default_local_url() -> String {
    "/uploads".to_string()
}

fn default_max_file_size_mb() -> u64 {
    10
}

fn default_generate_thumbnails() -> bool {
    true
}

fn default_thumbnail_width() -> u32 {
    300
}

fn default_thumbnail_height() -> u32 {
    300
}

fn default_thumbnail_quality() -> u8 {
    80
}

impl AppConfig {
    /// Loads configuration from a `.env` file (if present) and the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be deserialized.
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Loads configuration from the process environment only.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be deserialized.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        let storage: StorageSettings = config.try_deserialize()?;
        Ok(Self { storage })
    }
}
