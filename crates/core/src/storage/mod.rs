//! Pluggable object storage for media files.
//!
//! Call sites talk to the [`StorageProvider`] contract (or the
//! [`MediaService`] facade built on top of it) and never to a concrete
//! backend. Both backends perform their byte I/O through Apache OpenDAL:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        MediaService                          │
//! │        (size policy, thumbnail policy, provider choice)      │
//! ├──────────────────────────────────────────────────────────────┤
//! │                    dyn StorageProvider                       │
//! │   upload / delete / exists / url / generate_thumbnail / ...  │
//! ├──────────────────────────────┬───────────────────────────────┤
//! │        LocalStorage          │          S3Storage            │
//! │   (opendal services-fs)      │    (opendal services-s3)      │
//! └──────────────────────────────┴───────────────────────────────┘
//! ```
//!
//! Keys are provider-scoped: a key minted by one backend is not portable
//! to another.

mod config;
mod error;
mod key;
mod local;
mod provider;
mod s3;
mod service;
mod thumbnail;

pub use config::{LocalSettings, S3Settings, StorageBackend, StorageConfig, ThumbnailOptions};
pub use error::StorageError;
pub use key::{generate_key, join_url};
pub use local::LocalStorage;
pub use provider::{StorageFile, StorageProvider, StorageResult, THUMBNAIL_PREFIX};
pub use s3::S3Storage;
pub use service::MediaService;
