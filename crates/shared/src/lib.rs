//! Shared types, errors, and configuration for CosmicBoard.
//!
//! This crate provides common types used across all other crates:
//! - Typed job identifiers for the upload pipeline
//! - Application-wide error types with HTTP status mapping
//! - Environment-driven configuration loading

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, StorageSettings};
pub use error::{AppError, AppResult};
pub use types::JobId;
