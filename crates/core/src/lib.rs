//! Media core for CosmicBoard.
//!
//! This crate contains the media plumbing shared by the web backend and the
//! mobile client, with ZERO web or database dependencies.
//!
//! # Modules
//!
//! - `storage` - Pluggable object storage (local filesystem, S3-compatible)
//! - `uploads` - Serialized upload queue with durable enqueue markers

pub mod storage;
pub mod uploads;
