//! Durable enqueue markers.
//!
//! The journal is the queue's only persistent state. Every mutation is a
//! single atomic operation: the file-backed implementation rewrites the
//! whole marker set through a temp-file-and-rename, so a crash can never
//! leave the journal half-written.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use cosmicboard_shared::JobId;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::error::UploadError;

/// Durability marker proving a job was enqueued and not yet completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    /// Id of the enqueued job.
    pub id: JobId,
    /// When the job was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl Marker {
    /// Create a marker stamped with the current time.
    #[must_use]
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            enqueued_at: Utc::now(),
        }
    }
}

/// Persistent store for enqueue markers.
///
/// Every method is one atomic mutation of the marker set.
#[async_trait::async_trait]
pub trait UploadJournal: Send + Sync {
    /// Record a marker. Recording an already-present id is a no-op.
    async fn record(&self, marker: &Marker) -> Result<(), UploadError>;

    /// Acknowledge (remove) a marker after successful completion. Acking
    /// an absent id is a no-op.
    async fn ack(&self, id: &JobId) -> Result<(), UploadError>;

    /// All markers currently recorded.
    async fn pending(&self) -> Result<Vec<Marker>, UploadError>;
}

/// File-backed journal storing markers as a JSON array.
pub struct FileJournal {
    path: PathBuf,
    // Serializes read-modify-write cycles; the file itself is replaced
    // atomically via temp file + rename.
    lock: Mutex<()>,
}

impl FileJournal {
    /// Create a journal persisting to `path`. The file is created on the
    /// first recorded marker; a missing file reads as an empty journal.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read_markers(&self) -> Result<Vec<Marker>, UploadError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_markers(&self, markers: &[Marker]) -> Result<(), UploadError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, serde_json::to_vec_pretty(markers)?).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl UploadJournal for FileJournal {
    async fn record(&self, marker: &Marker) -> Result<(), UploadError> {
        let _guard = self.lock.lock().await;
        let mut markers = self.read_markers().await?;
        if !markers.iter().any(|m| m.id == marker.id) {
            markers.push(marker.clone());
            self.write_markers(&markers).await?;
        }
        Ok(())
    }

    async fn ack(&self, id: &JobId) -> Result<(), UploadError> {
        let _guard = self.lock.lock().await;
        let mut markers = self.read_markers().await?;
        let before = markers.len();
        markers.retain(|m| &m.id != id);
        if markers.len() != before {
            self.write_markers(&markers).await?;
        }
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<Marker>, UploadError> {
        let _guard = self.lock.lock().await;
        self.read_markers().await
    }
}

/// In-memory journal for tests and ephemeral queues.
#[derive(Default)]
pub struct MemoryJournal {
    markers: Mutex<Vec<Marker>>,
}

impl MemoryJournal {
    /// Create an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl UploadJournal for MemoryJournal {
    async fn record(&self, marker: &Marker) -> Result<(), UploadError> {
        let mut markers = self.markers.lock().await;
        if !markers.iter().any(|m| m.id == marker.id) {
            markers.push(marker.clone());
        }
        Ok(())
    }

    async fn ack(&self, id: &JobId) -> Result<(), UploadError> {
        self.markers.lock().await.retain(|m| &m.id != id);
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<Marker>, UploadError> {
        Ok(self.markers.lock().await.clone())
    }
}
