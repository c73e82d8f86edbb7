//! Upload queue error types.

use thiserror::Error;

/// Upload queue operation errors.
#[derive(Debug, Error)]
pub enum UploadError {
    /// An enqueued task failed.
    #[error("upload task failed: {message}")]
    Task {
        /// Failure description reported by the task.
        message: String,
    },

    /// Journal file I/O failed.
    #[error("journal I/O failed: {source}")]
    Journal {
        /// Underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Journal record (de)serialization failed.
    #[error("journal serialization failed: {source}")]
    Serialization {
        /// Underlying serde error.
        #[from]
        source: serde_json::Error,
    },
}

impl UploadError {
    /// Create a task failure error.
    #[must_use]
    pub fn task(message: impl Into<String>) -> Self {
        Self::Task {
            message: message.into(),
        }
    }
}
