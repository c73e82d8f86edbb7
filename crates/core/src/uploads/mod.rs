//! Serialized upload queue with durable enqueue markers.
//!
//! The mobile client funnels every upload through one queue so at most one
//! transfer is in flight at a time. Each enqueue writes a durability
//! marker through the [`UploadJournal`] before the job becomes runnable;
//! the marker is acked only on successful completion, so markers that
//! outlive their process are visible after a restart via
//! [`UploadQueue::orphaned`].
//!
//! Failure handling is a queue-level [`RetryPolicy`]. The default,
//! [`RetryPolicy::HaltOnFailure`], re-appends the failed job to the tail
//! and stops draining until the next enqueue (or an explicit
//! [`UploadQueue::kick`]) re-triggers it.

mod error;
mod journal;
mod queue;

pub use error::UploadError;
pub use journal::{FileJournal, Marker, MemoryJournal, UploadJournal};
pub use queue::{JobHandle, JobState, RetryPolicy, UploadQueue};
