//! Error types for dirsync

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the synchronization engine.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    /// The scan enumeration of a directory failed outright; the cycle aborts.
    #[error("scan of {path} failed: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Internal guard: a task could not be marked ready before its deadline.
    #[error("task can't get ready for processing, so it is discarded")]
    TaskStale,

    /// The scheduler's bounded enqueue wait expired in once mode.
    #[error("deadline exceeded: {0}")]
    Deadline(String),

    /// A worker or the controller's cycle loop panicked; this is always fatal.
    #[error("fatal error: {0}")]
    Fatal(String),

    /// A copy was aborted mid-flight by a cancellation handle. Not counted
    /// as a failure.
    #[error("operation canceled")]
    Canceled,
}

impl SyncError {
    /// Whether this error should count toward the controller's
    /// consecutive-error shutdown budget: cycle-structural errors only,
    /// never per-task execution errors.
    pub fn counts_toward_error_budget(&self) -> bool {
        matches!(
            self,
            SyncError::Scan { .. } | SyncError::Fatal(_) | SyncError::Deadline(_)
        )
    }
}
