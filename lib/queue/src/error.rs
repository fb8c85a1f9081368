//! Error types for the queue crate.
//!
//! - `StoreError`: Failures of the durable job store
//! - `QueueError`: Queue operation failures surfaced to callers

use crate::job::JobState;
use nodeflow_core::JobId;
use std::fmt;

/// Errors from job store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or the statement failed.
    Unavailable { reason: String },
    /// A stored record could not be decoded.
    Corrupt { id: String, reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "job store unavailable: {reason}"),
            Self::Corrupt { id, reason } => write!(f, "corrupt job record {id}: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from queue operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// No job with the given ID exists.
    NotFound { id: JobId },
    /// Manual retry requested for a job that is not failed.
    NotRetryable { id: JobId, state: JobState },
    /// The job store failed.
    Store(StoreError),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "job not found: {id}"),
            Self::NotRetryable { id, state } => {
                write!(f, "job {id} cannot be retried while {state}")
            }
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for QueueError {}

impl From<StoreError> for QueueError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let id = JobId::new();
        let err = QueueError::NotFound { id };
        assert_eq!(err.to_string(), format!("job not found: {id}"));
    }

    #[test]
    fn not_retryable_display() {
        let err = QueueError::NotRetryable {
            id: JobId::new(),
            state: JobState::Active,
        };
        assert!(err.to_string().ends_with("cannot be retried while active"));
    }

    #[test]
    fn store_error_passes_through() {
        let err = QueueError::from(StoreError::Unavailable {
            reason: "disk full".to_string(),
        });
        assert_eq!(err.to_string(), "job store unavailable: disk full");
    }
}
