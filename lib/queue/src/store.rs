//! The durable store behind the job queue.
//!
//! The queue is the only writer; every mutation of an existing record is a
//! compare-and-set on its state, so concurrent workers and API callers never
//! overwrite each other's transitions.

use crate::error::StoreError;
use crate::job::{JobCounts, JobState, QueuedJob};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nodeflow_core::JobId;

/// Trait for job persistence.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Stores a new job.
    async fn insert(&self, job: &QueuedJob) -> Result<(), StoreError>;

    /// Gets a job by ID.
    async fn get(&self, id: JobId) -> Result<Option<QueuedJob>, StoreError>;

    /// Atomically claims the next due job, moving it into a new attempt.
    ///
    /// Waiting jobs and delayed jobs whose `run_at` has passed are due; the
    /// one due earliest wins. A job is returned to at most one caller.
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<QueuedJob>, StoreError>;

    /// Overwrites a job if its stored state is still `expected`.
    ///
    /// Returns false if the job is gone or has moved to another state.
    async fn replace(&self, job: &QueuedJob, expected: JobState) -> Result<bool, StoreError>;

    /// Updates progress of an active job. Returns false if it is not active.
    async fn set_progress(&self, id: JobId, progress: u8) -> Result<bool, StoreError>;

    /// Lists jobs in `state` at positions `start..=end`, both inclusive.
    ///
    /// An `end` before `start` selects nothing.
    ///
    /// Waiting, active and delayed jobs are ordered oldest first; completed
    /// and failed jobs most recently finished first.
    async fn list(
        &self,
        state: JobState,
        start: usize,
        end: usize,
    ) -> Result<Vec<QueuedJob>, StoreError>;

    /// Counts jobs per state.
    async fn counts(&self) -> Result<JobCounts, StoreError>;

    /// Deletes a job. Returns false if it did not exist.
    async fn delete(&self, id: JobId) -> Result<bool, StoreError>;

    /// Deletes completed and failed jobs that finished before `cutoff`.
    async fn delete_finished_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JobId>, StoreError>;

    /// Settles every active job left behind by a previous process, for use
    /// before any worker starts. See [`QueuedJob::recover_interrupted`].
    ///
    /// Returns the recovered jobs in their new state.
    async fn recover_active(&self, now: DateTime<Utc>) -> Result<Vec<QueuedJob>, StoreError>;
}

/// Number of positions in the inclusive range `start..=end`.
pub(crate) fn inclusive_len(start: usize, end: usize) -> usize {
    if end < start {
        0
    } else {
        (end - start).saturating_add(1)
    }
}
