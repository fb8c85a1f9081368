//! The workflow engine facade.
//!
//! This is the only surface external callers depend on: submit jobs, poll
//! their status, list and count them, retry, remove and clean up. It owns
//! the wiring from the queue to the workflow runner.

use crate::worker::WorkerPool;
use nodeflow_core::{JobId, Result};
use nodeflow_queue::{JobCounts, JobQueue, JobState, QueueError, QueuedJob, RecoveredJobs};
use nodeflow_workflow::{NodeExecutor, WorkflowJob, WorkflowRunner};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Facade over the job queue and the runner that executes its jobs.
pub struct WorkflowEngine<E: NodeExecutor + 'static> {
    queue: Arc<JobQueue>,
    runner: Arc<WorkflowRunner<E>>,
}

impl<E: NodeExecutor + 'static> WorkflowEngine<E> {
    /// Creates an engine running jobs from `queue` with `executor`.
    pub fn new(queue: Arc<JobQueue>, executor: E) -> Self {
        Self {
            queue,
            runner: Arc::new(WorkflowRunner::new(executor)),
        }
    }

    /// Returns the underlying queue.
    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Starts `workers` workers executing queued jobs.
    pub fn start(&self, workers: usize) -> WorkerPool {
        WorkerPool::spawn(self.queue.clone(), self.runner.clone(), workers)
    }

    /// Submits a workflow job and returns its queue ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the job store is unavailable.
    #[instrument(skip_all, fields(workflow_id = %job.workflow_id))]
    pub async fn submit(&self, job: WorkflowJob) -> Result<JobId, QueueError> {
        Ok(self.queue.enqueue(job).await?)
    }

    /// Returns the current record of a job.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] for an unknown ID, or an error if the
    /// job store is unavailable.
    pub async fn get_status(&self, id: JobId) -> Result<QueuedJob, QueueError> {
        Ok(self.queue.get(id).await?)
    }

    /// Lists jobs in `state` at positions `start..=end`, both inclusive.
    ///
    /// # Errors
    ///
    /// Returns an error if the job store is unavailable.
    pub async fn list(
        &self,
        state: JobState,
        start: usize,
        end: usize,
    ) -> Result<Vec<QueuedJob>, QueueError> {
        Ok(self.queue.list(state, start, end).await?)
    }

    /// Returns the number of jobs in each state.
    ///
    /// # Errors
    ///
    /// Returns an error if the job store is unavailable.
    pub async fn stats(&self) -> Result<JobCounts, QueueError> {
        Ok(self.queue.counts().await?)
    }

    /// Re-runs a failed job from its first node.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotRetryable`] if the job is not failed, or an
    /// error if the job store is unavailable.
    pub async fn retry(&self, id: JobId) -> Result<(), QueueError> {
        Ok(self.queue.retry(id).await?)
    }

    /// Removes a job, abandoning its run if one is in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the job store is unavailable.
    pub async fn remove(&self, id: JobId) -> Result<(), QueueError> {
        Ok(self.queue.remove(id).await?)
    }

    /// Removes completed and failed jobs older than `max_age`.
    ///
    /// # Errors
    ///
    /// Returns an error if the job store is unavailable.
    pub async fn clean(&self, max_age: Duration) -> Result<u64, QueueError> {
        Ok(self.queue.clean(max_age).await?)
    }

    /// Settles jobs left active by a previous process, counting the
    /// interrupted attempt. See [`JobQueue::recover`].
    ///
    /// Call before [`WorkflowEngine::start`].
    ///
    /// # Errors
    ///
    /// Returns an error if the job store is unavailable.
    pub async fn recover(&self) -> Result<RecoveredJobs, QueueError> {
        Ok(self.queue.recover().await?)
    }
}
