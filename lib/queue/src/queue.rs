//! The job queue: submission, inspection and attempt bookkeeping.
//!
//! All state lives in the [`JobStore`]; the queue decides transitions,
//! applies backoff, hands out cancellation tokens for in-flight attempts and
//! emits a [`JobEvent`] after each committed transition.

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::events::{JobEvent, JobObserver};
use crate::job::{JobCounts, JobState, QueuedJob};
use crate::store::JobStore;
use chrono::{DateTime, TimeDelta, Utc};
use nodeflow_core::JobId;
use nodeflow_workflow::{WorkflowJob, WorkflowResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// A job claimed by a worker for one attempt.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    /// The job as stored at claim time, already active.
    pub job: QueuedJob,
    /// Cancelled when the job is removed mid-attempt.
    pub cancel: CancellationToken,
}

/// What happened to an attempt once its outcome was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The job is completed.
    Completed,
    /// Another attempt is scheduled after the delay.
    RetryScheduled { retry_in: Duration },
    /// Attempts are exhausted; the job is failed.
    Failed,
    /// The job was removed or changed underneath the attempt; nothing was
    /// written.
    Abandoned,
}

/// Jobs settled by [`JobQueue::recover`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveredJobs {
    /// Interrupted jobs put back to waiting.
    pub requeued: u64,
    /// Interrupted jobs that had used their last attempt.
    pub failed: u64,
}

/// Durable, retryable queue of workflow jobs.
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    config: QueueConfig,
    observers: Vec<Arc<dyn JobObserver>>,
    in_flight: Mutex<HashMap<JobId, CancellationToken>>,
    wake: Notify,
}

impl JobQueue {
    /// Creates a queue over `store`.
    pub fn new(store: Arc<dyn JobStore>, config: QueueConfig) -> Self {
        Self {
            store,
            config,
            observers: Vec::new(),
            in_flight: Mutex::new(HashMap::new()),
            wake: Notify::new(),
        }
    }

    /// Registers an observer for queue events.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Returns the queue configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn emit(&self, event: JobEvent) {
        for observer in &self.observers {
            observer.notify(&event);
        }
    }

    /// Accepts a job in the waiting state and returns its queue ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    #[instrument(skip_all, fields(workflow_id = %job.workflow_id))]
    pub async fn enqueue(&self, job: WorkflowJob) -> Result<JobId, QueueError> {
        let queued = QueuedJob::new(
            job,
            self.config.max_attempts,
            self.config.backoff(),
            Utc::now(),
        );
        self.store.insert(&queued).await?;

        self.emit(JobEvent::Enqueued {
            id: queued.id,
            workflow_id: queued.data.workflow_id.clone(),
        });
        self.wake.notify_one();
        Ok(queued.id)
    }

    /// Gets a job by ID.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] if no such job exists.
    pub async fn get(&self, id: JobId) -> Result<QueuedJob, QueueError> {
        self.store
            .get(id)
            .await?
            .ok_or(QueueError::NotFound { id })
    }

    /// Lists jobs in `state` at positions `start..=end`, both inclusive.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub async fn list(
        &self,
        state: JobState,
        start: usize,
        end: usize,
    ) -> Result<Vec<QueuedJob>, QueueError> {
        Ok(self.store.list(state, start, end).await?)
    }

    /// Counts jobs per state.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub async fn counts(&self) -> Result<JobCounts, QueueError> {
        Ok(self.store.counts().await?)
    }

    /// Puts a failed job back to waiting for one more attempt.
    ///
    /// The new attempt re-runs every node from the first. Does nothing if
    /// the job does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotRetryable`] if the job is not failed.
    #[instrument(skip(self))]
    pub async fn retry(&self, id: JobId) -> Result<(), QueueError> {
        let Some(mut job) = self.store.get(id).await? else {
            debug!(job_id = %id, "retry of missing job ignored");
            return Ok(());
        };
        if job.state != JobState::Failed {
            return Err(QueueError::NotRetryable {
                id,
                state: job.state,
            });
        }

        job.state = JobState::Waiting;
        job.max_attempts = job.max_attempts.max(job.attempts_made + 1);
        job.progress = 0;
        job.result = None;
        job.failed_reason = None;
        job.started_at = None;
        job.finished_at = None;
        job.run_at = None;

        if !self.store.replace(&job, JobState::Failed).await? {
            return match self.store.get(id).await? {
                None => Ok(()),
                Some(current) => Err(QueueError::NotRetryable {
                    id,
                    state: current.state,
                }),
            };
        }

        self.emit(JobEvent::Retried { id });
        self.wake.notify_one();
        Ok(())
    }

    /// Deletes a job and its result, cancelling an in-flight attempt.
    ///
    /// Removing a missing job is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: JobId) -> Result<(), QueueError> {
        if let Some(token) = self.in_flight.lock().await.remove(&id) {
            token.cancel();
        }
        if self.store.delete(id).await? {
            self.emit(JobEvent::Removed { id });
        }
        Ok(())
    }

    /// Deletes completed and failed jobs that finished more than `max_age`
    /// ago, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    #[instrument(skip(self))]
    pub async fn clean(&self, max_age: Duration) -> Result<u64, QueueError> {
        let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let removed = self.store.delete_finished_before(cutoff).await?;
        let count = removed.len() as u64;
        if count > 0 {
            self.emit(JobEvent::Cleaned { count });
        }
        Ok(count)
    }

    /// Settles jobs left active by a previous process.
    ///
    /// The interrupted attempt counts: jobs with attempts left go back to
    /// waiting, the rest are failed. Call once on startup, before any worker
    /// claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> Result<RecoveredJobs, QueueError> {
        let jobs = self.store.recover_active(Utc::now()).await?;

        let mut recovered = RecoveredJobs::default();
        for job in jobs {
            if job.state == JobState::Failed {
                recovered.failed += 1;
                self.emit(JobEvent::Failed {
                    id: job.id,
                    reason: job.failed_reason.unwrap_or_default(),
                    attempts_made: job.attempts_made,
                    retry_in: None,
                });
            } else {
                recovered.requeued += 1;
            }
        }
        if recovered.requeued > 0 {
            self.wake.notify_one();
        }
        Ok(recovered)
    }

    /// Claims the next due job for an attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub async fn claim(&self) -> Result<Option<ClaimedJob>, QueueError> {
        loop {
            let Some(job) = self.store.claim_next(Utc::now()).await? else {
                return Ok(None);
            };

            let cancel = CancellationToken::new();
            self.in_flight.lock().await.insert(job.id, cancel.clone());

            // A remove between claim_next and the insert found no token to
            // cancel, so look again now that one is registered.
            match self.store.get(job.id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    self.release(job.id).await;
                    cancel.cancel();
                    debug!(job_id = %job.id, "claimed job removed before its attempt");
                    continue;
                }
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "could not recheck claimed job");
                }
            }

            self.emit(JobEvent::Active {
                id: job.id,
                attempt: job.attempts_made,
            });
            return Ok(Some(ClaimedJob { job, cancel }));
        }
    }

    /// Waits until new work may be available or `poll_interval` elapses.
    pub async fn wait_for_work(&self) {
        tokio::select! {
            () = self.wake.notified() => {}
            () = tokio::time::sleep(self.config.poll_interval()) => {}
        }
    }

    /// Records progress of an active attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub async fn report_progress(&self, id: JobId, percent: u8) -> Result<(), QueueError> {
        if self.store.set_progress(id, percent).await? {
            self.emit(JobEvent::Progress { id, percent });
        }
        Ok(())
    }

    /// Records the result of an attempt.
    ///
    /// A successful run completes the job; a failed run is handled like
    /// [`JobQueue::fail_attempt`] with the run's error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read or write fails.
    #[instrument(skip_all, fields(job_id = %id))]
    pub async fn finish_attempt(
        &self,
        id: JobId,
        result: WorkflowResult,
    ) -> Result<AttemptOutcome, QueueError> {
        if !result.is_success() {
            let reason = result
                .error
                .clone()
                .unwrap_or_else(|| "workflow run failed".to_string());
            return self.fail_attempt(id, reason, Some(result)).await;
        }

        let Some(mut job) = self.active_job(id).await? else {
            return Ok(AttemptOutcome::Abandoned);
        };
        job.state = JobState::Completed;
        job.progress = 100;
        job.result = Some(result);
        job.failed_reason = None;
        job.finished_at = Some(Utc::now());

        if !self.store.replace(&job, JobState::Active).await? {
            return Ok(AttemptOutcome::Abandoned);
        }
        self.emit(JobEvent::Completed {
            id,
            attempts_made: job.attempts_made,
        });
        Ok(AttemptOutcome::Completed)
    }

    /// Records a failed attempt.
    ///
    /// If attempts remain the job is delayed by the backoff policy;
    /// otherwise it is permanently failed until retried by a caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read or write fails.
    #[instrument(skip_all, fields(job_id = %id))]
    pub async fn fail_attempt(
        &self,
        id: JobId,
        reason: String,
        result: Option<WorkflowResult>,
    ) -> Result<AttemptOutcome, QueueError> {
        let Some(mut job) = self.active_job(id).await? else {
            return Ok(AttemptOutcome::Abandoned);
        };

        let now = Utc::now();
        let retry_in = job
            .has_attempts_left()
            .then(|| job.backoff.delay_after(job.attempts_made));
        match retry_in {
            Some(delay) => {
                job.state = JobState::Delayed;
                let delay = TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX);
                job.run_at = Some(now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC));
            }
            None => {
                job.state = JobState::Failed;
                job.finished_at = Some(now);
            }
        }
        job.result = result;
        job.failed_reason = Some(reason.clone());

        if !self.store.replace(&job, JobState::Active).await? {
            return Ok(AttemptOutcome::Abandoned);
        }
        self.emit(JobEvent::Failed {
            id,
            reason,
            attempts_made: job.attempts_made,
            retry_in,
        });
        Ok(match retry_in {
            Some(retry_in) => AttemptOutcome::RetryScheduled { retry_in },
            None => AttemptOutcome::Failed,
        })
    }

    /// Forgets the cancellation token of an attempt that ended without
    /// recording an outcome.
    pub async fn release(&self, id: JobId) {
        self.in_flight.lock().await.remove(&id);
    }

    /// Loads a job for an outcome write, releasing its attempt token.
    async fn active_job(&self, id: JobId) -> Result<Option<QueuedJob>, QueueError> {
        self.release(id).await;
        Ok(self
            .store
            .get(id)
            .await?
            .filter(|job| job.state == JobState::Active))
    }
}
