//! Queue lifecycle events and observers.
//!
//! The queue emits an event after every state transition it commits.
//! Observers decide what to do with them (log, count, forward).

use nodeflow_core::JobId;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Events emitted by the job queue.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// A job was accepted.
    Enqueued { id: JobId, workflow_id: String },
    /// A worker claimed the job for an attempt.
    Active { id: JobId, attempt: u32 },
    /// The current attempt advanced.
    Progress { id: JobId, percent: u8 },
    /// An attempt succeeded; the job is finished.
    Completed { id: JobId, attempts_made: u32 },
    /// An attempt failed. `retry_in` is set when another attempt is scheduled.
    Failed {
        id: JobId,
        reason: String,
        attempts_made: u32,
        retry_in: Option<Duration>,
    },
    /// A failed job was put back to waiting on request.
    Retried { id: JobId },
    /// A job was deleted.
    Removed { id: JobId },
    /// Age-based cleanup deleted finished jobs.
    Cleaned { count: u64 },
}

/// Trait for receiving queue events.
pub trait JobObserver: Send + Sync {
    /// Called after a state transition has been stored.
    fn notify(&self, event: &JobEvent);
}

/// An observer that logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl JobObserver for TracingObserver {
    fn notify(&self, event: &JobEvent) {
        match event {
            JobEvent::Enqueued { id, workflow_id } => {
                info!(job_id = %id, %workflow_id, "job enqueued");
            }
            JobEvent::Active { id, attempt } => {
                info!(job_id = %id, attempt, "job active");
            }
            JobEvent::Progress { id, percent } => {
                debug!(job_id = %id, percent, "job progress");
            }
            JobEvent::Completed { id, attempts_made } => {
                info!(job_id = %id, attempts_made, "job completed");
            }
            JobEvent::Failed {
                id,
                reason,
                attempts_made,
                retry_in: Some(delay),
            } => {
                warn!(
                    job_id = %id,
                    attempts_made,
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    %reason,
                    "job attempt failed, retry scheduled"
                );
            }
            JobEvent::Failed {
                id,
                reason,
                attempts_made,
                retry_in: None,
            } => {
                error!(job_id = %id, attempts_made, %reason, "job failed");
            }
            JobEvent::Retried { id } => info!(job_id = %id, "job retried"),
            JobEvent::Removed { id } => info!(job_id = %id, "job removed"),
            JobEvent::Cleaned { count } => info!(count, "finished jobs cleaned"),
        }
    }
}

/// An observer that forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<JobEvent>,
}

impl ChannelObserver {
    /// Creates an observer sending into `sender`.
    pub fn new(sender: mpsc::UnboundedSender<JobEvent>) -> Self {
        Self { sender }
    }
}

impl JobObserver for ChannelObserver {
    fn notify(&self, event: &JobEvent) {
        // The receiver may have been dropped.
        let _ = self.sender.send(event.clone());
    }
}
