//! Worker pool pulling jobs from the queue and running them.
//!
//! Each worker claims one job at a time. The attempt runs in its own task so
//! a panicking node is recorded as a failed attempt instead of taking the
//! worker down. Shutdown stops claiming and lets in-flight attempts finish.

use async_trait::async_trait;
use nodeflow_core::JobId;
use nodeflow_queue::{AttemptOutcome, ClaimedJob, JobQueue};
use nodeflow_workflow::{NodeExecutor, ProgressReporter, WorkflowRunner};
use std::any::Any;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Forwards run progress to the queue record of one job.
struct QueueProgress {
    queue: Arc<JobQueue>,
    id: JobId,
}

#[async_trait]
impl ProgressReporter for QueueProgress {
    async fn report(&self, percent: u8) {
        if let Err(e) = self.queue.report_progress(self.id, percent).await {
            warn!(job_id = %self.id, error = %e, "failed to record progress");
        }
    }
}

/// Handle to a running pool of workers.
pub struct WorkerPool {
    shutdown: CancellationToken,
    tasks: JoinSet<()>,
}

impl WorkerPool {
    /// Starts `workers` workers over `queue`.
    pub fn spawn<E>(queue: Arc<JobQueue>, runner: Arc<WorkflowRunner<E>>, workers: usize) -> Self
    where
        E: NodeExecutor + 'static,
    {
        let shutdown = CancellationToken::new();
        let mut tasks = JoinSet::new();
        for index in 0..workers.max(1) {
            tasks.spawn(worker_loop(
                index,
                queue.clone(),
                runner.clone(),
                shutdown.clone(),
            ));
        }
        info!(workers = workers.max(1), "worker pool started");
        Self { shutdown, tasks }
    }

    /// Returns the token that stops the pool when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops claiming new jobs and waits for in-flight attempts.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker task ended abnormally");
            }
        }
        info!("worker pool stopped");
    }
}

async fn worker_loop<E>(
    index: usize,
    queue: Arc<JobQueue>,
    runner: Arc<WorkflowRunner<E>>,
    shutdown: CancellationToken,
) where
    E: NodeExecutor + 'static,
{
    debug!(worker = index, "worker started");
    while !shutdown.is_cancelled() {
        match queue.claim().await {
            Ok(Some(claimed)) => run_attempt(&queue, &runner, claimed).await,
            Ok(None) => {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = queue.wait_for_work() => {}
                }
            }
            Err(e) => {
                warn!(worker = index, error = %e, "failed to claim job");
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(queue.config().poll_interval()) => {}
                }
            }
        }
    }
    debug!(worker = index, "worker stopped");
}

async fn run_attempt<E>(queue: &Arc<JobQueue>, runner: &Arc<WorkflowRunner<E>>, claimed: ClaimedJob)
where
    E: NodeExecutor + 'static,
{
    let ClaimedJob { job, cancel } = claimed;
    let id = job.id;
    let progress = QueueProgress {
        queue: queue.clone(),
        id,
    };
    let runner = runner.clone();

    let attempt = tokio::spawn(async move {
        runner
            .run_until_cancelled(&job.data, &progress, &cancel)
            .await
    });

    let recorded = match attempt.await {
        Ok(Some(result)) => queue.finish_attempt(id, result).await,
        Ok(None) => {
            info!(job_id = %id, "attempt abandoned after removal");
            queue.release(id).await;
            return;
        }
        Err(e) => {
            let reason = format!("run aborted: {}", abort_reason(e));
            queue.fail_attempt(id, reason, None).await
        }
    };

    match recorded {
        Ok(AttemptOutcome::Abandoned) => {
            debug!(job_id = %id, "job changed during attempt, outcome discarded");
        }
        Ok(outcome) => debug!(job_id = %id, ?outcome, "attempt recorded"),
        Err(e) => error!(job_id = %id, error = %e, "failed to record attempt outcome"),
    }
}

fn abort_reason(e: JoinError) -> String {
    if e.is_panic() {
        panic_message(e.into_panic().as_ref())
    } else {
        e.to_string()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}
