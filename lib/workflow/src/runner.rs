//! Sequential workflow runs.
//!
//! The runner walks a job's nodes in array order, merging each output
//! fragment into the context, and stops at the first failing node. Node
//! errors are captured in the returned [`WorkflowResult`]; a run always
//! completes unless it is cancelled between nodes.

use crate::executor::NodeExecutor;
use crate::model::{
    Context, NodeResult, NodeSpec, NodeStatus, RunStatus, WorkflowJob, WorkflowResult, millis,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Receives progress percentages as a run advances.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    /// Called after every processed node with a value in `0..=100`.
    async fn report(&self, percent: u8);
}

/// A reporter that discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

#[async_trait]
impl ProgressReporter for NoopProgress {
    async fn report(&self, _percent: u8) {}
}

/// Drives one workflow job through a [`NodeExecutor`].
pub struct WorkflowRunner<E: NodeExecutor> {
    executor: E,
}

impl<E: NodeExecutor> WorkflowRunner<E> {
    /// Creates a runner over the given executor.
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    /// Runs every node of `job` until completion or the first failure.
    #[instrument(skip_all, fields(workflow_id = %job.workflow_id, nodes = job.nodes.len()))]
    pub async fn run(&self, job: &WorkflowJob, progress: &dyn ProgressReporter) -> WorkflowResult {
        let mut state = RunState::new(job);
        for node in &job.nodes {
            if !state.step(&self.executor, node, progress).await {
                break;
            }
        }
        state.finish()
    }

    /// Runs `job`, checking `cancel` before each node.
    ///
    /// Returns `None` if the run was cancelled; the node in flight when
    /// cancellation was requested is allowed to finish.
    #[instrument(skip_all, fields(workflow_id = %job.workflow_id, nodes = job.nodes.len()))]
    pub async fn run_until_cancelled(
        &self,
        job: &WorkflowJob,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Option<WorkflowResult> {
        let mut state = RunState::new(job);
        for node in &job.nodes {
            if cancel.is_cancelled() {
                warn!(node_id = %node.id, "run cancelled before node");
                return None;
            }
            if !state.step(&self.executor, node, progress).await {
                break;
            }
        }
        Some(state.finish())
    }
}

/// Accumulated state of one run.
struct RunState<'a> {
    job: &'a WorkflowJob,
    started_at: DateTime<Utc>,
    run_started: Instant,
    context: Context,
    node_results: Vec<NodeResult>,
    error: Option<String>,
    succeeded: usize,
}

impl<'a> RunState<'a> {
    fn new(job: &'a WorkflowJob) -> Self {
        Self {
            job,
            started_at: Utc::now(),
            run_started: Instant::now(),
            context: job.input.clone(),
            node_results: Vec::with_capacity(job.nodes.len()),
            error: None,
            succeeded: 0,
        }
    }

    /// Executes one node and reports progress. Returns false once the run
    /// must stop.
    async fn step<E: NodeExecutor>(
        &mut self,
        executor: &E,
        node: &NodeSpec,
        progress: &dyn ProgressReporter,
    ) -> bool {
        let node_started = Instant::now();
        let input = self.context.clone();
        let outcome = executor.execute(node, &self.context).await;
        let execution_time_ms = millis(node_started.elapsed());

        let (status, output, error) = match outcome {
            Ok(output) => {
                for (key, value) in &output {
                    self.context.insert(key.clone(), value.clone());
                }
                self.succeeded += 1;
                debug!(node_id = %node.id, execution_time_ms, "node succeeded");
                (NodeStatus::Success, output, None)
            }
            Err(e) => {
                let message = e.to_string();
                warn!(node_id = %node.id, error = %message, "node failed");
                self.error = Some(format!("node {} failed: {message}", node.id));
                (NodeStatus::Failed, Context::new(), Some(message))
            }
        };

        self.node_results.push(NodeResult {
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            status,
            input,
            output,
            execution_time_ms,
            error,
        });

        progress
            .report(progress_percent(self.succeeded, self.job.nodes.len()))
            .await;

        self.error.is_none()
    }

    fn finish(self) -> WorkflowResult {
        let status = if self.error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Success
        };
        let duration_ms = millis(self.run_started.elapsed());
        info!(?status, duration_ms, "workflow run finished");

        WorkflowResult {
            workflow_id: self.job.workflow_id.clone(),
            status,
            started_at: self.started_at,
            completed_at: Utc::now(),
            duration_ms,
            node_results: self.node_results,
            final_output: self.context,
            error: self.error,
        }
    }
}

/// Percentage of nodes that succeeded, held below 100 until all have.
#[must_use]
pub fn progress_percent(succeeded: usize, total: usize) -> u8 {
    if total == 0 || succeeded >= total {
        return 100;
    }
    let percent = (succeeded as f64 / total as f64 * 100.0).round() as u8;
    percent.min(99)
}
