//! The durable wrapper around a submitted workflow job.

use chrono::{DateTime, Utc};
use nodeflow_core::JobId;
use nodeflow_workflow::{WorkflowJob, WorkflowResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Lifecycle state of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Ready to be claimed.
    Waiting,
    /// Owned by exactly one worker.
    Active,
    /// Finished with a successful run.
    Completed,
    /// Finished with every attempt failed.
    Failed,
    /// Waiting out a backoff before the next automatic attempt.
    Delayed,
}

impl JobState {
    /// All states.
    pub const ALL: [Self; 5] = [
        Self::Waiting,
        Self::Active,
        Self::Completed,
        Self::Failed,
        Self::Delayed,
    ];

    /// Returns the stored name of the state.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Delayed => "delayed",
        }
    }

    /// Returns true for states that age-based cleanup may remove.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown job state: {s}"))
    }
}

/// Exponential delay between automatic retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the second attempt, doubled for each later one.
    pub base_ms: u64,
}

impl BackoffPolicy {
    /// Creates an exponential policy with the given base.
    #[must_use]
    pub const fn exponential(base_ms: u64) -> Self {
        Self { base_ms }
    }

    /// Returns the delay to wait after `attempts_made` failed attempts.
    #[must_use]
    pub fn delay_after(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1).min(63);
        Duration::from_millis(self.base_ms.saturating_mul(1_u64 << exponent))
    }
}

/// Failure reason of a job whose last attempt was interrupted by a restart.
pub const INTERRUPTED_REASON: &str = "attempt interrupted by a restart";

/// A workflow job as tracked by the queue across its attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedJob {
    /// Queue-assigned identifier.
    pub id: JobId,
    pub state: JobState,
    /// Attempts started so far, counted when a worker claims the job.
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    /// Share of nodes completed by the current attempt, 0 to 100.
    pub progress: u8,
    /// The submitted job, kept for replay.
    pub data: WorkflowJob,
    /// Result of the latest finished attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<WorkflowResult>,
    /// Error of the latest failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// When a delayed job becomes due.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_at: Option<DateTime<Utc>>,
}

impl QueuedJob {
    /// Wraps a submitted job in the waiting state.
    #[must_use]
    pub fn new(
        data: WorkflowJob,
        max_attempts: u32,
        backoff: BackoffPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            state: JobState::Waiting,
            attempts_made: 0,
            max_attempts,
            backoff,
            progress: 0,
            data,
            result: None,
            failed_reason: None,
            enqueued_at: now,
            started_at: None,
            finished_at: None,
            run_at: None,
        }
    }

    /// Returns true if the job may be claimed at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            JobState::Waiting => true,
            JobState::Delayed => self.run_at.is_none_or(|run_at| run_at <= now),
            _ => false,
        }
    }

    /// Returns true if another automatic attempt is allowed.
    #[must_use]
    pub fn has_attempts_left(&self) -> bool {
        self.attempts_made < self.max_attempts
    }

    /// Moves the job into a fresh active attempt.
    ///
    /// Results of the previous attempt are discarded so the new run starts
    /// from the first node.
    pub fn begin_attempt(&mut self, now: DateTime<Utc>) {
        self.state = JobState::Active;
        self.attempts_made += 1;
        self.progress = 0;
        self.result = None;
        self.failed_reason = None;
        self.started_at = Some(now);
        self.finished_at = None;
        self.run_at = None;
    }

    /// Settles an attempt cut short by a process restart.
    ///
    /// The interrupted attempt counts against `max_attempts`, so a job that
    /// keeps taking the process down ends up failed instead of looping.
    pub fn recover_interrupted(&mut self, now: DateTime<Utc>) {
        if self.has_attempts_left() {
            self.state = JobState::Waiting;
            self.progress = 0;
            self.started_at = None;
        } else {
            self.state = JobState::Failed;
            self.failed_reason = Some(INTERRUPTED_REASON.to_string());
            self.finished_at = Some(now);
        }
    }

    /// Returns the ordering key used when claiming: due time, then ID.
    pub(crate) fn claim_key(&self) -> (DateTime<Utc>, JobId) {
        (self.run_at.unwrap_or(self.enqueued_at), self.id)
    }
}

/// Number of jobs in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
}

impl JobCounts {
    /// Returns the count for one state.
    #[must_use]
    pub fn get(&self, state: JobState) -> u64 {
        match state {
            JobState::Waiting => self.waiting,
            JobState::Active => self.active,
            JobState::Completed => self.completed,
            JobState::Failed => self.failed,
            JobState::Delayed => self.delayed,
        }
    }

    /// Adds `count` jobs to a state's tally.
    pub fn add(&mut self, state: JobState, count: u64) {
        let slot = match state {
            JobState::Waiting => &mut self.waiting,
            JobState::Active => &mut self.active,
            JobState::Completed => &mut self.completed,
            JobState::Failed => &mut self.failed,
            JobState::Delayed => &mut self.delayed,
        };
        *slot += count;
    }

    /// Returns the number of jobs across all states.
    #[must_use]
    pub fn total(&self) -> u64 {
        JobState::ALL.into_iter().map(|state| self.get(state)).sum()
    }
}
