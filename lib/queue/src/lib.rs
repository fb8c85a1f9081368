//! Durable job queue for nodeflow workflow runs.
//!
//! This crate provides:
//!
//! - **QueuedJob**: the wrapper tracking a workflow job across attempts
//! - **JobStore**: persistence with in-memory and SQLite backends
//! - **JobQueue**: enqueue, inspection, retry with exponential backoff,
//!   removal and age-based cleanup
//! - **JobEvent**: lifecycle notifications for observers

pub mod config;
pub mod error;
pub mod events;
pub mod job;
pub mod memory;
pub mod queue;
pub mod sqlite;
pub mod store;

pub use config::QueueConfig;
pub use error::{QueueError, StoreError};
pub use events::{ChannelObserver, JobEvent, JobObserver, TracingObserver};
pub use job::{BackoffPolicy, INTERRUPTED_REASON, JobCounts, JobState, QueuedJob};
pub use memory::MemoryJobStore;
pub use queue::{AttemptOutcome, ClaimedJob, JobQueue, RecoveredJobs};
pub use sqlite::SqliteJobStore;
pub use store::JobStore;
