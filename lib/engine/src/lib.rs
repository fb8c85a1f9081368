//! Workflow engine for nodeflow.
//!
//! Ties the durable job queue to the workflow runner:
//!
//! - **WorkflowEngine**: the facade callers use to submit and manage jobs
//! - **WorkerPool**: concurrent workers claiming and running queued jobs

pub mod engine;
pub mod worker;

pub use engine::WorkflowEngine;
pub use worker::WorkerPool;
