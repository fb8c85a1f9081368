//! Workflow execution for nodeflow.
//!
//! This crate provides the queue-agnostic half of the engine:
//!
//! - **Model**: workflow jobs, node specs and execution records
//! - **Condition**: the operator table behind `condition` nodes
//! - **Executor**: dispatch of one node against the current context
//! - **Runner**: sequential runs with progress reporting and cancellation
//! - **Envelope**: versioned wrapper for persisted payloads

pub mod condition;
pub mod config;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod model;
pub mod runner;

pub use config::RunnerConfig;
pub use envelope::{Envelope, EnvelopeError};
pub use error::NodeExecutionError;
pub use executor::{DefaultNodeExecutor, NodeExecutor};
pub use model::{
    Context, NodeResult, NodeSpec, NodeStatus, NodeType, RunStatus, WorkflowJob, WorkflowResult,
};
pub use runner::{NoopProgress, ProgressReporter, WorkflowRunner};
