//! Error types for the workflow crate.
//!
//! `NodeExecutionError` is the only error a run produces, and it never
//! escapes the run: the runner records it in the failing node's
//! `NodeResult` and in the run's top-level `error`.

use nodeflow_ai::AiError;
use std::fmt;

/// Errors from executing a single node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeExecutionError {
    /// A config field the node reads is missing or malformed.
    InvalidConfig { field: String, reason: String },
    /// A context key named by the config is absent.
    MissingInput { field: String },
    /// The AI capability returned an error.
    Ai { message: String },
    /// The AI capability did not answer in time.
    Timeout { after_ms: u64 },
}

impl fmt::Display for NodeExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { field, reason } => {
                write!(f, "invalid config field '{field}': {reason}")
            }
            Self::MissingInput { field } => {
                write!(f, "input field '{field}' not found in context")
            }
            Self::Ai { message } => write!(f, "AI execution failed: {message}"),
            Self::Timeout { after_ms } => write!(f, "AI call timed out after {after_ms}ms"),
        }
    }
}

impl std::error::Error for NodeExecutionError {}

impl From<AiError> for NodeExecutionError {
    fn from(e: AiError) -> Self {
        Self::Ai {
            message: e.to_string(),
        }
    }
}
