//! Error types for the AI crate.
//!
//! - `LlmError`: Low-level LLM backend operations
//! - `AiError`: Capability-level failures surfaced to the `ai-node` step

use std::fmt;

/// Failures reported by an [`LlmBackend`](crate::LlmBackend).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// The provider could not be reached.
    Unreachable { provider: String, reason: String },
    /// The provider refused the call, e.g. bad credentials or model name.
    Rejected { status: u16, message: String },
    /// The completion came back without usable content.
    MalformedResponse { reason: String },
    /// No answer within the provider's own deadline.
    Timeout,
    /// Throttled by the provider.
    RateLimited { retry_after_secs: Option<u64> },
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable { provider, reason } => {
                write!(f, "LLM provider '{provider}' unreachable: {reason}")
            }
            Self::Rejected { status, message } => {
                write!(f, "LLM provider rejected the request ({status}): {message}")
            }
            Self::MalformedResponse { reason } => {
                write!(f, "malformed completion: {reason}")
            }
            Self::Timeout => write!(f, "LLM request timed out"),
            Self::RateLimited {
                retry_after_secs: Some(secs),
            } => write!(f, "rate limited, retry after {secs}s"),
            Self::RateLimited {
                retry_after_secs: None,
            } => write!(f, "rate limited"),
        }
    }
}

impl std::error::Error for LlmError {}

/// Errors from the AI capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiError {
    /// A request field is outside its accepted range.
    InvalidRequest { field: String, reason: String },
    /// No backend is configured to serve requests.
    Unavailable { reason: String },
    /// The backend call failed.
    Backend(LlmError),
}

impl fmt::Display for AiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest { field, reason } => {
                write!(f, "invalid AI request field '{field}': {reason}")
            }
            Self::Unavailable { reason } => write!(f, "AI capability unavailable: {reason}"),
            Self::Backend(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for AiError {}

impl From<LlmError> for AiError {
    fn from(e: LlmError) -> Self {
        Self::Backend(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_display_includes_status() {
        let err = LlmError::Rejected {
            status: 401,
            message: "invalid api key".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "LLM provider rejected the request (401): invalid api key"
        );
    }

    #[test]
    fn rate_limited_display() {
        let err = LlmError::RateLimited {
            retry_after_secs: Some(30),
        };
        assert_eq!(err.to_string(), "rate limited, retry after 30s");
    }

    #[test]
    fn ai_error_wraps_backend_message() {
        let err = AiError::from(LlmError::Timeout);
        assert_eq!(err.to_string(), "LLM request timed out");
    }

    #[test]
    fn invalid_request_display() {
        let err = AiError::InvalidRequest {
            field: "temperature".to_string(),
            reason: "must be between 0 and 2".to_string(),
        };
        assert!(err.to_string().contains("temperature"));
    }
}
