//! Versioned envelope for persisted job payloads.
//!
//! Submitted jobs and run results outlive the process that wrote them, so
//! the store wraps them in an envelope carrying a format version. Readers
//! reject versions newer than they understand instead of misreading them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The current envelope version.
pub const CURRENT_VERSION: u32 = 1;

/// A versioned wrapper around a persisted payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// The version of the envelope format.
    pub version: u32,
    /// The wrapped payload.
    pub payload: T,
}

/// Errors from encoding or decoding an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The text is not a valid envelope for the payload type.
    Malformed { reason: String },
    /// The envelope was written by a newer format.
    UnsupportedVersion { version: u32 },
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { reason } => write!(f, "malformed envelope: {reason}"),
            Self::UnsupportedVersion { version } => {
                write!(
                    f,
                    "unsupported envelope version {version} (current is {CURRENT_VERSION})"
                )
            }
        }
    }
}

impl std::error::Error for EnvelopeError {}

impl<T> Envelope<T> {
    /// Creates a new envelope with the current version.
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self {
            version: CURRENT_VERSION,
            payload,
        }
    }

    /// Unwraps the envelope, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> T {
        self.payload
    }
}

/// Serializes a payload inside a current-version envelope.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn encode<T: Serialize>(payload: &T) -> Result<String, EnvelopeError> {
    serde_json::to_string(&Envelope::new(payload)).map_err(|e| EnvelopeError::Malformed {
        reason: e.to_string(),
    })
}

/// Deserializes a payload from an envelope, checking its version.
///
/// # Errors
///
/// Returns an error if the text is malformed or from a newer format.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, EnvelopeError> {
    let envelope: Envelope<serde_json::Value> =
        serde_json::from_str(text).map_err(|e| EnvelopeError::Malformed {
            reason: e.to_string(),
        })?;
    if envelope.version > CURRENT_VERSION {
        return Err(EnvelopeError::UnsupportedVersion {
            version: envelope.version,
        });
    }
    serde_json::from_value(envelope.payload).map_err(|e| EnvelopeError::Malformed {
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeSpec, NodeType, WorkflowJob};

    #[test]
    fn encoded_job_decodes() {
        let job = WorkflowJob::new("wf-1", "demo", vec![NodeSpec::new("t", NodeType::Trigger)]);
        let text = encode(&job).expect("encode");
        let decoded: WorkflowJob = decode(&text).expect("decode");
        assert_eq!(decoded, job);
    }

    #[test]
    fn version_sits_at_top_level() {
        let text = encode(&"payload").expect("encode");
        let json: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(json["version"], CURRENT_VERSION);
        assert_eq!(json["payload"], "payload");
    }

    #[test]
    fn rejects_newer_version() {
        let err = decode::<String>(r#"{"version": 99, "payload": "x"}"#).unwrap_err();
        assert_eq!(err, EnvelopeError::UnsupportedVersion { version: 99 });
    }

    #[test]
    fn rejects_malformed_text() {
        let err = decode::<String>("not json").unwrap_err();
        assert!(matches!(err, EnvelopeError::Malformed { .. }));
    }
}
