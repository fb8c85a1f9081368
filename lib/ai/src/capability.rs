//! The AI capability contract consumed by `ai-node` steps.

use crate::backend::{ChatRole, LlmBackend, LlmRequest};
use crate::error::AiError;
use crate::function::AiFunction;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Instant;
use tracing::{debug, instrument};

/// Model used when a request does not name one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Sampling temperature used when a request does not set one.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Output token limit used when a request does not set one.
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// A request to execute an AI function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiRequest {
    /// The function to execute.
    pub function: AiFunction,
    /// The text the function operates on.
    pub input: String,
    /// Instruction for [`AiFunction::Custom`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
    /// Model override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Sampling temperature, 0 to 2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Output token limit, 1 to 4096.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl AiRequest {
    /// Creates a request with default model parameters.
    #[must_use]
    pub fn new(function: AiFunction, input: impl Into<String>) -> Self {
        Self {
            function,
            input: input.into(),
            custom_prompt: None,
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Checks the numeric parameters against their accepted ranges.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::InvalidRequest`] naming the first offending field.
    pub fn validate(&self) -> Result<(), AiError> {
        if let Some(temperature) = self.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(AiError::InvalidRequest {
                field: "temperature".to_string(),
                reason: format!("{temperature} is outside 0..=2"),
            });
        }
        if let Some(max_tokens) = self.max_tokens
            && !(1..=4096).contains(&max_tokens)
        {
            return Err(AiError::InvalidRequest {
                field: "maxTokens".to_string(),
                reason: format!("{max_tokens} is outside 1..=4096"),
            });
        }
        Ok(())
    }
}

/// The outcome of an AI function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiResponse {
    /// Raw text produced by the model.
    pub result: String,
    /// The function that was executed.
    pub function: AiFunction,
    /// The model that served the request.
    pub model: String,
    /// Total tokens consumed.
    pub tokens_used: u32,
    /// Wall-clock time of the call.
    pub execution_time_ms: u64,
    /// `result` parsed as JSON when it looks like an object or array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<JsonValue>,
}

/// Trait for services that execute AI functions.
///
/// The workflow engine depends only on this trait; the implementation
/// decides which model provider serves the request.
#[async_trait]
pub trait AiCapability: Send + Sync {
    /// Executes the requested AI function.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is invalid or the provider fails.
    async fn execute(&self, request: AiRequest) -> Result<AiResponse, AiError>;
}

/// Parses model output as JSON when it looks like JSON.
///
/// Only text whose trimmed form starts with `{` or `[` is attempted, and a
/// parse failure yields `None` rather than an error.
#[must_use]
pub fn parse_structured_data(text: &str) -> Option<JsonValue> {
    let trimmed = text.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// An [`AiCapability`] backed by an [`LlmBackend`].
///
/// Selects the system instruction for the requested function, applies the
/// default model parameters and enriches the response with structured data.
pub struct LlmCapability<B: LlmBackend> {
    backend: B,
    default_model: String,
}

impl<B: LlmBackend> LlmCapability<B> {
    /// Creates a capability using [`DEFAULT_MODEL`].
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Overrides the model used when requests do not name one.
    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    fn build_request(&self, request: &AiRequest) -> LlmRequest {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let system = request
            .function
            .system_instruction(request.custom_prompt.as_deref());

        LlmRequest::new(
            model,
            request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        )
        .message(ChatRole::System, system)
        .message(ChatRole::User, request.input.clone())
    }
}

#[async_trait]
impl<B: LlmBackend> AiCapability for LlmCapability<B> {
    #[instrument(skip_all, fields(function = %request.function))]
    async fn execute(&self, request: AiRequest) -> Result<AiResponse, AiError> {
        request.validate()?;

        let started = Instant::now();
        let llm_request = self.build_request(&request);
        let response = self.backend.complete(&llm_request).await?;
        let tokens_used = response.usage.total();

        debug!(model = %response.model, tokens_used, "AI function executed");

        Ok(AiResponse {
            structured_data: parse_structured_data(&response.content),
            result: response.content,
            function: request.function,
            model: response.model,
            tokens_used,
            execution_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LlmResponse, TokenUsage};
    use crate::error::LlmError;
    use std::sync::Mutex;

    /// Backend that records requests and answers with a fixed reply.
    struct RecordingBackend {
        reply: Result<String, LlmError>,
        seen: Mutex<Vec<LlmRequest>>,
    }

    impl RecordingBackend {
        fn replying(content: &str) -> Self {
            Self {
                reply: Ok(content.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(error: LlmError) -> Self {
            Self {
                reply: Err(error),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn last_request(&self) -> LlmRequest {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl LlmBackend for RecordingBackend {
        async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
            self.seen.lock().unwrap().push(request.clone());
            let content = self.reply.clone()?;
            Ok(LlmResponse {
                content,
                usage: TokenUsage {
                    prompt_tokens: 12,
                    completion_tokens: 30,
                },
                model: request.model.clone(),
            })
        }
    }

    #[test]
    fn structured_data_parses_objects_and_arrays() {
        assert_eq!(
            parse_structured_data(r#" {"priority": "high"} "#),
            Some(serde_json::json!({"priority": "high"}))
        );
        assert_eq!(
            parse_structured_data("[1, 2]"),
            Some(serde_json::json!([1, 2]))
        );
    }

    #[test]
    fn structured_data_ignores_prose_and_broken_json() {
        assert_eq!(parse_structured_data("The customer is happy."), None);
        assert_eq!(parse_structured_data("{not json"), None);
        assert_eq!(parse_structured_data("42"), None);
    }

    #[test]
    fn validate_rejects_out_of_range_parameters() {
        let mut request = AiRequest::new(AiFunction::Summarize, "text");
        request.temperature = Some(2.5);
        assert!(matches!(
            request.validate(),
            Err(AiError::InvalidRequest { field, .. }) if field == "temperature"
        ));

        request.temperature = Some(2.0);
        request.max_tokens = Some(0);
        assert!(matches!(
            request.validate(),
            Err(AiError::InvalidRequest { field, .. }) if field == "maxTokens"
        ));

        request.max_tokens = Some(4096);
        assert!(request.validate().is_ok());
    }

    #[tokio::test]
    async fn applies_defaults_and_system_instruction() {
        let capability = LlmCapability::new(RecordingBackend::replying("Short summary."));
        let response = capability
            .execute(AiRequest::new(AiFunction::Summarize, "long text"))
            .await
            .unwrap();

        let sent = capability.backend.last_request();
        assert_eq!(sent.model, DEFAULT_MODEL);
        assert_eq!(sent.content_of(ChatRole::User), Some("long text"));
        assert_eq!(sent.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(sent.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(sent.content_of(ChatRole::System).unwrap().contains("2-3 sentences"));

        assert_eq!(response.result, "Short summary.");
        assert_eq!(response.tokens_used, 42);
        assert_eq!(response.function, AiFunction::Summarize);
        assert!(response.structured_data.is_none());
    }

    #[tokio::test]
    async fn custom_function_uses_caller_instruction() {
        let capability = LlmCapability::new(RecordingBackend::replying(r#"{"facts": []}"#))
            .with_default_model("local-model");
        let mut request = AiRequest::new(AiFunction::Custom, "notes");
        request.custom_prompt = Some("List the facts.".to_string());

        let response = capability.execute(request).await.unwrap();

        let sent = capability.backend.last_request();
        assert_eq!(sent.content_of(ChatRole::System), Some("List the facts."));
        assert_eq!(sent.model, "local-model");
        assert_eq!(response.structured_data, Some(serde_json::json!({"facts": []})));
    }

    #[tokio::test]
    async fn backend_errors_propagate() {
        let capability = LlmCapability::new(RecordingBackend::failing(LlmError::Timeout));
        let err = capability
            .execute(AiRequest::new(AiFunction::Classify, "text"))
            .await
            .unwrap_err();
        assert_eq!(err, AiError::Backend(LlmError::Timeout));
    }

    #[tokio::test]
    async fn invalid_request_never_reaches_backend() {
        let capability = LlmCapability::new(RecordingBackend::replying("unused"));
        let mut request = AiRequest::new(AiFunction::Classify, "text");
        request.max_tokens = Some(10_000);

        assert!(capability.execute(request).await.is_err());
        assert!(capability.backend.seen.lock().unwrap().is_empty());
    }
}
