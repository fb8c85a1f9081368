//! Node execution.
//!
//! A [`NodeExecutor`] turns one node and the current context into an output
//! fragment. It knows nothing about queues or jobs; the runner merges the
//! fragment into the context.

use crate::condition;
use crate::config::RunnerConfig;
use crate::error::NodeExecutionError;
use crate::model::{Context, NodeSpec, NodeType};
use async_trait::async_trait;
use nodeflow_ai::{AiCapability, AiFunction, AiRequest};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Trait for node execution.
///
/// This abstraction allows testing the runner without real node
/// implementations.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Executes a node against the current context.
    ///
    /// Returns the fragment to merge into the context.
    async fn execute(
        &self,
        node: &NodeSpec,
        context: &Context,
    ) -> Result<Context, NodeExecutionError>;
}

/// Dispatches on [`NodeType`] to the built-in node implementations.
///
/// `ai-node` steps are delegated to an [`AiCapability`]; every other type is
/// handled locally.
pub struct DefaultNodeExecutor {
    ai: Arc<dyn AiCapability>,
    config: RunnerConfig,
}

impl DefaultNodeExecutor {
    /// Creates an executor with default runner settings.
    pub fn new(ai: Arc<dyn AiCapability>) -> Self {
        Self::with_config(ai, RunnerConfig::default())
    }

    /// Creates an executor with the given runner settings.
    pub fn with_config(ai: Arc<dyn AiCapability>, config: RunnerConfig) -> Self {
        Self { ai, config }
    }

    async fn run_ai_node(
        &self,
        config: &Context,
        context: &Context,
    ) -> Result<Context, NodeExecutionError> {
        let request = build_ai_request(config, context)?;
        let timeout = self.config.ai_timeout();

        let response = tokio::time::timeout(timeout, self.ai.execute(request))
            .await
            .map_err(|_| NodeExecutionError::Timeout {
                after_ms: self.config.ai_timeout_ms,
            })??;

        Ok(fragment(json!({
            "aiResult": response.result,
            "aiStructuredData": response.structured_data,
            "aiTokensUsed": response.tokens_used,
        })))
    }

    async fn run_delay(&self, config: &Context) -> Result<Context, NodeExecutionError> {
        // Any falsy delayMs, 0 included, means the default.
        let delay_ms = match config.get("delayMs") {
            value if !condition::is_truthy(value) => self.config.default_delay_ms,
            None => self.config.default_delay_ms,
            Some(value) => value
                .as_u64()
                .ok_or_else(|| invalid("delayMs", "expected a non-negative integer"))?,
        };

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        Ok(fragment(json!({ "delayed": true, "delayMs": delay_ms })))
    }
}

#[async_trait]
impl NodeExecutor for DefaultNodeExecutor {
    async fn execute(
        &self,
        node: &NodeSpec,
        context: &Context,
    ) -> Result<Context, NodeExecutionError> {
        debug!(node_id = %node.id, node_type = %node.node_type, "executing node");

        match &node.node_type {
            NodeType::Trigger => Ok(context.clone()),
            NodeType::AiNode => self.run_ai_node(&node.config, context).await,
            NodeType::Condition => Ok(fragment(json!({
                "conditionMet": condition::evaluate(&node.config, context),
            }))),
            NodeType::Delay => self.run_delay(&node.config).await,
            NodeType::Http => Ok(fragment(json!({ "httpResult": "Not implemented yet" }))),
            NodeType::Email => Ok(fragment(json!({
                "emailSent": false,
                "message": "Email node not configured",
            }))),
            NodeType::Slack => Ok(fragment(json!({
                "slackSent": false,
                "message": "Slack node not configured",
            }))),
            NodeType::Other(name) => {
                warn!(node_id = %node.id, node_type = %name, "unknown node type, passing context through");
                Ok(context.clone())
            }
        }
    }
}

/// Builds the AI request for an `ai-node` from its config.
///
/// Without `inputField` the whole context is serialized as the input.
fn build_ai_request(config: &Context, context: &Context) -> Result<AiRequest, NodeExecutionError> {
    let function: AiFunction = optional_str(config, "function")?
        .ok_or_else(|| invalid("function", "required"))?
        .parse()
        .map_err(|e: nodeflow_ai::UnknownFunction| invalid("function", e.to_string()))?;

    let input = match optional_str(config, "inputField")? {
        Some(field) => match context.get(field) {
            Some(JsonValue::String(text)) => text.clone(),
            Some(value) => value.to_string(),
            None => {
                return Err(NodeExecutionError::MissingInput {
                    field: field.to_string(),
                });
            }
        },
        None => JsonValue::Object(context.clone()).to_string(),
    };

    let mut request = AiRequest::new(function, input);
    request.custom_prompt = optional_str(config, "customPrompt")?.map(str::to_string);
    request.model = optional_str(config, "model")?.map(str::to_string);
    request.temperature = optional_f64(config, "temperature")?.map(|t| t as f32);
    request.max_tokens = optional_u64(config, "maxTokens")?
        .map(|n| u32::try_from(n).map_err(|_| invalid("maxTokens", "out of range")))
        .transpose()?;
    Ok(request)
}

fn optional_str<'a>(config: &'a Context, field: &str) -> Result<Option<&'a str>, NodeExecutionError> {
    match config.get(field) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s)),
        Some(_) => Err(invalid(field, "expected a string")),
    }
}

fn optional_f64(config: &Context, field: &str) -> Result<Option<f64>, NodeExecutionError> {
    match config.get(field) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| invalid(field, "expected a number")),
    }
}

fn optional_u64(config: &Context, field: &str) -> Result<Option<u64>, NodeExecutionError> {
    match config.get(field) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| invalid(field, "expected a non-negative integer")),
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> NodeExecutionError {
    NodeExecutionError::InvalidConfig {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn fragment(value: JsonValue) -> Context {
    match value {
        JsonValue::Object(map) => map,
        _ => Context::new(),
    }
}
