//! Chat-completion backend seam.
//!
//! [`LlmCapability`](crate::LlmCapability) renders every AI function as a
//! two-message conversation (system instruction, then the input text) and
//! hands it to an [`LlmBackend`]. Provider clients live outside this crate.

use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message of a chat-completion conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// A fully resolved chat-completion call.
///
/// Sampling parameters are always set; defaults are applied before the
/// request is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmRequest {
    /// Starts a request for `model` with no messages.
    #[must_use]
    pub fn new(model: impl Into<String>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            temperature,
            max_tokens,
        }
    }

    /// Appends a message.
    #[must_use]
    pub fn message(mut self, role: ChatRole, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
        });
        self
    }

    /// Returns the content of the first message with `role`.
    pub fn content_of(&self, role: ChatRole) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == role)
            .map(|m| m.content.as_str())
    }
}

/// The first choice of a chat completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    /// Model the provider reports having used.
    pub model: String,
    pub usage: TokenUsage,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Prompt plus completion tokens, saturating.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// A chat-completion provider.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Runs one completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unreachable, rejects the call or
    /// answers with something unparseable.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;
}
