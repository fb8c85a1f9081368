//! AI capability for nodeflow's `ai-node` steps.
//!
//! This crate provides:
//!
//! - **AiCapability**: the narrow contract the workflow engine calls
//! - **AiFunction**: the fixed set of AI functions and their system instructions
//! - **LlmCapability**: an `AiCapability` built on any `LlmBackend`
//!
//! Concrete model providers live behind `LlmBackend` and are supplied by the
//! embedding application.

pub mod backend;
pub mod capability;
pub mod error;
pub mod function;

pub use backend::{ChatMessage, ChatRole, LlmBackend, LlmRequest, LlmResponse, TokenUsage};
pub use capability::{AiCapability, AiRequest, AiResponse, LlmCapability, parse_structured_data};
pub use error::{AiError, LlmError};
pub use function::{AiFunction, UnknownFunction};
