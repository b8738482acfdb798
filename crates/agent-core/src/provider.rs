//! LLM Provider Strategy Pattern
//!
//! Defines the interface to the model-completion service. The orchestration
//! loop only talks to this trait, so tests can script responses and the
//! runtime crate can swap in a real HTTP client.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::{LlmProvider, ModelRequest};
//!
//! let request = ModelRequest::new("gpt-5", conversation.items().to_vec());
//! let response = provider.respond(&request).await?;
//! ```

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

use crate::error::Result;
use crate::message::ConversationItem;
use crate::tool::ToolCall;

/// JSON-schema constraint on the response text
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextFormat {
    /// Schema name reported to the provider
    pub name: String,

    /// JSON Schema the output must conform to
    pub schema: Value,

    /// Whether the provider must enforce the schema exactly
    pub strict: bool,
}

/// One call to the model-completion service
#[derive(Clone, Debug, PartialEq)]
pub struct ModelRequest {
    /// Model identifier (e.g., "gpt-5")
    pub model: String,

    /// Full ordered conversation history
    pub input: Vec<ConversationItem>,

    /// Function tool definitions; empty means no tools offered
    pub tools: Vec<Value>,

    /// Whether the model may emit several calls to run in parallel
    pub parallel_tool_calls: Option<bool>,

    /// Output token budget
    pub max_output_tokens: Option<u32>,

    /// Structured output constraint
    pub text_format: Option<TextFormat>,
}

impl ModelRequest {
    pub fn new(model: impl Into<String>, input: Vec<ConversationItem>) -> Self {
        Self {
            model: model.into(),
            input,
            tools: Vec::new(),
            parallel_tool_calls: None,
            max_output_tokens: None,
            text_format: None,
        }
    }

    /// Offer tools, one logical batch per turn
    pub fn with_tools(mut self, tools: Vec<Value>) -> Self {
        if !tools.is_empty() {
            self.tools = tools;
            self.parallel_tool_calls = Some(false);
        }
        self
    }

    pub const fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }

    pub fn with_text_format(mut self, format: TextFormat) -> Self {
        self.text_format = Some(format);
        self
    }
}

/// Token usage statistics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// A complete model response
#[derive(Clone, Debug, PartialEq)]
pub struct ModelResponse {
    /// Upstream response identifier
    pub id: String,

    /// Model that generated this response
    pub model: String,

    /// Output items in the order the model emitted them
    pub output: Vec<ConversationItem>,

    /// Concatenated assistant text
    pub output_text: String,

    /// Refusal text, when the model declined
    pub refusal: Option<String>,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,
}

impl ModelResponse {
    /// A plain text answer
    pub fn text(id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: id.into(),
            model: String::new(),
            output: vec![ConversationItem::ModelItem(serde_json::json!({
                "type": "message",
                "role": "assistant",
                "content": [{ "type": "output_text", "text": text }],
            }))],
            output_text: text,
            refusal: None,
            usage: None,
        }
    }

    /// A turn that only requests tools
    pub fn tool_calls(id: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            id: id.into(),
            model: String::new(),
            output: calls.into_iter().map(ConversationItem::FunctionCall).collect(),
            output_text: String::new(),
            refusal: None,
            usage: None,
        }
    }

    /// Whether the response carries a usable final answer
    pub fn has_text(&self) -> bool {
        !self.output_text.trim().is_empty()
    }

    /// Function calls in their original order
    pub fn function_calls(&self) -> Vec<ToolCall> {
        self.output
            .iter()
            .filter_map(|item| match item {
                ConversationItem::FunctionCall(call) => Some(call.clone()),
                ConversationItem::Message { .. }
                | ConversationItem::FunctionCallOutput { .. }
                | ConversationItem::ModelItem(_) => None,
            })
            .collect()
    }
}

/// Event from a streamed model response
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderEvent {
    /// `response.created`
    Created { response_id: String },

    /// `response.output_text.delta`
    OutputTextDelta { delta: String },

    /// `response.completed`, carrying the final response
    Completed(Box<ModelResponse>),

    /// `response.failed` or `error`
    Failed { message: String },
}

/// Stream type for streamed responses. Dropping it abandons the upstream call.
pub type ProviderEventStream = Pin<Box<dyn Stream<Item = Result<ProviderEvent>> + Send>>;

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new LLM backends.
/// The agent works exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logs and health output
    fn name(&self) -> &str;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Generate a complete response
    async fn respond(&self, request: &ModelRequest) -> Result<ModelResponse>;

    /// Generate a streamed response
    async fn respond_stream(&self, request: &ModelRequest) -> Result<ProviderEventStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_is_not_an_answer() {
        assert!(!ModelResponse::text("r1", "  \n ").has_text());
        assert!(ModelResponse::text("r1", "Shipped.").has_text());
    }

    #[test]
    fn test_function_calls_keep_order() {
        let response = ModelResponse::tool_calls(
            "r1",
            vec![
                ToolCall::new("c1", "get_order", "{}"),
                ToolCall::new("c2", "list_orders_by_email", "{}"),
            ],
        );
        let names: Vec<_> = response.function_calls().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["get_order", "list_orders_by_email"]);
    }

    #[test]
    fn test_tools_imply_sequential_calls() {
        let request = ModelRequest::new("gpt-5", Vec::new()).with_tools(vec![serde_json::json!({})]);
        assert_eq!(request.parallel_tool_calls, Some(false));

        let request = ModelRequest::new("gpt-5", Vec::new()).with_tools(Vec::new());
        assert_eq!(request.parallel_tool_calls, None);
    }
}
