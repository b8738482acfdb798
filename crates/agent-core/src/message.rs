//! Conversation Items
//!
//! The conversation buffer handed to every model call. Items are appended in
//! order and never rewritten; the provider needs the full history each turn.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::tool::ToolCall;

/// Role of an instruction or input message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Developer instructions
    Developer,
    /// User input
    User,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Developer => write!(f, "developer"),
            Self::User => write!(f, "user"),
        }
    }
}

/// A single entry in the conversation buffer
#[derive(Clone, Debug, PartialEq)]
pub enum ConversationItem {
    /// Developer or user message
    Message { role: Role, content: String },

    /// Tool call emitted by the model
    FunctionCall(ToolCall),

    /// Result of a dispatched tool call, serialized as a JSON string
    FunctionCallOutput { call_id: String, output: String },

    /// Any other model-emitted item (assistant message, reasoning), kept verbatim
    ModelItem(Value),
}

impl ConversationItem {
    pub fn developer(content: impl Into<String>) -> Self {
        Self::Message {
            role: Role::Developer,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::Message {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::FunctionCallOutput {
            call_id: call_id.into(),
            output: output.into(),
        }
    }

    /// Classify a raw output item returned by the provider.
    ///
    /// A `function_call` that cannot be read as a [`ToolCall`] is dropped:
    /// it could never be answered, and an unanswered call makes the next
    /// request invalid.
    pub fn from_output(raw: Value) -> Option<Self> {
        if raw.get("type").and_then(Value::as_str) == Some("function_call") {
            return match serde_json::from_value::<ToolCall>(raw) {
                Ok(call) => Some(Self::FunctionCall(call)),
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed function_call item");
                    None
                }
            };
        }
        Some(Self::ModelItem(raw))
    }

    /// Encode as a Responses API input item
    pub fn to_input(&self) -> Value {
        match self {
            Self::Message { role, content } => json!({
                "role": role,
                "content": content,
            }),
            Self::FunctionCall(call) => {
                let mut item = json!({
                    "type": "function_call",
                    "call_id": call.call_id,
                    "name": call.name,
                    "arguments": call.arguments,
                });
                if let Some(id) = &call.id {
                    item["id"] = json!(id);
                }
                item
            }
            Self::FunctionCallOutput { call_id, output } => json!({
                "type": "function_call_output",
                "call_id": call_id,
                "output": output,
            }),
            Self::ModelItem(raw) => raw.clone(),
        }
    }
}

/// Append-only conversation history
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    items: Vec<ConversationItem>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Developer instructions followed by the user's question
    pub fn with_prompt(developer: impl Into<String>, question: impl Into<String>) -> Self {
        let mut conv = Self::new();
        conv.push(ConversationItem::developer(developer));
        conv.push(ConversationItem::user(question));
        conv
    }

    /// Add an item
    pub fn push(&mut self, item: ConversationItem) {
        self.items.push(item);
    }

    /// Add a batch of items, preserving their order
    pub fn extend(&mut self, items: impl IntoIterator<Item = ConversationItem>) {
        self.items.extend(items);
    }

    /// Get all items
    pub fn items(&self) -> &[ConversationItem] {
        &self.items
    }

    /// Get the last item
    pub fn last(&self) -> Option<&ConversationItem> {
        self.items.last()
    }

    /// Call ids of function calls that have no matching output yet
    pub fn unanswered_calls(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|item| match item {
                ConversationItem::FunctionCall(call) => Some(call.call_id.as_str()),
                _ => None,
            })
            .filter(|call_id| {
                !self.items.iter().any(|item| {
                    matches!(
                        item,
                        ConversationItem::FunctionCallOutput { call_id: answered, .. } if answered == call_id
                    )
                })
            })
            .collect()
    }

    /// Encode the whole buffer as Responses API input
    pub fn to_input(&self) -> Vec<Value> {
        self.items.iter().map(ConversationItem::to_input).collect()
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
