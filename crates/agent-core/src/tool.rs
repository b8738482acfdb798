//! Tool System
//!
//! Tools are registered once at startup, advertised to the model on every
//! turn where tool use is permitted, and dispatched by name from the
//! orchestration loop. Dispatch never fails: bad arguments, unknown names and
//! tool errors all become error payloads the model can read.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::message::ConversationItem;

fn empty_arguments() -> String {
    "{}".into()
}

/// Tool call request emitted by the model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlates the call with its output item
    pub call_id: String,

    /// Tool identifier
    pub name: String,

    /// Raw JSON arguments, exactly as the model produced them
    #[serde(default = "empty_arguments")]
    pub arguments: String,

    /// Provider-assigned item id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ToolCall {
    pub fn new(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments: arguments.into(),
            id: None,
        }
    }
}

/// Result of dispatching one tool call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,

    /// Tool output or an `{error}` payload
    pub output: Value,
}

impl ToolResult {
    /// Whether the output is an error payload
    pub fn is_error(&self) -> bool {
        self.output.get("error").is_some()
    }

    /// Wrap as the `function_call_output` item answering the call
    pub fn into_item(self) -> ConversationItem {
        ConversationItem::function_call_output(self.call_id, self.output.to_string())
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    /// A required string parameter
    pub fn required_string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: "string".into(),
            description: description.into(),
            required: true,
            enum_values: None,
        }
    }
}

/// Tool definition schema (for LLM function calling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,
}

impl ToolSchema {
    /// Render as a Responses API function tool
    pub fn to_function(&self) -> Value {
        let mut properties = serde_json::Map::new();
        for param in &self.parameters {
            let mut property = json!({
                "type": param.param_type,
                "description": param.description,
            });
            if let Some(values) = &param.enum_values {
                property["enum"] = Value::Array(values.clone());
            }
            properties.insert(param.name.clone(), property);
        }

        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "function",
            "name": self.name,
            "description": self.description,
            "strict": false,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            },
        })
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema for LLM function calling
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with parsed JSON arguments
    async fn execute(&self, arguments: &Value) -> Result<Value>;
}

/// Read an argument as a string the way a loosely typed caller would:
/// numbers and booleans are stringified, a missing value becomes empty.
pub fn string_argument(arguments: &Value, key: &str) -> String {
    match arguments.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Registry for available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let schema = tool.schema();
        self.tools.insert(schema.name, Arc::new(tool));
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Map a tool name and raw argument payload to a result value
    pub async fn dispatch(&self, name: &str, raw_arguments: &str) -> Value {
        let raw = if raw_arguments.trim().is_empty() {
            "{}"
        } else {
            raw_arguments
        };

        let arguments: Value = match serde_json::from_str(raw) {
            Ok(arguments) => arguments,
            Err(e) => {
                tracing::debug!(tool = %name, error = %e, "Bad tool arguments");
                return json!({
                    "error": "Bad tool arguments",
                    "details": e.to_string(),
                });
            }
        };

        let Some(tool) = self.get(name) else {
            tracing::debug!(tool = %name, "Unknown tool requested");
            return json!({ "error": format!("Unknown tool: {name}") });
        };

        match tool.execute(&arguments).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "Tool execution failed");
                json!({ "error": e.to_string() })
            }
        }
    }

    /// Dispatch a model-emitted call
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        ToolResult {
            call_id: call.call_id.clone(),
            name: call.name.clone(),
            output: self.dispatch(&call.name, &call.arguments).await,
        }
    }

    /// Get all tool schemas
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    /// Function tool definitions as sent to the provider
    pub fn definitions(&self) -> Vec<Value> {
        self.schemas().iter().map(ToolSchema::to_function).collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "echo".into(),
                description: "Echo a word back".into(),
                parameters: vec![ParameterSchema::required_string("word", "Word to echo")],
            }
        }

        async fn execute(&self, arguments: &Value) -> Result<Value> {
            let word = string_argument(arguments, "word");
            if word == "boom" {
                return Err(AgentError::Other("echo exploded".into()));
            }
            Ok(json!({ "echo": word }))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry
    }

    #[tokio::test]
    async fn test_dispatch_known_tool() {
        let out = registry().dispatch("echo", r#"{"word":"hi"}"#).await;
        assert_eq!(out, json!({"echo": "hi"}));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_error_payload() {
        let registry = registry();
        for name in ["nope", "", "ECHO", "get_order "] {
            let out = registry.dispatch(name, "{}").await;
            assert_eq!(out, json!({ "error": format!("Unknown tool: {name}") }));
        }
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_recovered() {
        let registry = registry();
        for raw in ["{", "not json", r#"{"word": }"#, "[1,"] {
            let out = registry.dispatch("echo", raw).await;
            assert_eq!(out["error"], "Bad tool arguments");
            assert!(out["details"].as_str().is_some_and(|d| !d.is_empty()));
        }

        // arguments are parsed before the name is checked
        let out = registry.dispatch("nope", "{").await;
        assert_eq!(out["error"], "Bad tool arguments");
    }

    #[tokio::test]
    async fn test_tool_failure_is_recovered() {
        let out = registry().dispatch("echo", r#"{"word":"boom"}"#).await;
        assert_eq!(out, json!({"error": "echo exploded"}));
    }

    #[tokio::test]
    async fn test_execute_wraps_output_item() {
        let result = registry()
            .execute(&ToolCall::new("call_9", "echo", r#"{"word":"x"}"#))
            .await;
        assert!(!result.is_error());
        assert_eq!(
            result.into_item(),
            ConversationItem::function_call_output("call_9", r#"{"echo":"x"}"#)
        );
    }

    #[test]
    fn test_string_argument_coercion() {
        let args = json!({"a": "x", "b": 1001, "c": true, "d": null});
        assert_eq!(string_argument(&args, "a"), "x");
        assert_eq!(string_argument(&args, "b"), "1001");
        assert_eq!(string_argument(&args, "c"), "true");
        assert_eq!(string_argument(&args, "d"), "");
        assert_eq!(string_argument(&args, "missing"), "");
        assert_eq!(string_argument(&json!([1, 2]), "a"), "");
    }

    #[test]
    fn test_function_definition() {
        let registry = registry();
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0]["type"], "function");
        assert_eq!(defs[0]["name"], "echo");
        assert_eq!(defs[0]["parameters"]["required"], json!(["word"]));
        assert_eq!(defs[0]["parameters"]["properties"]["word"]["type"], "string");
        assert_eq!(registry.names(), vec!["echo"]);
    }
}
