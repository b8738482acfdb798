//! OpenAI LLM Provider
//!
//! Implementation of `LlmProvider` over the Responses API
//! (`POST {base_url}/responses`), both complete and streamed.

use agent_core::{
    error::{AgentError, Result},
    message::ConversationItem,
    provider::{
        LlmProvider, ModelRequest, ModelResponse, ProviderEvent, ProviderEventStream, TokenUsage,
    },
};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI provider configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// API key sent as a bearer token
    pub api_key: String,

    /// API root, without trailing slash
    pub base_url: String,

    /// Optional organization header
    pub organization: Option<String>,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.into(),
            organization: None,
        }
    }

    /// Build from any key/value source (`OPENAI_API_KEY`, `OPENAI_BASE_URL`, `OPENAI_ORG_ID`)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("OPENAI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AgentError::Config("OPENAI_API_KEY is not set".into()))?;

        let base_url = lookup("OPENAI_BASE_URL")
            .filter(|u| !u.trim().is_empty())
            .map_or_else(|| DEFAULT_BASE_URL.into(), |u| u.trim_end_matches('/').to_string());

        Ok(Self {
            api_key,
            base_url,
            organization: lookup("OPENAI_ORG_ID"),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// OpenAI Responses API provider
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    /// Create from configuration
    pub fn from_config(config: OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_config(OpenAiConfig::from_env()?))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorized(self.client.post(format!("{}{path}", self.config.base_url)))
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.bearer_auth(&self.config.api_key);
        match &self.config.organization {
            Some(org) => builder.header("OpenAI-Organization", org),
            None => builder,
        }
    }

    /// Build the request body
    fn build_body(request: &ModelRequest, stream: bool) -> Value {
        let input: Vec<Value> = request.input.iter().map(ConversationItem::to_input).collect();
        let mut body = json!({
            "model": request.model,
            "input": input,
        });

        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.clone());
        }
        if let Some(parallel) = request.parallel_tool_calls {
            body["parallel_tool_calls"] = json!(parallel);
        }
        if let Some(max) = request.max_output_tokens {
            body["max_output_tokens"] = json!(max);
        }
        if let Some(format) = &request.text_format {
            body["text"] = json!({
                "format": {
                    "type": "json_schema",
                    "name": format.name,
                    "schema": format.schema,
                    "strict": format.strict,
                }
            });
        }
        if stream {
            body["stream"] = json!(true);
        }

        body
    }

    async fn send(&self, request: &ModelRequest, stream: bool) -> Result<reqwest::Response> {
        let body = Self::build_body(request, stream);
        tracing::debug!(
            model = %request.model,
            items = request.input.len(),
            tools = request.tools.len(),
            stream,
            "POST /responses"
        );

        let response = self
            .post("/responses")
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        Err(status_error(status, &text))
    }
}

/// Map a non-success HTTP status to an agent error
fn status_error(status: StatusCode, body: &str) -> AgentError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string());
    let message = format!("HTTP {status}: {message}");

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AgentError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => AgentError::RateLimited(message),
        s if s.is_server_error() => AgentError::ProviderUnavailable(message),
        _ => AgentError::Provider(message),
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Vec<Value>,
    #[serde(default)]
    error: Option<ApiError>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

/// Convert an API response into the provider-neutral shape
fn convert_response(api: ApiResponse) -> Result<ModelResponse> {
    if let Some(error) = api.error {
        return Err(AgentError::Provider(error.message));
    }
    if api.status.as_deref() == Some("failed") {
        return Err(AgentError::Provider(format!("response {} failed", api.id)));
    }

    let mut output_text = String::new();
    let mut refusal: Option<String> = None;
    for item in &api.output {
        if item["type"] != "message" {
            continue;
        }
        for part in item["content"].as_array().into_iter().flatten() {
            match part["type"].as_str() {
                Some("output_text") => output_text.push_str(part["text"].as_str().unwrap_or_default()),
                Some("refusal") => {
                    refusal
                        .get_or_insert_with(String::new)
                        .push_str(part["refusal"].as_str().unwrap_or_default());
                }
                _ => {}
            }
        }
    }

    Ok(ModelResponse {
        id: api.id,
        model: api.model,
        output: api.output.into_iter().filter_map(ConversationItem::from_output).collect(),
        output_text,
        refusal,
        usage: api.usage.map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
            total_tokens: u.total_tokens,
        }),
    })
}

/// Map one upstream SSE event; `None` for event types the relay ignores
fn parse_stream_event(name: &str, data: &str) -> Result<Option<ProviderEvent>> {
    if data.trim() == "[DONE]" {
        return Ok(None);
    }

    let payload: Value = serde_json::from_str(data)
        .map_err(|e| AgentError::Parse(format!("bad stream event payload: {e}")))?;
    let kind = payload["type"].as_str().unwrap_or(name);

    let event = match kind {
        "response.created" => ProviderEvent::Created {
            response_id: payload["response"]["id"].as_str().unwrap_or_default().to_string(),
        },
        "response.output_text.delta" => ProviderEvent::OutputTextDelta {
            delta: payload["delta"].as_str().unwrap_or_default().to_string(),
        },
        "response.completed" => {
            let api: ApiResponse = serde_json::from_value(payload["response"].clone())?;
            ProviderEvent::Completed(Box::new(convert_response(api)?))
        }
        "response.failed" => ProviderEvent::Failed {
            message: payload["response"]["error"]["message"]
                .as_str()
                .unwrap_or("response failed")
                .to_string(),
        },
        "error" => ProviderEvent::Failed {
            message: payload["message"].as_str().unwrap_or("upstream error").to_string(),
        },
        _ => return Ok(None),
    };

    Ok(Some(event))
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "OpenAI"
    }

    async fn health_check(&self) -> Result<bool> {
        let request = self.authorized(self.client.get(format!("{}/models", self.config.base_url)));
        match request.send().await {
            Ok(response) if response.status().is_success() => Ok(true),
            Ok(response) => {
                tracing::warn!(status = %response.status(), "OpenAI health check failed");
                Ok(false)
            }
            Err(e) => {
                tracing::warn!("OpenAI health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn respond(&self, request: &ModelRequest) -> Result<ModelResponse> {
        let response = self.send(request, false).await?;
        let api: ApiResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(format!("bad response body: {e}")))?;
        convert_response(api)
    }

    async fn respond_stream(&self, request: &ModelRequest) -> Result<ProviderEventStream> {
        let response = self.send(request, true).await?;

        let stream = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move {
                match event {
                    Ok(event) => parse_stream_event(&event.event, &event.data).transpose(),
                    Err(e) => Some(Err(AgentError::Provider(format!("stream error: {e}")))),
                }
            });

        Ok(Box::pin(stream))
    }
}
