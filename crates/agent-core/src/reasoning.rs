//! Orchestration Loop
//!
//! Drives the model through tool calls until it produces an answer:
//! call the model with the full conversation, dispatch any function calls it
//! emits (one batch per turn, in order), append the outputs, and repeat up to
//! a fixed number of steps.
//!
//! Three delivery modes share the same building blocks:
//!
//! - [`Agent::run`]: synchronous, returns the final text
//! - [`Agent::stream_direct`] / [`Agent::stream_resolved`]: streamed answer,
//!   optionally after a non-streamed tool-resolution phase
//! - [`Agent::stream_structured`]: streamed turns with tools, then a
//!   structured finalization

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::message::{Conversation, ConversationItem};
use crate::provider::{LlmProvider, ModelRequest, ModelResponse};
use crate::relay::{Disconnected, EventSink, RelayOutcome, StreamEvent, relay};
use crate::structured::StructuredOutput;
use crate::tool::{ToolCall, ToolRegistry};

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Developer instructions placed first in every conversation
    pub system_prompt: String,

    /// Maximum model turns that may request tools
    pub max_steps: usize,

    /// Model identifier
    pub model: String,

    /// Whether tools are offered to the model at all
    pub tools_enabled: bool,

    /// Output budget for the structured finalization call
    pub finalize_max_output_tokens: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_steps: 5,
            model: "gpt-5".into(),
            tools_enabled: true,
            finalize_max_output_tokens: 1200,
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Use the available tools when they help, and be concise.";

/// How a tool-resolution phase ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The model stopped asking for tools
    Resolved,
    /// The step bound was reached
    StepLimit,
    /// The client went away
    Disconnected,
}

enum Flow {
    Finished,
    Disconnected,
}

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent
    pub fn new(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Fresh conversation: developer instructions, then the question
    pub fn conversation(&self, question: &str) -> Conversation {
        Conversation::with_prompt(self.config.system_prompt.clone(), question)
    }

    fn request(&self, conversation: &Conversation, with_tools: bool) -> ModelRequest {
        let request = ModelRequest::new(self.config.model.clone(), conversation.items().to_vec());
        if with_tools && self.config.tools_enabled {
            request.with_tools(self.tools.definitions())
        } else {
            request
        }
    }

    /// Run the tool loop until the model answers
    pub async fn run(&self, conversation: &mut Conversation) -> Result<String> {
        for step in 0..self.config.max_steps {
            debug_assert!(conversation.unanswered_calls().is_empty());

            let response = self.provider.respond(&self.request(conversation, true)).await?;

            if response.has_text() {
                tracing::debug!(step, response_id = %response.id, "final answer");
                let answer = response.output_text.clone();
                conversation.extend(answer_items(response));
                return Ok(answer);
            }

            let calls = response.function_calls();
            if calls.is_empty() {
                tracing::warn!(step, response_id = %response.id, "model returned neither text nor tool calls");
                return Err(AgentError::NoAction);
            }

            tracing::info!(step, calls = calls.len(), "model requested tools");
            conversation.extend(response.output);
            // Only fails when a sink refuses a write; there is none here
            let _ = self.dispatch_calls(conversation, &calls, None).await;
        }

        tracing::warn!(max_steps = self.config.max_steps, "tool loop limit reached");
        Err(AgentError::MaxIterations(self.config.max_steps))
    }

    /// Run with a simple string input
    pub async fn ask(&self, question: &str) -> Result<String> {
        let mut conversation = self.conversation(question);
        self.run(&mut conversation).await
    }

    /// Run the tool loop, then finalize into a structured result
    pub async fn ask_structured<T: StructuredOutput>(&self, question: &str) -> Result<T> {
        let mut conversation = self.conversation(question);
        self.run(&mut conversation).await?;
        self.finalize(&mut conversation).await
    }

    /// Dispatch one batch of calls in order, appending one output per call.
    ///
    /// With a sink, each call is announced with `status` events.
    async fn dispatch_calls(
        &self,
        conversation: &mut Conversation,
        calls: &[ToolCall],
        mut sink: Option<&mut dyn EventSink>,
    ) -> std::result::Result<(), Disconnected> {
        for call in calls {
            if let Some(sink) = sink.as_deref_mut() {
                sink.emit(StreamEvent::Status {
                    message: format!("Calling {}...", call.name),
                })
                .await?;
            }

            tracing::debug!(tool = %call.name, call_id = %call.call_id, "dispatching tool call");
            let result = self.tools.execute(call).await;
            if result.is_error() {
                tracing::debug!(tool = %call.name, output = %result.output, "tool returned an error payload");
            }
            conversation.push(result.into_item());

            if let Some(sink) = sink.as_deref_mut() {
                sink.emit(StreamEvent::Status {
                    message: format!("Tool {} done", call.name),
                })
                .await?;
            }
        }
        Ok(())
    }

    /// One structured-output call over the conversation; never offers tools
    pub async fn finalize<T: StructuredOutput>(&self, conversation: &mut Conversation) -> Result<T> {
        conversation.push(ConversationItem::developer(T::instruction()));

        let request = self
            .request(conversation, false)
            .with_max_output_tokens(self.config.finalize_max_output_tokens)
            .with_text_format(T::text_format());

        let response = self.provider.respond(&request).await?;
        parse_structured(&response)
    }

    async fn respond_cancellable(
        &self,
        request: &ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<ModelResponse>> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(None),
            response = self.provider.respond(request) => response.map(Some),
        }
    }

    async fn stream_turn(
        &self,
        request: &ModelRequest,
        sink: &mut dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<RelayOutcome> {
        let events = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(RelayOutcome::Disconnected),
            events = self.provider.respond_stream(request) => events?,
        };
        relay(events, sink, cancel).await
    }

    /// Non-streamed tool-resolution phase.
    ///
    /// Ends as soon as a turn carries no tool calls; that turn's text is
    /// discarded because the answer is streamed afterwards.
    pub async fn resolve_tools(
        &self,
        conversation: &mut Conversation,
        sink: &mut dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<Resolution> {
        if !self.config.tools_enabled {
            return Ok(Resolution::Resolved);
        }

        for step in 0..self.config.max_steps {
            let Some(response) = self
                .respond_cancellable(&self.request(conversation, true), cancel)
                .await?
            else {
                return Ok(Resolution::Disconnected);
            };

            let calls = response.function_calls();
            if calls.is_empty() {
                if !response.has_text() {
                    tracing::warn!(step, "model returned neither text nor tool calls, streaming the answer anyway");
                }
                return Ok(Resolution::Resolved);
            }

            tracing::info!(step, calls = calls.len(), "model requested tools");
            conversation.extend(response.output);
            if self.dispatch_calls(conversation, &calls, Some(&mut *sink)).await.is_err() {
                return Ok(Resolution::Disconnected);
            }
        }

        tracing::warn!(max_steps = self.config.max_steps, "tool resolution stopped at the step limit");
        Ok(Resolution::StepLimit)
    }

    /// Stream an answer without tools
    pub async fn stream_direct(
        &self,
        conversation: Conversation,
        sink: &mut dyn EventSink,
        cancel: CancellationToken,
    ) {
        if sink.emit(StreamEvent::Ready).await.is_err() {
            return;
        }
        let flow = self.answer_phase(&conversation, sink, &cancel).await;
        finish(sink, flow).await;
    }

    /// Resolve tools without streaming, then stream the answer
    pub async fn stream_resolved(
        &self,
        mut conversation: Conversation,
        sink: &mut dyn EventSink,
        cancel: CancellationToken,
    ) {
        if sink.emit(StreamEvent::Ready).await.is_err() {
            return;
        }
        let flow = match self.resolve_tools(&mut conversation, sink, &cancel).await {
            Ok(Resolution::Disconnected) => Ok(Flow::Disconnected),
            Ok(Resolution::Resolved | Resolution::StepLimit) => {
                self.answer_phase(&conversation, sink, &cancel).await
            }
            Err(e) => Err(e),
        };
        finish(sink, flow).await;
    }

    /// Stream every turn with tools, then emit the structured result
    pub async fn stream_structured<T: StructuredOutput>(
        &self,
        mut conversation: Conversation,
        sink: &mut dyn EventSink,
        cancel: CancellationToken,
    ) {
        if sink.emit(StreamEvent::Ready).await.is_err() {
            return;
        }
        let flow = self.structured_phase::<T>(&mut conversation, sink, &cancel).await;
        finish(sink, flow).await;
    }

    async fn answer_phase(
        &self,
        conversation: &Conversation,
        sink: &mut dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<Flow> {
        match self.stream_turn(&self.request(conversation, false), sink, cancel).await? {
            RelayOutcome::Completed(_) => Ok(Flow::Finished),
            RelayOutcome::Disconnected => Ok(Flow::Disconnected),
            RelayOutcome::Exhausted => Err(incomplete_stream()),
        }
    }

    async fn structured_phase<T: StructuredOutput>(
        &self,
        conversation: &mut Conversation,
        sink: &mut dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<Flow> {
        for step in 0..self.config.max_steps {
            let response = match self.stream_turn(&self.request(conversation, true), sink, cancel).await? {
                RelayOutcome::Completed(response) => response,
                RelayOutcome::Disconnected => return Ok(Flow::Disconnected),
                RelayOutcome::Exhausted => return Err(incomplete_stream()),
            };

            let calls = response.function_calls();
            conversation.extend(response.output);
            if calls.is_empty() {
                break;
            }

            tracing::info!(step, calls = calls.len(), "model requested tools");
            if self.dispatch_calls(conversation, &calls, Some(&mut *sink)).await.is_err() {
                return Ok(Flow::Disconnected);
            }
        }

        let result: T = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(Flow::Disconnected),
            result = self.finalize(conversation) => result?,
        };

        if sink.emit(StreamEvent::Structured(serde_json::to_value(&result)?)).await.is_err() {
            return Ok(Flow::Disconnected);
        }
        Ok(Flow::Finished)
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get configuration
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }
}

/// Output of an answering turn, without function calls that will never be dispatched
fn answer_items(response: ModelResponse) -> Vec<ConversationItem> {
    let (calls, items): (Vec<_>, Vec<_>) = response
        .output
        .into_iter()
        .partition(|item| matches!(item, ConversationItem::FunctionCall(_)));
    if !calls.is_empty() {
        tracing::warn!(
            response_id = %response.id,
            dropped = calls.len(),
            "answer also requested tools, dropping the undispatched calls"
        );
    }
    items
}

fn incomplete_stream() -> AgentError {
    AgentError::Provider("stream ended before the response completed".into())
}

fn parse_structured<T: StructuredOutput>(response: &ModelResponse) -> Result<T> {
    if let Some(refusal) = &response.refusal {
        return Err(AgentError::Refusal(refusal.clone()));
    }
    if !response.has_text() {
        return Err(AgentError::StructuredOutput("model returned no output".into()));
    }

    let value: T = serde_json::from_str(&response.output_text)
        .map_err(|e| AgentError::StructuredOutput(format!("{} does not match schema: {e}", T::NAME)))?;
    value.validate()?;
    Ok(value)
}

async fn finish(sink: &mut dyn EventSink, flow: Result<Flow>) {
    let terminal = match flow {
        Ok(Flow::Finished) => StreamEvent::Done,
        Ok(Flow::Disconnected) => {
            tracing::debug!("stream abandoned by client");
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, "streamed answer failed");
            StreamEvent::Error {
                message: e.user_message(),
            }
        }
    };
    // Nothing left to do if the client is already gone
    let _ = sink.emit(terminal).await;
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: ToolRegistry,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn tool<T: crate::tool::Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    #[must_use]
    pub const fn max_steps(mut self, max: usize) -> Self {
        self.config.max_steps = max;
        self
    }

    #[must_use]
    pub const fn tools_enabled(mut self, enabled: bool) -> Self {
        self.config.tools_enabled = enabled;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        Ok(Agent::new(provider, Arc::new(self.tools), self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderEvent;
    use crate::testing::{RecordingSink, ScriptedProvider, ScriptedStream};
    use crate::tool::{ParameterSchema, Tool, ToolSchema, string_argument};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use serde_json::{Value, json};

    struct LookupTool;

    #[async_trait]
    impl Tool for LookupTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "lookup".into(),
                description: "Look up a record".into(),
                parameters: vec![ParameterSchema::required_string("key", "Record key")],
            }
        }

        async fn execute(&self, arguments: &Value) -> Result<Value> {
            Ok(json!({ "key": string_argument(arguments, "key"), "found": true }))
        }
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Verdict {
        answer: String,
        sure: bool,
    }

    impl StructuredOutput for Verdict {
        const NAME: &'static str = "verdict";

        fn schema() -> Value {
            json!({
                "type": "object",
                "properties": { "answer": {"type": "string"}, "sure": {"type": "boolean"} },
                "required": ["answer", "sure"],
                "additionalProperties": false
            })
        }

        fn instruction() -> &'static str {
            "Return a verdict."
        }

        fn validate(&self) -> Result<()> {
            if self.answer.is_empty() {
                return Err(AgentError::StructuredOutput("empty answer".into()));
            }
            Ok(())
        }
    }

    fn agent(provider: &Arc<ScriptedProvider>) -> Agent {
        AgentBuilder::new()
            .provider(provider.clone())
            .tool(LookupTool)
            .system_prompt("Be brief.")
            .build()
            .unwrap()
    }

    fn lookup(call_id: &str) -> ModelResponse {
        ModelResponse::tool_calls(
            format!("resp_{call_id}"),
            vec![ToolCall::new(call_id, "lookup", r#"{"key":"k1"}"#)],
        )
    }

    #[tokio::test]
    async fn test_direct_answer_in_one_call() {
        let provider = Arc::new(ScriptedProvider::new().with_response(ModelResponse::text("r1", "Hello.")));
        let answer = agent(&provider).ask("Hi there").await.unwrap();
        assert_eq!(answer, "Hello.");

        let requests = provider.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tools.len(), 1);
        assert_eq!(requests[0].parallel_tool_calls, Some(false));
        assert_eq!(requests[0].input[0], ConversationItem::developer("Be brief."));
        assert_eq!(requests[0].input[1], ConversationItem::user("Hi there"));
    }

    #[tokio::test]
    async fn test_tool_round_trip_answers_every_call() {
        let batch = ModelResponse::tool_calls(
            "r1",
            vec![
                ToolCall::new("c1", "lookup", r#"{"key":"a"}"#),
                ToolCall::new("c2", "missing_tool", "{}"),
                ToolCall::new("c3", "lookup", "{oops"),
            ],
        );
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_response(batch)
                .with_response(ModelResponse::text("r2", "Done.")),
        );

        let agent = agent(&provider);
        let mut conversation = agent.conversation("Check a");
        assert_eq!(agent.run(&mut conversation).await.unwrap(), "Done.");

        let requests = provider.requests().await;
        assert_eq!(requests.len(), 2);
        for request in &requests {
            let mut conv = Conversation::new();
            conv.extend(request.input.clone());
            assert!(conv.unanswered_calls().is_empty());
        }

        // calls first, then outputs in call order
        let second = &requests[1].input;
        assert_eq!(second.len(), 2 + 3 + 3);
        let outputs: Vec<(&str, Value)> = second[5..]
            .iter()
            .map(|item| match item {
                ConversationItem::FunctionCallOutput { call_id, output } => {
                    (call_id.as_str(), serde_json::from_str(output).unwrap())
                }
                other => panic!("expected function_call_output, got {other:?}"),
            })
            .collect();
        assert_eq!(outputs[0], ("c1", json!({"key": "a", "found": true})));
        assert_eq!(outputs[1], ("c2", json!({"error": "Unknown tool: missing_tool"})));
        assert_eq!(outputs[2].0, "c3");
        assert_eq!(outputs[2].1["error"], "Bad tool arguments");

        // the final answer is kept for a later finalization
        assert!(matches!(conversation.last(), Some(ConversationItem::ModelItem(_))));
    }

    #[tokio::test]
    async fn test_calls_next_to_an_answer_never_reach_finalize() {
        let mut answer = ModelResponse::text("r1", "Let me check that.");
        let stray = ToolCall::new("call_1", "lookup", r#"{"key":"k1"}"#);
        answer.output.push(ConversationItem::FunctionCall(stray));
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_response(answer)
                .with_response(ModelResponse::text("r2", r#"{"answer":"k1 is fine.","sure":true}"#)),
        );

        let verdict: Verdict = agent(&provider).ask_structured("Is k1 fine?").await.unwrap();
        assert!(verdict.sure);

        let requests = provider.requests().await;
        assert_eq!(requests.len(), 2);
        let mut finalize_input = Conversation::new();
        finalize_input.extend(requests[1].input.clone());
        assert!(finalize_input.unanswered_calls().is_empty());
        assert!(
            !finalize_input
                .items()
                .iter()
                .any(|i| matches!(i, ConversationItem::FunctionCall(_)))
        );
    }

    #[tokio::test]
    async fn test_step_limit_bounds_model_calls() {
        let mut provider = ScriptedProvider::new();
        for i in 0..10 {
            provider = provider.with_response(lookup(&format!("c{i}")));
        }
        let provider = Arc::new(provider);

        let err = agent(&provider).ask("Loop forever").await.unwrap_err();
        assert!(matches!(err, AgentError::MaxIterations(5)));
        assert_eq!(provider.requests().await.len(), 5);
    }

    #[tokio::test]
    async fn test_no_action_is_terminal() {
        let mut empty = ModelResponse::text("r1", "");
        empty.output = vec![ConversationItem::ModelItem(json!({"type": "reasoning", "summary": []}))];
        let provider = Arc::new(ScriptedProvider::new().with_response(empty));

        let err = agent(&provider).ask("Anything").await.unwrap_err();
        assert!(matches!(err, AgentError::NoAction));
        assert_eq!(provider.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_is_not_retried() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_error(AgentError::ProviderUnavailable("502".into()))
                .with_response(ModelResponse::text("r2", "never")),
        );
        let err = agent(&provider).ask("Hi").await.unwrap_err();
        assert!(matches!(err, AgentError::ProviderUnavailable(_)));
        assert_eq!(provider.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_tools_disabled_sends_no_tools() {
        let provider = Arc::new(ScriptedProvider::new().with_response(ModelResponse::text("r1", "Hi.")));
        let agent = AgentBuilder::new()
            .provider(provider.clone())
            .tool(LookupTool)
            .tools_enabled(false)
            .build()
            .unwrap();
        agent.ask("Hello").await.unwrap();

        let requests = provider.requests().await;
        assert!(requests[0].tools.is_empty());
        assert_eq!(requests[0].parallel_tool_calls, None);
    }

    #[tokio::test]
    async fn test_finalize_parses_structured_output() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_response(lookup("c1"))
                .with_response(ModelResponse::text("r2", "It is fine."))
                .with_response(ModelResponse::text("r3", r#"{"answer":"It is fine.","sure":true}"#)),
        );

        let verdict: Verdict = agent(&provider).ask_structured("Is k1 fine?").await.unwrap();
        assert_eq!(
            verdict,
            Verdict {
                answer: "It is fine.".into(),
                sure: true
            }
        );

        let requests = provider.requests().await;
        let last = requests.last().unwrap();
        assert!(last.tools.is_empty());
        assert_eq!(last.max_output_tokens, Some(1200));
        assert_eq!(last.text_format.as_ref().map(|f| f.name.as_str()), Some("verdict"));
        assert_eq!(last.input.last(), Some(&ConversationItem::developer("Return a verdict.")));
    }

    #[tokio::test]
    async fn test_finalize_failures_propagate() {
        let mut refused = ModelResponse::text("r1", "");
        refused.refusal = Some("I can't help with that.".into());

        let cases = vec![
            (refused, "refusal"),
            (ModelResponse::text("r2", "not json"), "schema"),
            (ModelResponse::text("r3", r#"{"answer":"","sure":false}"#), "validate"),
        ];

        for (response, label) in cases {
            let provider = Arc::new(ScriptedProvider::new().with_response(response));
            let agent = agent(&provider);
            let mut conversation = agent.conversation("q");
            let err = agent.finalize::<Verdict>(&mut conversation).await.unwrap_err();
            match label {
                "refusal" => assert!(matches!(err, AgentError::Refusal(_))),
                _ => assert!(matches!(err, AgentError::StructuredOutput(_)), "{label}: {err:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_stream_direct_events() {
        let provider = Arc::new(ScriptedProvider::new().with_stream(ScriptedStream::answer("resp_1", &["Hel", "lo"])));
        let agent = agent(&provider);
        let mut sink = RecordingSink::default();

        agent
            .stream_direct(agent.conversation("Hi"), &mut sink, CancellationToken::new())
            .await;

        assert_eq!(sink.names(), vec!["ready", "meta", "delta", "delta", "done"]);
        assert_eq!(sink.text(), "Hello");
        assert_eq!(sink.events()[1], StreamEvent::Meta { response_id: "resp_1".into() });
        assert!(provider.requests().await[0].tools.is_empty());
    }

    #[tokio::test]
    async fn test_stream_resolved_announces_tools_then_streams() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_response(lookup("c1"))
                .with_response(ModelResponse::text("r2", "discarded"))
                .with_stream(ScriptedStream::answer("resp_3", &["Found ", "it."])),
        );
        let agent = agent(&provider);
        let mut sink = RecordingSink::default();

        agent
            .stream_resolved(agent.conversation("Find k1"), &mut sink, CancellationToken::new())
            .await;

        assert_eq!(
            sink.names(),
            vec!["ready", "status", "status", "meta", "delta", "delta", "done"]
        );
        assert_eq!(sink.events()[1], StreamEvent::Status { message: "Calling lookup...".into() });
        assert_eq!(sink.events()[2], StreamEvent::Status { message: "Tool lookup done".into() });

        let requests = provider.requests().await;
        assert_eq!(requests.len(), 3);
        let streamed = &requests[2];
        assert!(streamed.tools.is_empty());
        assert!(streamed.input.iter().any(|i| matches!(i, ConversationItem::FunctionCallOutput { call_id, .. } if call_id == "c1")));
        assert!(!streamed.input.iter().any(|i| i.to_input().to_string().contains("discarded")));
    }

    #[tokio::test]
    async fn test_stream_resolved_no_action_still_streams() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_response(ModelResponse::text("r1", ""))
                .with_stream(ScriptedStream::answer("resp_2", &["Could you share your order id?"])),
        );
        let agent = agent(&provider);
        let mut sink = RecordingSink::default();

        agent
            .stream_resolved(agent.conversation("Where is it?"), &mut sink, CancellationToken::new())
            .await;

        assert_eq!(sink.names(), vec!["ready", "meta", "delta", "done"]);
    }

    #[tokio::test]
    async fn test_stream_structured_emits_result_before_done() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_stream(ScriptedStream::tool_turn(lookup("c1")))
                .with_stream(ScriptedStream::answer("resp_2", &["k1 ", "is fine."]))
                .with_response(ModelResponse::text("r3", r#"{"answer":"k1 is fine.","sure":true}"#)),
        );
        let agent = agent(&provider);
        let mut sink = RecordingSink::default();

        agent
            .stream_structured::<Verdict>(agent.conversation("Is k1 fine?"), &mut sink, CancellationToken::new())
            .await;

        assert_eq!(
            sink.names(),
            vec!["ready", "meta", "status", "status", "meta", "delta", "delta", "structured", "done"]
        );
        assert_eq!(
            sink.events()[7],
            StreamEvent::Structured(json!({"answer": "k1 is fine.", "sure": true}))
        );
    }

    #[tokio::test]
    async fn test_stream_upstream_failure_emits_error() {
        let provider = Arc::new(ScriptedProvider::new().with_stream(ScriptedStream::finite(vec![
            Ok(ProviderEvent::Created { response_id: "resp_1".into() }),
            Ok(ProviderEvent::Failed { message: "overloaded".into() }),
        ])));
        let agent = agent(&provider);
        let mut sink = RecordingSink::default();

        agent
            .stream_direct(agent.conversation("Hi"), &mut sink, CancellationToken::new())
            .await;

        assert_eq!(sink.names(), vec!["ready", "meta", "error"]);
        assert_eq!(
            sink.events()[2],
            StreamEvent::Error { message: "The AI service encountered an error: overloaded".into() }
        );
    }

    #[tokio::test]
    async fn test_truncated_stream_is_an_error_not_done() {
        let provider = Arc::new(ScriptedProvider::new().with_stream(ScriptedStream::finite(vec![
            Ok(ProviderEvent::Created { response_id: "resp_1".into() }),
            Ok(ProviderEvent::OutputTextDelta { delta: "Your order ".into() }),
        ])));
        let agent = agent(&provider);
        let mut sink = RecordingSink::default();

        agent
            .stream_direct(agent.conversation("Where is it?"), &mut sink, CancellationToken::new())
            .await;

        assert_eq!(sink.names(), vec!["ready", "meta", "delta", "error"]);
        assert!(!sink.names().contains(&"done"));
    }

    #[tokio::test]
    async fn test_disconnect_after_two_deltas_stops_writes() {
        let upstream = ScriptedStream::hanging(vec![
            Ok(ProviderEvent::Created { response_id: "resp_1".into() }),
            Ok(ProviderEvent::OutputTextDelta { delta: "one ".into() }),
            Ok(ProviderEvent::OutputTextDelta { delta: "two ".into() }),
            Ok(ProviderEvent::OutputTextDelta { delta: "three".into() }),
        ]);
        let watch = upstream.watch();
        let provider = Arc::new(ScriptedProvider::new().with_stream(upstream));
        let agent = agent(&provider);

        let cancel = CancellationToken::new();
        let mut sink = RecordingSink::default().cancel_after_deltas(2, cancel.clone());
        agent.stream_direct(agent.conversation("Hi"), &mut sink, cancel).await;

        assert_eq!(sink.names(), vec!["ready", "meta", "delta", "delta"]);
        assert_eq!(sink.attempts(), 4);
        assert!(watch.was_opened() && !watch.is_open());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_call_skips_provider() {
        let provider = Arc::new(ScriptedProvider::new().with_response(lookup("c1")));
        let agent = agent(&provider);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut sink = RecordingSink::default();
        agent.stream_resolved(agent.conversation("Hi"), &mut sink, cancel).await;

        assert_eq!(sink.names(), vec!["ready"]);
        assert!(provider.requests().await.is_empty());
    }
}
