//! Test doubles: a scripted provider and a recording sink.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::provider::{LlmProvider, ModelRequest, ModelResponse, ProviderEvent, ProviderEventStream};
use crate::relay::{Disconnected, EventSink, StreamEvent};

#[derive(Default)]
struct WatchState {
    opened: AtomicBool,
    open: AtomicBool,
}

/// Observes whether a scripted stream is still held by its consumer
#[derive(Clone, Default)]
pub struct StreamWatch(Arc<WatchState>);

impl StreamWatch {
    pub fn was_opened(&self) -> bool {
        self.0.opened.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.0.open.load(Ordering::SeqCst)
    }
}

struct OpenGuard(StreamWatch);

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.0.0.open.store(false, Ordering::SeqCst);
    }
}

/// A canned upstream event sequence
pub struct ScriptedStream {
    events: Vec<Result<ProviderEvent>>,
    hang: bool,
    watch: StreamWatch,
}

impl ScriptedStream {
    /// Ends after the last event
    pub fn finite(events: Vec<Result<ProviderEvent>>) -> Self {
        Self {
            events,
            hang: false,
            watch: StreamWatch::default(),
        }
    }

    /// Never ends on its own after the last event
    pub fn hanging(events: Vec<Result<ProviderEvent>>) -> Self {
        Self {
            hang: true,
            ..Self::finite(events)
        }
    }

    /// Streamed text answer: created, one delta per fragment, completed
    pub fn answer(response_id: &str, fragments: &[&str]) -> Self {
        let mut events = vec![Ok(ProviderEvent::Created {
            response_id: response_id.into(),
        })];
        events.extend(fragments.iter().map(|f| {
            Ok(ProviderEvent::OutputTextDelta {
                delta: (*f).to_string(),
            })
        }));
        events.push(Ok(ProviderEvent::Completed(Box::new(ModelResponse::text(
            response_id,
            fragments.concat(),
        )))));
        Self::finite(events)
    }

    /// Streamed turn that ends with tool calls and no text
    pub fn tool_turn(response: ModelResponse) -> Self {
        Self::finite(vec![
            Ok(ProviderEvent::Created {
                response_id: response.id.clone(),
            }),
            Ok(ProviderEvent::Completed(Box::new(response))),
        ])
    }

    pub fn watch(&self) -> StreamWatch {
        self.watch.clone()
    }

    pub fn into_stream(self) -> ProviderEventStream {
        self.watch.0.opened.store(true, Ordering::SeqCst);
        self.watch.0.open.store(true, Ordering::SeqCst);
        let guard = OpenGuard(self.watch);

        let head = futures::stream::iter(self.events);
        let stream: ProviderEventStream = if self.hang {
            Box::pin(head.chain(futures::stream::pending()))
        } else {
            Box::pin(head)
        };

        Box::pin(stream.map(move |event| {
            let _held = &guard;
            event
        }))
    }
}

/// Provider that replays scripted responses and records every request
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<ModelResponse>>>,
    streams: Mutex<VecDeque<ScriptedStream>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_response(mut self, response: ModelResponse) -> Self {
        self.responses.get_mut().push_back(Ok(response));
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: AgentError) -> Self {
        self.responses.get_mut().push_back(Err(error));
        self
    }

    #[must_use]
    pub fn with_stream(mut self, stream: ScriptedStream) -> Self {
        self.streams.get_mut().push_back(stream);
        self
    }

    /// Every request seen so far, complete and streamed
    pub async fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn respond(&self, request: &ModelRequest) -> Result<ModelResponse> {
        self.requests.lock().await.push(request.clone());
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::Provider("script exhausted".into())))
    }

    async fn respond_stream(&self, request: &ModelRequest) -> Result<ProviderEventStream> {
        self.requests.lock().await.push(request.clone());
        self.streams
            .lock()
            .await
            .pop_front()
            .map(ScriptedStream::into_stream)
            .ok_or_else(|| AgentError::Provider("stream script exhausted".into()))
    }
}

/// Sink that records what it accepts
#[derive(Default)]
pub struct RecordingSink {
    events: Vec<StreamEvent>,
    accept: Option<usize>,
    attempts: usize,
    rejected: usize,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl RecordingSink {
    /// Accept `n` events, then behave like a closed connection
    pub fn accepting(n: usize) -> Self {
        Self {
            accept: Some(n),
            ..Self::default()
        }
    }

    /// Fire `token` once `n` deltas have been accepted
    #[must_use]
    pub fn cancel_after_deltas(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    pub fn events(&self) -> &[StreamEvent] {
        &self.events
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.iter().map(StreamEvent::name).collect()
    }

    /// Concatenated delta text
    pub fn text(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Delta { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Writes attempted, accepted or not
    pub const fn attempts(&self) -> usize {
        self.attempts
    }

    pub const fn rejected(&self) -> usize {
        self.rejected
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(&mut self, event: StreamEvent) -> std::result::Result<(), Disconnected> {
        self.attempts += 1;
        if self.accept.is_some_and(|n| self.events.len() >= n) {
            self.rejected += 1;
            return Err(Disconnected);
        }
        self.events.push(event);

        if let Some((n, token)) = &self.cancel_after {
            let deltas = self
                .events
                .iter()
                .filter(|e| matches!(e, StreamEvent::Delta { .. }))
                .count();
            if deltas >= *n {
                token.cancel();
            }
        }
        Ok(())
    }
}
