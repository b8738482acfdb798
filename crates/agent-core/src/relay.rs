//! Stream Relay
//!
//! Forwards provider stream events to a client-facing sink as they arrive.
//! The sink is transport-agnostic; the server maps [`StreamEvent`] onto SSE.
//!
//! Once the client is gone (the sink refuses a write, or the cancellation
//! token fires) the relay stops and drops the upstream stream, which aborts
//! the in-flight request.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::provider::{ModelResponse, ProviderEvent, ProviderEventStream};

/// Outbound event delivered to the client
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Connection accepted, sent before any model call
    Ready,
    /// Upstream response identifier
    Meta { response_id: String },
    /// Tool-dispatch progress
    Status { message: String },
    /// Incremental answer text
    Delta { text: String },
    /// Structured result of the finalizer
    Structured(Value),
    /// Graceful completion
    Done,
    /// Failure; ends the stream
    Error { message: String },
}

impl StreamEvent {
    /// SSE event name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Meta { .. } => "meta",
            Self::Status { .. } => "status",
            Self::Delta { .. } => "delta",
            Self::Structured(_) => "structured",
            Self::Done => "done",
            Self::Error { .. } => "error",
        }
    }

    /// JSON payload
    pub fn data(&self) -> Value {
        match self {
            Self::Ready | Self::Done => json!({ "ok": true }),
            Self::Meta { response_id } => json!({ "responseId": response_id }),
            Self::Status { message } | Self::Error { message } => json!({ "message": message }),
            Self::Delta { text } => json!({ "delta": text }),
            Self::Structured(value) => value.clone(),
        }
    }

    /// Whether this event ends the stream
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }
}

/// The client connection has gone away
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Disconnected;

impl std::fmt::Display for Disconnected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client disconnected")
    }
}

impl std::error::Error for Disconnected {}

/// Destination for outbound events
#[async_trait]
pub trait EventSink: Send {
    /// Deliver one event; `Err` means nothing more can be written
    async fn emit(&mut self, event: StreamEvent) -> std::result::Result<(), Disconnected>;
}

#[async_trait]
impl EventSink for mpsc::Sender<StreamEvent> {
    async fn emit(&mut self, event: StreamEvent) -> std::result::Result<(), Disconnected> {
        self.send(event).await.map_err(|_| Disconnected)
    }
}

/// How a relayed upstream stream ended
#[derive(Debug)]
pub enum RelayOutcome {
    /// `response.completed` arrived
    Completed(Box<ModelResponse>),
    /// The upstream stream ended without a completion event
    Exhausted,
    /// The client went away
    Disconnected,
}

/// Forward one upstream stream into the sink.
///
/// `meta` and `delta` events are written as they arrive. Upstream failures
/// are returned as errors so the caller decides how to report them.
pub async fn relay(
    mut events: ProviderEventStream,
    sink: &mut dyn EventSink,
    cancel: &CancellationToken,
) -> Result<RelayOutcome> {
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(RelayOutcome::Disconnected),
            next = events.next() => next,
        };

        let outbound = match next {
            None => return Ok(RelayOutcome::Exhausted),
            Some(Err(e)) => return Err(e),
            Some(Ok(ProviderEvent::Created { response_id })) => StreamEvent::Meta { response_id },
            Some(Ok(ProviderEvent::OutputTextDelta { delta })) => StreamEvent::Delta { text: delta },
            Some(Ok(ProviderEvent::Completed(response))) => {
                return Ok(RelayOutcome::Completed(response));
            }
            Some(Ok(ProviderEvent::Failed { message })) => {
                return Err(AgentError::Provider(message));
            }
        };

        if sink.emit(outbound).await.is_err() {
            tracing::debug!("client disconnected mid-stream");
            cancel.cancel();
            return Ok(RelayOutcome::Disconnected);
        }
    }
}
