//! # agent-core
//!
//! Tool-calling orchestration over a provider-agnostic model interface.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Agent                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────┐  │
//! │  │ Orchestration│  │    Tool      │  │   LlmProvider      │  │
//! │  │     Loop     │──│   Registry   │──│   (Strategy)       │  │
//! │  └──────┬───────┘  └──────────────┘  └────────────────────┘  │
//! │         │                                                    │
//! │  ┌──────┴───────┐  ┌──────────────┐                          │
//! │  │ Stream Relay │  │  Structured  │                          │
//! │  │ (EventSink)  │  │  Finalizer   │                          │
//! │  └──────────────┘  └──────────────┘                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait keeps the loop independent of the HTTP client;
//! the `EventSink` trait keeps the relay independent of the transport.

pub mod error;
pub mod message;
pub mod provider;
pub mod reasoning;
pub mod relay;
pub mod structured;
pub mod tool;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{AgentError, Result};
pub use message::{Conversation, ConversationItem, Role};
pub use provider::{LlmProvider, ModelRequest, ModelResponse, ProviderEvent, ProviderEventStream};
pub use reasoning::{Agent, AgentBuilder, AgentConfig};
pub use relay::{Disconnected, EventSink, StreamEvent};
pub use structured::StructuredOutput;
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult, ToolSchema};
