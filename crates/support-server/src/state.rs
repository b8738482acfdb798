//! Application State

use std::sync::Arc;

use agent_core::{Agent, AgentConfig, LlmProvider, ToolRegistry};
use order_support::{DIRECT_PROMPT, SUPPORT_PROMPT};

use crate::config::ServerConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Model provider, shared by both agents
    pub provider: Arc<dyn LlmProvider>,

    /// Agent with the order lookup tools
    pub agent: Arc<Agent>,

    /// Tool-less agent for `/support-stream`
    pub direct: Arc<Agent>,

    /// Whether `POST /support` returns a full `SupportResponse`
    pub structured: bool,
}

impl AppState {
    pub fn new(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>, config: &ServerConfig) -> Self {
        let base = AgentConfig {
            model: config.model.clone(),
            max_steps: config.max_steps,
            ..AgentConfig::default()
        };

        let agent = Agent::new(
            Arc::clone(&provider),
            Arc::clone(&tools),
            AgentConfig {
                system_prompt: SUPPORT_PROMPT.into(),
                ..base.clone()
            },
        );
        let direct = Agent::new(
            Arc::clone(&provider),
            tools,
            AgentConfig {
                system_prompt: DIRECT_PROMPT.into(),
                tools_enabled: false,
                ..base
            },
        );

        Self {
            provider,
            agent: Arc::new(agent),
            direct: Arc::new(direct),
            structured: config.structured,
        }
    }
}
