//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Step bound reached while the model kept requesting tools
    #[error("Tool loop limit reached ({0} steps)")]
    MaxIterations(usize),

    /// The model returned neither output text nor tool calls
    #[error("No output_text and no tool calls")]
    NoAction,

    /// Structured output could not be produced or did not conform
    #[error("Structured output error: {0}")]
    StructuredOutput(String),

    /// The model refused to produce the requested output
    #[error("Model refused: {0}")]
    Refusal(String),

    /// Parse error (e.g., malformed provider payload)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            Self::ProviderUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::MaxIterations(_) => "Tool loop limit reached.".into(),
            Self::NoAction => "No output_text and no tool calls.".into(),
            Self::StructuredOutput(_) | Self::Refusal(_) => {
                "The assistant could not produce a structured answer.".into()
            }
            Self::RateLimited(_) => "Too many requests to the AI service. Please wait a moment.".into(),
            Self::Auth(_) => "The AI service rejected our credentials.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }

    /// Short machine-readable code for API error bodies
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Provider(_) | Self::ProviderUnavailable(_) => "PROVIDER_ERROR",
            Self::MaxIterations(_) => "TOOL_LOOP_LIMIT",
            Self::NoAction => "NO_ACTION",
            Self::StructuredOutput(_) | Self::Refusal(_) => "STRUCTURED_OUTPUT_ERROR",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::Auth(_) => "PROVIDER_AUTH",
            _ => "AGENT_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_failures_keep_their_wording() {
        assert_eq!(AgentError::MaxIterations(5).user_message(), "Tool loop limit reached.");
        assert_eq!(AgentError::NoAction.user_message(), "No output_text and no tool calls.");
        assert_eq!(AgentError::MaxIterations(5).code(), "TOOL_LOOP_LIMIT");
    }
}
