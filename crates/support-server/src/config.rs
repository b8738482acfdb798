//! Server Configuration
//!
//! Read once at startup from the environment (after `.env` is loaded).

use agent_runtime::OpenAiConfig;
use thiserror::Error;

const DEFAULT_MODEL: &str = "gpt-5";
const DEFAULT_MAX_STEPS: usize = 5;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0}")]
    Provider(#[from] agent_core::AgentError),

    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Server settings
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Upstream model service
    pub openai: OpenAiConfig,

    /// Model identifier (`MODEL`)
    pub model: String,

    /// Tool loop bound (`SUPPORT_MAX_STEPS`)
    pub max_steps: usize,

    /// Answer `POST /support` with a full `SupportResponse` (`SUPPORT_STRUCTURED`)
    pub structured: bool,

    /// Listen address (`BIND_ADDR`)
    pub bind_addr: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let openai = OpenAiConfig::from_lookup(&lookup)?;

        let max_steps = match lookup("SUPPORT_MAX_STEPS") {
            None => DEFAULT_MAX_STEPS,
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::Invalid {
                    key: "SUPPORT_MAX_STEPS",
                    expected: "a positive integer",
                    value: raw,
                })?,
        };

        let structured = match lookup("SUPPORT_STRUCTURED") {
            None => false,
            Some(raw) => parse_flag(&raw).ok_or(ConfigError::Invalid {
                key: "SUPPORT_STRUCTURED",
                expected: "true or false",
                value: raw,
            })?,
        };

        Ok(Self {
            openai,
            model: lookup("MODEL")
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.into()),
            max_steps,
            structured,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
