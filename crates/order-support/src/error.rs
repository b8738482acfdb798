//! Error Types for Order Support

use agent_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrderError>;

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("Order store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Duplicate order id: {0}")]
    DuplicateOrder(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Tool failures travel back to the model as `{error}` payloads
impl From<OrderError> for AgentError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Serialization(e) => Self::Json(e),
            other => Self::Other(other.to_string()),
        }
    }
}
