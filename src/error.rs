use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SalesFlowError>;

#[derive(Debug, Error)]
pub enum SalesFlowError {
    #[error("agent `{0}` not registered")]
    AgentNotRegistered(String),
    #[error("no response to message `{message_id}` within {timeout:?}")]
    ResponseTimeout {
        message_id: String,
        timeout: Duration,
    },
    #[error("response channel for message `{0}` closed without a reply")]
    ResponseDropped(String),
    #[error("agent `{agent}` failed: {message}")]
    HandlerFailure { agent: String, message: String },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("cannot respond to message `{0}`: it is not a request")]
    InvalidCorrelation(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SalesFlowError {
    /// Routing-level failures raised by the router itself, as opposed to
    /// business failures carried inside message payloads.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            SalesFlowError::AgentNotRegistered(_)
                | SalesFlowError::ResponseTimeout { .. }
                | SalesFlowError::ResponseDropped(_)
        )
    }
}

impl From<serde_json::Error> for SalesFlowError {
    fn from(err: serde_json::Error) -> Self {
        SalesFlowError::Serialization(err.to_string())
    }
}
