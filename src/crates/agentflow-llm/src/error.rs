//! Provider error types.

use agentflow_core::FlowError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors raised by LLM provider implementations.
#[derive(Error, Debug)]
pub enum LlmError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider rejected the credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The provider throttled the request.
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    /// The provider returned a non-success status.
    #[error("provider error: {0}")]
    Provider(String),

    /// The response body did not parse.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration problems (missing key, bad base URL).
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<LlmError> for FlowError {
    fn from(error: LlmError) -> Self {
        match error {
            LlmError::Configuration(message) => FlowError::Config {
                node: "client".to_string(),
                message,
            },
            other => FlowError::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_into_core_error_kinds() {
        let err: FlowError = LlmError::Provider("boom".to_string()).into();
        assert_eq!(err.kind(), "transport");

        let err: FlowError = LlmError::Configuration("no key".to_string()).into();
        assert_eq!(err.kind(), "config");
    }
}
