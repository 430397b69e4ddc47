//! Error types for LLM operations

use thiserror::Error;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Error, Debug)]
pub enum LLMError {
    /// API request failed
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Invalid API key or authentication failed
    #[error("Invalid API key or authentication failed")]
    AuthenticationFailed,

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Unexpected response format
    #[error("Unexpected response format: {0}")]
    UnexpectedResponse(String),

    /// Every model in a fallback chain failed
    #[error("All {attempted} models failed, last error: {last}")]
    ChainExhausted { attempted: usize, last: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl LLMError {
    /// Whether trying a different model could help.
    ///
    /// Credentials and configuration are shared by every model in a chain,
    /// so those failures end the chain early.
    pub fn is_model_specific(&self) -> bool {
        !matches!(
            self,
            Self::AuthenticationFailed | Self::ConfigurationError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_specific_errors() {
        assert!(LLMError::ModelNotFound("gemini-x".into()).is_model_specific());
        assert!(LLMError::RateLimitExceeded("slow down".into()).is_model_specific());
        assert!(!LLMError::AuthenticationFailed.is_model_specific());
        assert!(!LLMError::ConfigurationError("no key".into()).is_model_specific());
    }
}
