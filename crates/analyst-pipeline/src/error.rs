//! Error types for the analysis pipeline

use analyst_llm::LLMError;
use analyst_sandbox::SandboxError;
use analyst_utils::EnvError;
use std::time::Duration;
use thiserror::Error;

/// Failures talking to a market-data, news or document collaborator
#[derive(Debug, Error)]
pub enum DataError {
    /// Symbol cannot be resolved by the provider
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Provider answered but had nothing usable
    #[error("Data not available for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    /// Provider-side failure
    #[error("{provider} error: {reason}")]
    Provider { provider: String, reason: String },

    /// Network or HTTP error
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl DataError {
    pub fn provider(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            reason: reason.into(),
        }
    }
}

/// Why one analysis stage produced no result.
///
/// Never escapes the director: every variant becomes an absent stage
/// plus a diagnostic.
#[derive(Debug, Error)]
pub enum StageError {
    /// Collaborator call failed or returned nothing to analyze
    #[error("fetch failed: {0}")]
    Fetch(#[from] DataError),

    /// Stage-local computation failed
    #[error("compute failed: {0}")]
    Compute(String),

    #[error("sandbox: {0}")]
    Sandbox(#[from] SandboxError),

    /// Text generator could not be reached
    #[error("interpretation failed: {0}")]
    Interpretation(#[from] LLMError),

    #[error("stage timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors surfaced by [`crate::PipelineDirector::analyze`]
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Query blank or no valid ticker could be resolved
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Aggregator could not produce a recommendation
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<EnvError> for PipelineError {
    fn from(err: EnvError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

impl From<LLMError> for PipelineError {
    fn from(err: LLMError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result type alias for a single stage
pub type StageOutcome<T> = std::result::Result<T, StageError>;

/// Result type alias for collaborator calls
pub type DataResult<T> = std::result::Result<T, DataError>;
