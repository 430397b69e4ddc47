//! Error types for sandboxed execution

use std::time::Duration;
use thiserror::Error;

/// Typed failure of a sandbox execution
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SandboxError {
    /// The deadline passed before the snippet finished
    #[error("snippet exceeded its {deadline:?} deadline")]
    Timeout { deadline: Duration },

    /// The snippet ran but `result` has the wrong shape
    #[error("result contract violated: {0}")]
    ContractViolation(String),

    /// The snippet tried to use something outside the allow-list
    #[error("capability violation: {0}")]
    CapabilityViolation(String),

    /// The snippet raised an error while computing
    #[error("snippet failed: {0}")]
    ComputeError(String),
}

impl SandboxError {
    /// Short stable label for logs and diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::ContractViolation(_) => "contract_violation",
            Self::CapabilityViolation(_) => "capability_violation",
            Self::ComputeError(_) => "compute_error",
        }
    }
}

/// Result type for sandbox operations
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
