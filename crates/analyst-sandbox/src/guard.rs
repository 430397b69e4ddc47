//! Static pre-execution check of snippet text
//!
//! The scan is token-based and deliberately blunt: a disallowed word
//! anywhere in the snippet, including inside a string literal or comment,
//! rejects it. False positives cost a rewrite; false negatives are caught
//! again by the runtime allow-list.

use crate::error::{SandboxError, SandboxResult};
use regex::Regex;

/// Words that never appear in a legitimate indicator snippet
pub const DISALLOWED_TOKENS: &[&str] = &[
    // module loading
    "import",
    "export",
    // dynamic evaluation and function pointers
    "eval",
    "Fn",
    "call",
    "curry",
    // process, filesystem and network
    "spawn",
    "exec",
    "system",
    "command",
    "fs",
    "env",
    "read_file",
    "write_file",
    "socket",
    // non-deterministic inputs
    "sleep",
    "timestamp",
];

/// Reject a snippet before it reaches the interpreter.
pub fn check_snippet(snippet: &str, max_bytes: usize) -> SandboxResult<()> {
    if snippet.len() > max_bytes {
        return Err(SandboxError::ContractViolation(format!(
            "snippet is {} bytes, limit is {max_bytes}",
            snippet.len()
        )));
    }

    if snippet.contains("::") {
        return Err(SandboxError::CapabilityViolation(
            "namespace paths (`::`) are not available".to_string(),
        ));
    }

    let alternation = DISALLOWED_TOKENS.join("|");
    let disallowed = Regex::new(&format!(r"\b(?:{alternation})\b"))
        .map_err(|e| SandboxError::ComputeError(format!("invalid guard pattern: {e}")))?;

    if let Some(found) = disallowed.find(snippet) {
        return Err(SandboxError::CapabilityViolation(format!(
            "disallowed token `{}`",
            found.as_str()
        )));
    }

    Ok(())
}
