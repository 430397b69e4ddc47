//! Lenient parsing of model output into typed values
//!
//! Models wrap JSON in markdown fences, prepend chatter, or return
//! something else entirely. [`parse_or_fallback`] is the one place that
//! copes with all of that: it extracts the JSON object, deserializes it into
//! a declared shape, validates it, and otherwise hands back the caller's
//! explicit default together with the reason parsing failed.

use serde::de::DeserializeOwned;

/// Value produced by a parse-or-fallback call
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome<T> {
    pub value: T,
    /// Why the fallback was used; `None` when the model output parsed.
    pub fallback_reason: Option<String>,
}

impl<T> ParseOutcome<T> {
    pub fn parsed(value: T) -> Self {
        Self {
            value,
            fallback_reason: None,
        }
    }

    pub fn fallback(value: T, reason: impl Into<String>) -> Self {
        Self {
            value,
            fallback_reason: Some(reason.into()),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// Pull a JSON object out of model text.
///
/// Handles fenced blocks (```json ... ```) first, then falls back to the
/// span from the first `{` to the last `}`.
pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        let mut inner = trimmed;
        if let Some(after_first) = inner.splitn(2, '\n').nth(1) {
            inner = after_first;
        }
        if let Some(end) = inner.rfind("```") {
            inner = &inner[..end];
        }
        let inner = inner.trim();
        if !inner.is_empty() {
            return Some(inner.to_string());
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

/// Parse `raw` as `R`, validate it into `T`, or use `fallback(raw)`.
///
/// `validate` rejects shapes that deserialize but are out of contract
/// (unknown enum labels and the like); its error string becomes the
/// fallback reason.
pub fn parse_or_fallback<R, T, V, F>(raw: &str, validate: V, fallback: F) -> ParseOutcome<T>
where
    R: DeserializeOwned,
    V: FnOnce(R) -> Result<T, String>,
    F: FnOnce(&str) -> T,
{
    let Some(json) = extract_json(raw) else {
        return ParseOutcome::fallback(fallback(raw), "no JSON object in model output");
    };

    let candidate = match serde_json::from_str::<R>(&json) {
        Ok(candidate) => candidate,
        Err(e) => {
            return ParseOutcome::fallback(fallback(raw), format!("malformed JSON: {e}"));
        }
    };

    match validate(candidate) {
        Ok(value) => ParseOutcome::parsed(value),
        Err(reason) => ParseOutcome::fallback(fallback(raw), reason),
    }
}

/// [`parse_or_fallback`] without a validation step.
pub fn parse_or_default<T, F>(raw: &str, fallback: F) -> ParseOutcome<T>
where
    T: DeserializeOwned,
    F: FnOnce(&str) -> T,
{
    parse_or_fallback(raw, Ok, fallback)
}

/// Truncate on a char boundary, for echoing raw model text back.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
