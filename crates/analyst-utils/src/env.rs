//! Typed environment variable lookups

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// A variable was present but could not be interpreted
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value for {key}: {value:?} ({reason})")]
pub struct EnvError {
    pub key: String,
    pub value: String,
    pub reason: String,
}

/// Read a non-empty string variable.
pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a variable into `T`. Unset or blank yields `Ok(None)`.
pub fn env_parse<T>(key: &str) -> Result<Option<T>, EnvError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|e| EnvError {
            key: key.to_string(),
            value: raw,
            reason: e.to_string(),
        }),
    }
}

/// Read a whole number of seconds as a [`Duration`].
pub fn env_duration_secs(key: &str) -> Result<Option<Duration>, EnvError> {
    env_parse::<u64>(key).map(|v| v.map(Duration::from_secs))
}

/// Read a comma separated list, dropping empty entries.
pub fn env_list(key: &str) -> Option<Vec<String>> {
    env_string(key).map(|raw| split_list(&raw)).filter(|v| !v.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list("gemini-2.0-flash, gemini-2.5-flash,,"),
            vec!["gemini-2.0-flash".to_string(), "gemini-2.5-flash".to_string()]
        );
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn test_env_parse_unset() {
        let value: Option<u64> = env_parse("ANALYST_TEST_DEFINITELY_UNSET_VAR").unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_env_parse_invalid() {
        // SAFETY: test-local variable name not read by any other test
        unsafe {
            std::env::set_var("ANALYST_TEST_BAD_NUMBER", "ten");
        }
        let err = env_parse::<u64>("ANALYST_TEST_BAD_NUMBER").unwrap_err();
        assert_eq!(err.key, "ANALYST_TEST_BAD_NUMBER");
        assert_eq!(err.value, "ten");
    }

    #[test]
    fn test_env_duration() {
        // SAFETY: test-local variable name not read by any other test
        unsafe {
            std::env::set_var("ANALYST_TEST_TIMEOUT_SECS", "12");
        }
        assert_eq!(
            env_duration_secs("ANALYST_TEST_TIMEOUT_SECS").unwrap(),
            Some(Duration::from_secs(12))
        );
    }
}
