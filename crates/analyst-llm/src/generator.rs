//! The narrow text-generation seam consumed by analysis code
//!
//! Callers depend on [`TextGenerator`] only. [`ModelChain`] adapts any
//! [`LLMProvider`] to it and walks an ordered list of models until one
//! answers.

use crate::{CompletionRequest, LLMError, LLMProvider, Message, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// `generate(system, user) -> text`
///
/// Output is free text. Nothing guarantees it is well-formed JSON, so
/// every caller parses it with [`crate::json::parse_or_fallback`].
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system: &str, user: &str) -> Result<String>;
}

/// Ordered model fallback over a single provider
pub struct ModelChain {
    provider: Arc<dyn LLMProvider>,
    models: Vec<String>,
    max_tokens: usize,
    temperature: f32,
}

impl ModelChain {
    /// Create a chain; `models` are tried front to back.
    pub fn new(provider: Arc<dyn LLMProvider>, models: Vec<String>) -> Result<Self> {
        if models.is_empty() {
            return Err(LLMError::ConfigurationError(
                "model chain needs at least one model".to_string(),
            ));
        }
        Ok(Self {
            provider,
            models,
            max_tokens: 1024,
            temperature: 0.1,
        })
    }

    /// Set the maximum tokens for every attempt
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature for every attempt
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Models in the order they will be attempted
    pub fn models(&self) -> &[String] {
        &self.models
    }
}

#[async_trait]
impl TextGenerator for ModelChain {
    #[instrument(skip_all, fields(provider = %self.provider.name()))]
    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let mut last_error = None;

        for model in &self.models {
            let request = CompletionRequest::builder(model.as_str())
                .system(system)
                .add_message(Message::user(user))
                .max_tokens(self.max_tokens)
                .temperature(self.temperature)
                .build();

            match self.provider.complete(request).await {
                Ok(response) => {
                    debug!(
                        model = %model,
                        tokens = response.usage.total(),
                        "Generation succeeded"
                    );
                    return Ok(response.message.text().unwrap_or_default());
                }
                Err(e) if e.is_model_specific() => {
                    warn!(model = %model, error = %e, "Model failed, trying next in chain");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(LLMError::ChainExhausted {
            attempted: self.models.len(),
            last: last_error.map_or_else(|| "no attempts".to_string(), |e| e.to_string()),
        })
    }
}

/// Generator used when no provider is configured.
///
/// Every call fails, so each call site takes its deterministic fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _system: &str, _user: &str) -> Result<String> {
        Err(LLMError::ConfigurationError(
            "no LLM provider configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CompletionResponse, StopReason, TokenUsage};
    use std::sync::Mutex;

    /// Fails for every model except `good_model`, recording attempts
    struct FlakyProvider {
        good_model: &'static str,
        attempts: Mutex<Vec<String>>,
        auth_broken: bool,
    }

    #[async_trait]
    impl LLMProvider for FlakyProvider {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
            self.attempts.lock().unwrap().push(request.model.clone());
            if self.auth_broken {
                return Err(LLMError::AuthenticationFailed);
            }
            if request.model != self.good_model {
                return Err(LLMError::ModelNotFound(request.model));
            }
            Ok(CompletionResponse {
                message: Message::assistant(format!("answer from {}", request.model)),
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
            })
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn chain(provider: Arc<FlakyProvider>) -> ModelChain {
        ModelChain::new(
            provider,
            vec![
                "gemini-2.0-flash-lite".to_string(),
                "gemini-2.0-flash".to_string(),
                "gemini-2.5-flash".to_string(),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_chain_falls_through_to_working_model() {
        let provider = Arc::new(FlakyProvider {
            good_model: "gemini-2.0-flash",
            attempts: Mutex::new(Vec::new()),
            auth_broken: false,
        });
        let text = chain(Arc::clone(&provider)).generate("sys", "user").await.unwrap();

        assert_eq!(text, "answer from gemini-2.0-flash");
        assert_eq!(
            *provider.attempts.lock().unwrap(),
            vec!["gemini-2.0-flash-lite", "gemini-2.0-flash"]
        );
    }

    #[tokio::test]
    async fn test_chain_exhausted() {
        let provider = Arc::new(FlakyProvider {
            good_model: "none",
            attempts: Mutex::new(Vec::new()),
            auth_broken: false,
        });
        let err = chain(Arc::clone(&provider)).generate("sys", "user").await.unwrap_err();

        assert!(matches!(err, LLMError::ChainExhausted { attempted: 3, .. }));
        assert_eq!(provider.attempts.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_stops_chain() {
        let provider = Arc::new(FlakyProvider {
            good_model: "gemini-2.5-flash",
            attempts: Mutex::new(Vec::new()),
            auth_broken: true,
        });
        let err = chain(Arc::clone(&provider)).generate("sys", "user").await.unwrap_err();

        assert!(matches!(err, LLMError::AuthenticationFailed));
        assert_eq!(provider.attempts.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_chain_rejected() {
        let provider = Arc::new(FlakyProvider {
            good_model: "x",
            attempts: Mutex::new(Vec::new()),
            auth_broken: false,
        });
        assert!(ModelChain::new(provider, Vec::new()).is_err());
    }

    #[tokio::test]
    async fn test_disabled_generator_always_fails() {
        assert!(DisabledGenerator.generate("a", "b").await.is_err());
    }
}
