//! Configuration for pipeline runs

use crate::domain::is_valid_symbol;
use crate::error::{PipelineError, Result};
use crate::risk::RiskThresholds;
use analyst_sandbox::SandboxConfig;
use analyst_utils::{env_duration_secs, env_list, env_parse, env_string};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Models tried in order when none are configured
pub const DEFAULT_MODELS: [&str; 3] = ["gemini-2.0-flash-lite", "gemini-2.0-flash", "gemini-2.5-flash"];

/// Configuration for the pipeline director and its stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Budget for each analysis stage, sandbox included
    pub stage_timeout: Duration,

    /// Interpreter limits and deadline for indicator snippets
    pub sandbox: SandboxConfig,

    /// Candle interval requested from the market-data provider
    pub candle_interval: String,

    /// Days of candles fetched for the technical stage
    pub lookback_days: u32,

    /// Maximum headlines fed to the sentiment stage
    pub news_limit: usize,

    /// Maximum report excerpts fed to the fundamental stage
    pub document_limit: usize,

    /// Ticker used when a query names none
    pub default_ticker: String,

    pub risk: RiskThresholds,

    /// Cache TTL for candles
    pub cache_ttl_candles: Duration,

    /// Cache TTL for snapshots
    pub cache_ttl_snapshot: Duration,

    /// Ordered model chain
    pub models: Vec<String>,

    pub max_tokens: usize,

    pub temperature: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(45),
            sandbox: SandboxConfig::default(),
            candle_interval: "1d".to_string(),
            lookback_days: 60,
            news_limit: 20,
            document_limit: 5,
            default_ticker: "NIFTY".to_string(),
            risk: RiskThresholds::default(),
            cache_ttl_candles: Duration::from_secs(300),   // 5 minutes
            cache_ttl_snapshot: Duration::from_secs(3600), // 1 hour
            models: DEFAULT_MODELS.iter().map(ToString::to_string).collect(),
            max_tokens: 1024,
            temperature: 0.1,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Build from `ANALYST_*` environment variables over the defaults
    pub fn from_env() -> Result<Self> {
        Self::builder().with_env()?.build()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.stage_timeout.is_zero() {
            return Err(PipelineError::Config(
                "stage_timeout must be greater than 0".to_string(),
            ));
        }

        if self.sandbox.default_deadline.is_zero() {
            return Err(PipelineError::Config(
                "sandbox deadline must be greater than 0".to_string(),
            ));
        }

        if self.sandbox.default_deadline >= self.stage_timeout {
            return Err(PipelineError::Config(format!(
                "sandbox deadline ({:?}) must be shorter than stage_timeout ({:?})",
                self.sandbox.default_deadline, self.stage_timeout
            )));
        }

        if self.lookback_days == 0 {
            return Err(PipelineError::Config(
                "lookback_days must be greater than 0".to_string(),
            ));
        }

        if self.candle_interval.trim().is_empty() {
            return Err(PipelineError::Config("candle_interval is empty".to_string()));
        }

        if !is_valid_symbol(&self.default_ticker) {
            return Err(PipelineError::Config(format!(
                "default_ticker {:?} is not a valid symbol",
                self.default_ticker
            )));
        }

        if self.models.is_empty() {
            return Err(PipelineError::Config(
                "at least one model is required".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(PipelineError::Config(
                "temperature must be within [0, 2]".to_string(),
            ));
        }

        self.risk.validate().map_err(PipelineError::Config)?;

        Ok(())
    }
}

/// Builder for PipelineConfig
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    stage_timeout: Option<Duration>,
    sandbox: Option<SandboxConfig>,
    sandbox_deadline: Option<Duration>,
    candle_interval: Option<String>,
    lookback_days: Option<u32>,
    news_limit: Option<usize>,
    document_limit: Option<usize>,
    default_ticker: Option<String>,
    risk: Option<RiskThresholds>,
    cache_ttl_candles: Option<Duration>,
    cache_ttl_snapshot: Option<Duration>,
    models: Option<Vec<String>>,
    max_tokens: Option<usize>,
    temperature: Option<f32>,
}

impl PipelineConfigBuilder {
    pub fn stage_timeout(mut self, duration: Duration) -> Self {
        self.stage_timeout = Some(duration);
        self
    }

    /// Replace the whole sandbox configuration
    pub fn sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// Override only the sandbox deadline
    pub fn sandbox_deadline(mut self, duration: Duration) -> Self {
        self.sandbox_deadline = Some(duration);
        self
    }

    pub fn candle_interval(mut self, interval: impl Into<String>) -> Self {
        self.candle_interval = Some(interval.into());
        self
    }

    pub fn lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = Some(days);
        self
    }

    pub fn news_limit(mut self, limit: usize) -> Self {
        self.news_limit = Some(limit);
        self
    }

    pub fn document_limit(mut self, limit: usize) -> Self {
        self.document_limit = Some(limit);
        self
    }

    pub fn default_ticker(mut self, ticker: impl Into<String>) -> Self {
        self.default_ticker = Some(ticker.into().trim().to_uppercase());
        self
    }

    pub fn risk_thresholds(mut self, risk: RiskThresholds) -> Self {
        self.risk = Some(risk);
        self
    }

    pub fn cache_ttl_candles(mut self, duration: Duration) -> Self {
        self.cache_ttl_candles = Some(duration);
        self
    }

    pub fn cache_ttl_snapshot(mut self, duration: Duration) -> Self {
        self.cache_ttl_snapshot = Some(duration);
        self
    }

    pub fn models(mut self, models: Vec<String>) -> Self {
        self.models = Some(models);
        self
    }

    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Fill unset fields from `ANALYST_*` variables.
    ///
    /// Values already set on the builder win over the environment.
    pub fn with_env(mut self) -> Result<Self> {
        self.stage_timeout = self
            .stage_timeout
            .or(env_duration_secs("ANALYST_STAGE_TIMEOUT_SECS")?);
        self.sandbox_deadline = self
            .sandbox_deadline
            .or(env_duration_secs("ANALYST_SANDBOX_DEADLINE_SECS")?);
        self.candle_interval = self
            .candle_interval
            .or_else(|| env_string("ANALYST_CANDLE_INTERVAL"));
        self.lookback_days = self
            .lookback_days
            .or(env_parse("ANALYST_LOOKBACK_DAYS")?);
        self.news_limit = self.news_limit.or(env_parse("ANALYST_NEWS_LIMIT")?);
        self.document_limit = self
            .document_limit
            .or(env_parse("ANALYST_DOCUMENT_LIMIT")?);
        self.default_ticker = self.default_ticker.or_else(|| {
            env_string("ANALYST_DEFAULT_TICKER").map(|t| t.to_uppercase())
        });
        self.cache_ttl_candles = self
            .cache_ttl_candles
            .or(env_duration_secs("ANALYST_CACHE_TTL_CANDLES_SECS")?);
        self.cache_ttl_snapshot = self
            .cache_ttl_snapshot
            .or(env_duration_secs("ANALYST_CACHE_TTL_SNAPSHOT_SECS")?);
        self.models = self.models.or_else(|| env_list("ANALYST_MODELS"));
        self.max_tokens = self.max_tokens.or(env_parse("ANALYST_MAX_TOKENS")?);
        self.temperature = self.temperature.or(env_parse("ANALYST_TEMPERATURE")?);
        Ok(self)
    }

    /// Build the configuration
    pub fn build(self) -> Result<PipelineConfig> {
        let defaults = PipelineConfig::default();

        let mut sandbox = self.sandbox.unwrap_or(defaults.sandbox);
        if let Some(deadline) = self.sandbox_deadline {
            sandbox.default_deadline = deadline;
        }

        let config = PipelineConfig {
            stage_timeout: self.stage_timeout.unwrap_or(defaults.stage_timeout),
            sandbox,
            candle_interval: self.candle_interval.unwrap_or(defaults.candle_interval),
            lookback_days: self.lookback_days.unwrap_or(defaults.lookback_days),
            news_limit: self.news_limit.unwrap_or(defaults.news_limit),
            document_limit: self.document_limit.unwrap_or(defaults.document_limit),
            default_ticker: self.default_ticker.unwrap_or(defaults.default_ticker),
            risk: self.risk.unwrap_or(defaults.risk),
            cache_ttl_candles: self.cache_ttl_candles.unwrap_or(defaults.cache_ttl_candles),
            cache_ttl_snapshot: self.cache_ttl_snapshot.unwrap_or(defaults.cache_ttl_snapshot),
            models: self.models.unwrap_or(defaults.models),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: self.temperature.unwrap_or(defaults.temperature),
        };

        config.validate()?;
        Ok(config)
    }
}
