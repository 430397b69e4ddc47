//! Uniform output of every analysis stage

use analyst_sandbox::MetricValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The three independent analysis dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Technical,
    Fundamental,
    Sentiment,
}

impl StageKind {
    pub const ALL: [StageKind; 3] = [Self::Technical, Self::Fundamental, Self::Sentiment];

    pub fn name(self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::Fundamental => "fundamental",
            Self::Sentiment => "sentiment",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Directional read of one stage.
///
/// Technical stages speak BULLISH/BEARISH, fundamental and sentiment
/// stages POSITIVE/NEGATIVE; NEUTRAL is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StageSignal {
    Bullish,
    Bearish,
    Positive,
    Negative,
    Neutral,
}

impl StageSignal {
    /// +1 for bullish/positive, -1 for bearish/negative, 0 for neutral
    pub fn direction(self) -> f64 {
        match self {
            Self::Bullish | Self::Positive => 1.0,
            Self::Bearish | Self::Negative => -1.0,
            Self::Neutral => 0.0,
        }
    }

    pub fn is_bullish(self) -> bool {
        self.direction() > 0.0
    }

    pub fn is_bearish(self) -> bool {
        self.direction() < 0.0
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bullish => "BULLISH",
            Self::Bearish => "BEARISH",
            Self::Positive => "POSITIVE",
            Self::Negative => "NEGATIVE",
            Self::Neutral => "NEUTRAL",
        }
    }
}

impl fmt::Display for StageSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BULLISH" => Ok(Self::Bullish),
            "BEARISH" => Ok(Self::Bearish),
            "POSITIVE" => Ok(Self::Positive),
            "NEGATIVE" => Ok(Self::Negative),
            "NEUTRAL" => Ok(Self::Neutral),
            other => Err(format!("unknown stage signal: {other}")),
        }
    }
}

/// Clamp into `[0, 1]`; NaN and infinities become 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Normalized result of one stage. Read-only once handed to the director.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub kind: StageKind,
    pub signal: StageSignal,
    confidence: f64,
    pub summary: String,
    pub metrics: BTreeMap<String, MetricValue>,
    pub sources: Vec<String>,
}

impl StageResult {
    pub fn new(
        kind: StageKind,
        signal: StageSignal,
        confidence: f64,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            signal,
            confidence: clamp_unit(confidence),
            summary: summary.into(),
            metrics: BTreeMap::new(),
            sources: Vec::new(),
        }
    }

    /// Always within `[0, 1]`
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.metrics.insert(name.into(), value.into());
        self
    }

    /// Insert only when `value` is present
    pub fn with_optional_metric(self, name: &str, value: Option<impl Into<MetricValue>>) -> Self {
        match value {
            Some(v) => self.with_metric(name, v),
            None => self,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        let source = source.into();
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
        self
    }

    pub fn metric(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }

    pub fn metric_f64(&self, name: &str) -> Option<f64> {
        self.metric(name).and_then(MetricValue::as_f64)
    }

    pub fn metric_str(&self, name: &str) -> Option<&str> {
        self.metric(name).and_then(MetricValue::as_str)
    }
}
