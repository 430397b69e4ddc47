//! Final output of a pipeline run

use super::request::TimeHorizon;
use super::stage::StageKind;
use analyst_sandbox::MetricValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Actionable call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSignal {
    Buy,
    Sell,
    Hold,
    Avoid,
}

impl TradeSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
            Self::Avoid => "AVOID",
        }
    }
}

impl fmt::Display for TradeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            "HOLD" => Ok(Self::Hold),
            "AVOID" => Ok(Self::Avoid),
            other => Err(format!("signal must be BUY, SELL, HOLD or AVOID, got {other:?}")),
        }
    }
}

/// Categorical risk tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskFlag {
    HighVolatility,
    EarningsUpcoming,
    LowLiquidity,
    StrongDowntrend,
    StrongUptrend,
    Overbought,
    Oversold,
    #[serde(rename = "NEAR_52W_HIGH")]
    Near52wHigh,
    #[serde(rename = "NEAR_52W_LOW")]
    Near52wLow,
}

impl RiskFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HighVolatility => "HIGH_VOLATILITY",
            Self::EarningsUpcoming => "EARNINGS_UPCOMING",
            Self::LowLiquidity => "LOW_LIQUIDITY",
            Self::StrongDowntrend => "STRONG_DOWNTREND",
            Self::StrongUptrend => "STRONG_UPTREND",
            Self::Overbought => "OVERBOUGHT",
            Self::Oversold => "OVERSOLD",
            Self::Near52wHigh => "NEAR_52W_HIGH",
            Self::Near52wLow => "NEAR_52W_LOW",
        }
    }
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a pipeline run.
///
/// Only the synthesis aggregator builds these, and only whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub ticker: String,
    pub query: String,
    pub time_horizon: TimeHorizon,
    pub signal: TradeSignal,
    pub confidence: f64,
    pub reasoning: String,
    pub summary: String,
    pub key_metrics: BTreeMap<String, MetricValue>,
    pub risk_flags: BTreeSet<RiskFlag>,
    pub sources: Vec<String>,
    pub stages_used: BTreeSet<StageKind>,
    pub top_headlines: Vec<String>,
}
