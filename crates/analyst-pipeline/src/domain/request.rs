//! The classified request that drives one pipeline run

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Holding period the recommendation is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeHorizon {
    Intraday,
    #[default]
    Swing,
    Positional,
    #[serde(alias = "long_term", alias = "long-term")]
    Longterm,
}

impl TimeHorizon {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intraday => "intraday",
            Self::Swing => "swing",
            Self::Positional => "positional",
            Self::Longterm => "longterm",
        }
    }
}

impl fmt::Display for TimeHorizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeHorizon {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "intraday" | "shortterm" => Ok(Self::Intraday),
            "swing" => Ok(Self::Swing),
            "positional" => Ok(Self::Positional),
            "longterm" => Ok(Self::Longterm),
            other => Err(format!("unknown time horizon: {other}")),
        }
    }
}

/// Which dimension the user asked about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Technical,
    Fundamental,
    Sentiment,
    #[default]
    Composite,
}

impl AnalysisType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::Fundamental => "fundamental",
            Self::Sentiment => "sentiment",
            Self::Composite => "composite",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "technical" => Ok(Self::Technical),
            "fundamental" => Ok(Self::Fundamental),
            "sentiment" => Ok(Self::Sentiment),
            "composite" => Ok(Self::Composite),
            other => Err(format!("unknown analysis type: {other}")),
        }
    }
}

/// Classified request. Built once by the classifier, never mutated after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub query: String,
    pub ticker: String,
    pub time_horizon: TimeHorizon,
    pub analysis_type: AnalysisType,
    pub session_id: String,
}

/// Upper bound on a ticker, exchange prefix and suffix included
pub const MAX_SYMBOL_LEN: usize = 20;

/// Whether `symbol` looks like something a market-data provider can resolve.
///
/// Accepts exchange tickers (`RELIANCE`, `M&M`, `BAJAJ-AUTO`), suffixed
/// forms (`INFY.NS`) and index symbols (`^NSEI`). At least one letter is
/// required.
pub fn is_valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LEN
        && symbol.chars().any(|c| c.is_ascii_alphabetic())
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '^' | '.' | '-' | '&' | '_'))
}

/// Trim and uppercase a ticker as typed by a user or a model.
pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_validation() {
        for ok in ["RELIANCE", "INFY.NS", "^NSEI", "M&M", "BAJAJ-AUTO", "TCS.BO"] {
            assert!(is_valid_symbol(ok), "{ok} should be valid");
        }
        for bad in ["", "   ", "123", "RELI ANCE", "DROP;TABLE", "AVERYVERYLONGTICKERNAME"] {
            assert!(!is_valid_symbol(bad), "{bad} should be invalid");
        }
        assert_eq!(normalize_ticker("  tcs "), "TCS");
    }

    #[test]
    fn test_horizon_parsing() {
        assert_eq!("Intraday".parse::<TimeHorizon>(), Ok(TimeHorizon::Intraday));
        assert_eq!("long_term".parse::<TimeHorizon>(), Ok(TimeHorizon::Longterm));
        assert_eq!("long-term".parse::<TimeHorizon>(), Ok(TimeHorizon::Longterm));
        assert!("weekly".parse::<TimeHorizon>().is_err());
    }

    #[test]
    fn test_horizon_serde() {
        let json = serde_json::to_string(&TimeHorizon::Longterm).unwrap();
        assert_eq!(json, "\"longterm\"");
        let back: TimeHorizon = serde_json::from_str("\"long_term\"").unwrap();
        assert_eq!(back, TimeHorizon::Longterm);
    }

    #[test]
    fn test_analysis_type_parsing() {
        assert_eq!(" Technical ".parse::<AnalysisType>(), Ok(AnalysisType::Technical));
        assert!("macro".parse::<AnalysisType>().is_err());
    }
}
