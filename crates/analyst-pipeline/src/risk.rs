//! Deterministic mapping from indicators to risk flags

use crate::domain::{RiskFlag, StageResult, StageSignal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Cut-offs for every risk rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub overbought_rsi: f64,
    pub oversold_rsi: f64,
    /// Price at or above `near_high_ratio * high_52w` is near the high
    pub near_high_ratio: f64,
    /// Price at or below `near_low_ratio * low_52w` is near the low
    pub near_low_ratio: f64,
    /// Minimum technical confidence for a strong trend flag
    pub trend_confidence: f64,
    /// Sentiment scores below this flag high volatility
    pub negative_sentiment: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            overbought_rsi: 70.0,
            oversold_rsi: 30.0,
            near_high_ratio: 0.98,
            near_low_ratio: 1.02,
            trend_confidence: 0.75,
            negative_sentiment: -0.5,
        }
    }
}

impl RiskThresholds {
    pub fn validate(&self) -> Result<(), String> {
        let finite = [
            self.overbought_rsi,
            self.oversold_rsi,
            self.near_high_ratio,
            self.near_low_ratio,
            self.trend_confidence,
            self.negative_sentiment,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err("risk thresholds must be finite".to_string());
        }
        if !(0.0..=100.0).contains(&self.oversold_rsi)
            || !(0.0..=100.0).contains(&self.overbought_rsi)
            || self.oversold_rsi >= self.overbought_rsi
        {
            return Err("RSI thresholds must satisfy 0 <= oversold < overbought <= 100".to_string());
        }
        if self.near_high_ratio <= 0.0 || self.near_low_ratio <= 0.0 {
            return Err("52-week band ratios must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.trend_confidence) {
            return Err("trend_confidence must be within [0, 1]".to_string());
        }
        if !(-1.0..=1.0).contains(&self.negative_sentiment) {
            return Err("negative_sentiment must be within [-1, 1]".to_string());
        }
        Ok(())
    }
}

/// Inputs the rules read. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiskIndicators {
    pub rsi: Option<f64>,
    pub bb_position: Option<String>,
    pub price: Option<f64>,
    pub high_52w: Option<f64>,
    pub low_52w: Option<f64>,
    pub signal: Option<StageSignal>,
    pub confidence: Option<f64>,
}

impl RiskIndicators {
    /// Read indicator metrics off a technical stage result.
    ///
    /// `price` falls back to `current_close` when no quote was available.
    pub fn from_stage(stage: &StageResult) -> Self {
        Self {
            rsi: stage.metric_f64("rsi"),
            bb_position: stage.metric_str("bb_position").map(ToString::to_string),
            price: stage
                .metric_f64("price")
                .or_else(|| stage.metric_f64("current_close")),
            high_52w: stage.metric_f64("high_52w"),
            low_52w: stage.metric_f64("low_52w"),
            signal: Some(stage.signal),
            confidence: Some(stage.confidence()),
        }
    }
}

/// Derive the set of risk flags.
///
/// Pure and total: a rule whose inputs are missing is skipped, and the
/// returned set is ordered and free of duplicates.
pub fn derive_risk_flags(
    indicators: &RiskIndicators,
    sentiment_score: Option<f64>,
    thresholds: &RiskThresholds,
) -> BTreeSet<RiskFlag> {
    let mut flags = BTreeSet::new();

    if let Some(rsi) = indicators.rsi.filter(|v| v.is_finite()) {
        if rsi > thresholds.overbought_rsi {
            flags.insert(RiskFlag::Overbought);
        } else if rsi < thresholds.oversold_rsi {
            flags.insert(RiskFlag::Oversold);
        }
    }

    if matches!(
        indicators.bb_position.as_deref(),
        Some("above_upper" | "below_lower")
    ) {
        flags.insert(RiskFlag::HighVolatility);
    }

    if let Some(price) = indicators.price.filter(|v| v.is_finite()) {
        if indicators
            .high_52w
            .is_some_and(|high| high > 0.0 && price >= high * thresholds.near_high_ratio)
        {
            flags.insert(RiskFlag::Near52wHigh);
        }
        if indicators
            .low_52w
            .is_some_and(|low| low > 0.0 && price <= low * thresholds.near_low_ratio)
        {
            flags.insert(RiskFlag::Near52wLow);
        }
    }

    let strong = indicators
        .confidence
        .is_some_and(|c| c >= thresholds.trend_confidence);
    match indicators.signal {
        Some(StageSignal::Bullish) if strong => {
            flags.insert(RiskFlag::StrongUptrend);
        }
        Some(StageSignal::Bearish) if strong => {
            flags.insert(RiskFlag::StrongDowntrend);
        }
        _ => {}
    }

    if sentiment_score.is_some_and(|s| s < thresholds.negative_sentiment) {
        flags.insert(RiskFlag::HighVolatility);
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StageKind;

    fn thresholds() -> RiskThresholds {
        RiskThresholds::default()
    }

    #[test]
    fn test_overbought_without_strong_trend() {
        let indicators = RiskIndicators {
            rsi: Some(78.0),
            signal: Some(StageSignal::Bullish),
            confidence: Some(0.5),
            ..Default::default()
        };
        let flags = derive_risk_flags(&indicators, None, &thresholds());
        assert!(flags.contains(&RiskFlag::Overbought));
        assert!(!flags.contains(&RiskFlag::StrongUptrend));
    }

    #[test]
    fn test_rsi_boundaries_are_strict() {
        let at_70 = RiskIndicators {
            rsi: Some(70.0),
            ..Default::default()
        };
        assert!(derive_risk_flags(&at_70, None, &thresholds()).is_empty());

        let at_29 = RiskIndicators {
            rsi: Some(29.9),
            ..Default::default()
        };
        assert_eq!(
            derive_risk_flags(&at_29, None, &thresholds()),
            BTreeSet::from([RiskFlag::Oversold])
        );
    }

    #[test]
    fn test_band_breakout_and_negative_sentiment_deduplicate() {
        let indicators = RiskIndicators {
            bb_position: Some("below_lower".to_string()),
            ..Default::default()
        };
        let flags = derive_risk_flags(&indicators, Some(-0.8), &thresholds());
        assert_eq!(flags, BTreeSet::from([RiskFlag::HighVolatility]));
    }

    #[test]
    fn test_near_52_week_bands() {
        let near_high = RiskIndicators {
            price: Some(99.0),
            high_52w: Some(100.0),
            low_52w: Some(50.0),
            ..Default::default()
        };
        assert_eq!(
            derive_risk_flags(&near_high, None, &thresholds()),
            BTreeSet::from([RiskFlag::Near52wHigh])
        );

        let near_low = RiskIndicators {
            price: Some(51.0),
            high_52w: Some(100.0),
            low_52w: Some(50.0),
            ..Default::default()
        };
        assert_eq!(
            derive_risk_flags(&near_low, None, &thresholds()),
            BTreeSet::from([RiskFlag::Near52wLow])
        );

        let zero_high = RiskIndicators {
            price: Some(10.0),
            high_52w: Some(0.0),
            ..Default::default()
        };
        assert!(derive_risk_flags(&zero_high, None, &thresholds()).is_empty());
    }

    #[test]
    fn test_configurable_bands() {
        let indicators = RiskIndicators {
            price: Some(94.0),
            high_52w: Some(100.0),
            ..Default::default()
        };
        assert!(derive_risk_flags(&indicators, None, &thresholds()).is_empty());

        let wide = RiskThresholds {
            near_high_ratio: 0.9,
            ..RiskThresholds::default()
        };
        assert!(derive_risk_flags(&indicators, None, &wide).contains(&RiskFlag::Near52wHigh));
    }

    #[test]
    fn test_strong_downtrend() {
        let indicators = RiskIndicators {
            signal: Some(StageSignal::Bearish),
            confidence: Some(0.75),
            ..Default::default()
        };
        assert_eq!(
            derive_risk_flags(&indicators, Some(0.2), &thresholds()),
            BTreeSet::from([RiskFlag::StrongDowntrend])
        );
    }

    #[test]
    fn test_missing_inputs_yield_nothing() {
        let flags = derive_risk_flags(&RiskIndicators::default(), None, &thresholds());
        assert!(flags.is_empty());
    }

    #[test]
    fn test_from_stage_falls_back_to_close() {
        let stage = StageResult::new(StageKind::Technical, StageSignal::Bullish, 0.9, "up")
            .with_metric("rsi", 72.5)
            .with_metric("current_close", 101.0)
            .with_metric("high_52w", 102.0)
            .with_metric("bb_position", "within");
        let indicators = RiskIndicators::from_stage(&stage);
        assert_eq!(indicators.price, Some(101.0));
        let flags = derive_risk_flags(&indicators, None, &thresholds());
        assert_eq!(
            flags,
            BTreeSet::from([
                RiskFlag::StrongUptrend,
                RiskFlag::Overbought,
                RiskFlag::Near52wHigh
            ])
        );
    }

    #[test]
    fn test_threshold_validation() {
        assert!(RiskThresholds::default().validate().is_ok());
        let inverted = RiskThresholds {
            oversold_rsi: 80.0,
            ..RiskThresholds::default()
        };
        assert!(inverted.validate().is_err());
        let nan = RiskThresholds {
            near_low_ratio: f64::NAN,
            ..RiskThresholds::default()
        };
        assert!(nan.validate().is_err());
    }
}
