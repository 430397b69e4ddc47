//! Technical stage: candles through the sandbox, then model interpretation

use super::{AnalysisStage, default_confidence, signal_for};
use crate::domain::{AnalysisRequest, MarketSnapshot, StageKind, StageResult, StageSignal};
use crate::error::{DataError, StageError, StageOutcome};
use crate::market::MarketDataProvider;
use crate::prompts::{self, TECHNICAL_SYSTEM, TECHNICAL_USER, fmt_opt};
use analyst_llm::{ParseOutcome, TextGenerator, parse_or_fallback, truncate_chars};
use analyst_sandbox::{MetricValue, SandboxExecutionRequest, SandboxExecutor};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Indicator computation run inside the sandbox for every request
pub const INDICATOR_SNIPPET: &str = r#"
let price = last(close);

let r = rsi(close, 14);
result.rsi = round(last(r), 2);

let m = macd(close, 12, 26, 9);
let macd_line = last(m.macd);
let signal_line = last(m.signal);
result.macd_line = round(macd_line, 4);
result.macd_signal_line = round(signal_line, 4);
result.macd_signal = if macd_line > signal_line { "bullish_crossover" } else { "bearish_crossover" };

let bb = bbands(close, 20, 2.0);
let upper = last(bb.upper);
let lower = last(bb.lower);
result.bb_upper = round(upper, 2);
result.bb_mid = round(last(bb.middle), 2);
result.bb_lower = round(lower, 2);
result.bb_position = if price >= upper {
    "above_upper"
} else if price <= lower {
    "below_lower"
} else {
    "within"
};

result.sma_20 = round(last(sma(close, 20)), 2);

let highs = [];
for h in tail(high, 5) { highs.push(round(h, 2)); }
result.recent_highs = highs;

let lows = [];
for l in tail(low, 5) { lows.push(round(l, 2)); }
result.recent_lows = lows;

result.current_close = round(price, 2);
"#;

#[derive(Debug, Deserialize)]
struct TechnicalReply {
    signal: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    support_levels: Vec<f64>,
    #[serde(default)]
    resistance_levels: Vec<f64>,
}

struct Interpretation {
    signal: StageSignal,
    confidence: f64,
    summary: String,
    reasoning: String,
    support_levels: Vec<f64>,
    resistance_levels: Vec<f64>,
}

/// Fetches candles, computes indicators in the sandbox and asks the
/// generator to read them.
pub struct TechnicalStage {
    market: Arc<dyn MarketDataProvider>,
    sandbox: Arc<SandboxExecutor>,
    generator: Arc<dyn TextGenerator>,
    interval: String,
    lookback_days: u32,
    deadline: Duration,
}

impl TechnicalStage {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        sandbox: Arc<SandboxExecutor>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let deadline = sandbox.config().default_deadline;
        Self {
            market,
            sandbox,
            generator,
            interval: "1d".to_string(),
            lookback_days: 60,
            deadline,
        }
    }

    pub fn with_candles(mut self, interval: impl Into<String>, lookback_days: u32) -> Self {
        self.interval = interval.into();
        self.lookback_days = lookback_days;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    fn interpret(
        &self,
        ticker: &str,
        raw: &str,
        indicators: &BTreeMap<String, MetricValue>,
    ) -> ParseOutcome<Interpretation> {
        parse_or_fallback(
            raw,
            |reply: TechnicalReply| {
                Ok(Interpretation {
                    signal: signal_for(StageKind::Technical, &reply.signal)?,
                    confidence: reply.confidence,
                    summary: reply.summary,
                    reasoning: reply.reasoning,
                    support_levels: reply.support_levels,
                    resistance_levels: reply.resistance_levels,
                })
            },
            |raw| Interpretation {
                signal: StageSignal::Neutral,
                confidence: 0.3,
                summary: format!("Technical analysis for {ticker} (model output unreadable)"),
                reasoning: truncate_chars(raw, 300),
                support_levels: indicators
                    .get("recent_lows")
                    .map(MetricValue::numbers)
                    .unwrap_or_default(),
                resistance_levels: indicators
                    .get("recent_highs")
                    .map(MetricValue::numbers)
                    .unwrap_or_default(),
            },
        )
    }
}

#[async_trait]
impl AnalysisStage for TechnicalStage {
    fn kind(&self) -> StageKind {
        StageKind::Technical
    }

    #[instrument(skip_all, fields(ticker = %request.ticker, stage = "technical"))]
    async fn run(&self, request: &AnalysisRequest) -> StageOutcome<ParseOutcome<StageResult>> {
        let ticker = request.ticker.as_str();
        let (candles, snapshot) = tokio::join!(
            self.market.candles(ticker, &self.interval, self.lookback_days),
            self.market.snapshot(ticker),
        );

        let candles = candles?;
        if candles.is_empty() {
            return Err(StageError::Fetch(DataError::DataUnavailable {
                symbol: ticker.to_string(),
                reason: "no candles returned".to_string(),
            }));
        }
        let snapshot = snapshot.unwrap_or_else(|e| {
            warn!(error = %e, "Snapshot unavailable, continuing with candles only");
            MarketSnapshot::default()
        });

        let dataset = candles.iter().map(|c| c.to_ohlcv()).collect();
        let output = self
            .sandbox
            .execute(SandboxExecutionRequest::new(INDICATOR_SNIPPET, dataset, self.deadline))
            .await?;
        debug!(
            operations = output.operations,
            elapsed_ms = output.elapsed.as_millis() as u64,
            "Indicators computed"
        );
        let indicators = output.values;

        let current_close = indicators.get("current_close").and_then(MetricValue::as_f64);
        let price = snapshot.price.or(current_close);
        let indicator_json = serde_json::to_string_pretty(&indicators)
            .map_err(|e| StageError::Compute(e.to_string()))?;
        let user = prompts::render(
            TECHNICAL_USER,
            &json!({
                "ticker": ticker,
                "price": fmt_opt(price),
                "high_52w": fmt_opt(snapshot.high_52w),
                "low_52w": fmt_opt(snapshot.low_52w),
                "query": request.query,
                "indicators": indicator_json,
            }),
        )
        .map_err(|e| StageError::Compute(format!("prompt rendering failed: {e}")))?;

        let raw = self.generator.generate(TECHNICAL_SYSTEM, &user).await?;
        let ParseOutcome {
            value: reading,
            fallback_reason,
        } = self.interpret(ticker, &raw, &indicators);
        if let Some(reason) = &fallback_reason {
            warn!(reason = %reason, "Technical interpretation fell back to NEUTRAL");
        }

        let mut result = StageResult::new(
            StageKind::Technical,
            reading.signal,
            reading.confidence,
            reading.summary,
        )
        .with_source(format!("{}:{ticker}", self.market.name()));
        for (name, value) in indicators {
            result = result.with_metric(name, value);
        }
        result = result
            .with_optional_metric("price", price)
            .with_optional_metric("high_52w", snapshot.high_52w)
            .with_optional_metric("low_52w", snapshot.low_52w)
            .with_metric("support_levels", reading.support_levels)
            .with_metric("resistance_levels", reading.resistance_levels)
            .with_metric("reasoning", reading.reasoning);

        Ok(ParseOutcome {
            value: result,
            fallback_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnalysisType, Candle, TimeHorizon};
    use crate::market::MockMarketDataProvider;
    use crate::testing::{FailingGenerator, ScriptedGenerator};
    use analyst_sandbox::SandboxConfig;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn candles(n: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let base = 2_800.0 + (i as f64 * 0.4).sin() * 30.0 + i as f64 * 2.0;
                Candle {
                    ticker: "RELIANCE".to_string(),
                    timestamp: start + ChronoDuration::days(i as i64),
                    open: base - 5.0,
                    high: base + 12.0,
                    low: base - 12.0,
                    close: base,
                    volume: 1_000_000 + i as u64,
                    interval: "1d".to_string(),
                }
            })
            .collect()
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            query: "RELIANCE: chart view?".to_string(),
            ticker: "RELIANCE".to_string(),
            time_horizon: TimeHorizon::Swing,
            analysis_type: AnalysisType::Technical,
            session_id: "test".to_string(),
        }
    }

    fn market(n: usize) -> MockMarketDataProvider {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_name().return_const("yahoo".to_string());
        mock.expect_candles().returning(move |_, _, _| Ok(candles(n)));
        mock.expect_snapshot().returning(|s| {
            Ok(MarketSnapshot {
                symbol: s.to_string(),
                price: Some(2_900.0),
                high_52w: Some(3_200.0),
                low_52w: Some(2_200.0),
                ..MarketSnapshot::default()
            })
        });
        mock
    }

    fn stage(market: MockMarketDataProvider, generator: Arc<dyn TextGenerator>) -> TechnicalStage {
        TechnicalStage::new(
            Arc::new(market),
            Arc::new(SandboxExecutor::new(SandboxConfig::default())),
            generator,
        )
    }

    #[tokio::test]
    async fn test_indicators_and_interpretation() {
        let generator = Arc::new(ScriptedGenerator::new(
            r#"{"signal":"BULLISH","confidence":0.72,"summary":"Higher highs","reasoning":"MACD above signal","support_levels":[2850.0],"resistance_levels":[3000.0]}"#,
        ));
        let outcome = stage(market(60), generator.clone()).run(&request()).await.unwrap();

        assert!(!outcome.is_fallback());
        let result = outcome.value;
        assert_eq!(result.kind, StageKind::Technical);
        assert_eq!(result.signal, StageSignal::Bullish);
        assert!((result.confidence() - 0.72).abs() < 1e-9);

        let rsi = result.metric_f64("rsi").unwrap();
        assert!((0.0..=100.0).contains(&rsi));
        assert!(matches!(
            result.metric_str("macd_signal"),
            Some("bullish_crossover" | "bearish_crossover")
        ));
        assert!(matches!(
            result.metric_str("bb_position"),
            Some("above_upper" | "below_lower" | "within")
        ));
        assert_eq!(result.metric("recent_highs").unwrap().numbers().len(), 5);
        assert_eq!(result.metric_f64("price"), Some(2_900.0));
        assert_eq!(result.metric("support_levels").unwrap().numbers(), vec![2850.0]);
        assert_eq!(result.sources, vec!["yahoo:RELIANCE"]);

        let prompt = &generator.user_prompts()[0];
        assert!(prompt.contains("\"rsi\""));
        assert!(prompt.contains("52-Week High: 3200.00"));
    }

    #[tokio::test]
    async fn test_unparsable_reply_is_neutral() {
        let generator = Arc::new(ScriptedGenerator::new("The chart looks fine to me."));
        let outcome = stage(market(40), generator).run(&request()).await.unwrap();

        assert!(outcome.is_fallback());
        assert_eq!(outcome.value.signal, StageSignal::Neutral);
        assert!((outcome.value.confidence() - 0.3).abs() < 1e-9);
        assert_eq!(outcome.value.metric("support_levels").unwrap().numbers().len(), 5);
    }

    #[tokio::test]
    async fn test_empty_candles_is_fetch_error() {
        let generator = Arc::new(ScriptedGenerator::new("{}"));
        let err = stage(market(0), generator.clone()).run(&request()).await.unwrap_err();

        assert!(matches!(err, StageError::Fetch(DataError::DataUnavailable { .. })));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_generator_failure_is_interpretation_error() {
        let err = stage(market(30), Arc::new(FailingGenerator))
            .run(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Interpretation(_)));
    }

    #[tokio::test]
    async fn test_snapshot_failure_degrades() {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_name().return_const("yahoo".to_string());
        mock.expect_candles().returning(|_, _, _| Ok(candles(30)));
        mock.expect_snapshot()
            .returning(|_| Err(DataError::provider("yahoo", "rate limited")));

        let generator = Arc::new(ScriptedGenerator::new(r#"{"signal":"NEUTRAL","confidence":0.5}"#));
        let result = stage(mock, generator).run(&request()).await.unwrap().value;

        assert!(result.metric("high_52w").is_none());
        assert_eq!(result.metric_f64("price"), result.metric_f64("current_close"));
    }
}
