//! Request orchestration
//!
//! The director owns one request from query to [`Recommendation`]:
//!
//! ```text
//! Init ──▶ Classified ──▶ StagesSettled ──▶ Synthesized ──▶ Done
//!   │                                            │
//!   └──────────────────▶ Failed ◀────────────────┘
//! ```
//!
//! The three stages run concurrently, each under its own timeout. A stage
//! that errors or times out is recorded as a [`StageDiagnostic`] and left
//! out of synthesis; it never takes the other stages down with it.

use crate::classifier::QueryClassifier;
use crate::config::PipelineConfig;
use crate::domain::{
    AnalysisRequest, Recommendation, StageKind, StageResult, is_valid_symbol, normalize_ticker,
};
use crate::error::{PipelineError, Result, StageError, StageOutcome};
use crate::market::MarketDataProvider;
use crate::retrieval::{DocumentSearch, KeywordStore};
use crate::risk::{RiskIndicators, derive_risk_flags};
use crate::stages::{AnalysisStage, FundamentalStage, SentimentStage, TechnicalStage};
use crate::synthesis::{SynthesisAggregator, SynthesisInput};
use analyst_llm::{ParseOutcome, TextGenerator};
use analyst_sandbox::SandboxExecutor;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Lifecycle of one `analyze` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    Classified,
    StagesSettled,
    Synthesized,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Classified => "classified",
            Self::StagesSettled => "stages_settled",
            Self::Synthesized => "synthesized",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a stage contributed nothing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageDiagnostic {
    pub stage: StageKind,
    pub reason: String,
}

/// What happened during one request
#[derive(Debug, Clone, Serialize)]
pub struct PipelineTrace {
    pub session_id: String,
    pub transitions: Vec<PipelineState>,
    pub diagnostics: Vec<StageDiagnostic>,
    /// `"<step>: <reason>"` for every model reply that was replaced by a default
    pub parse_fallbacks: Vec<String>,
    pub elapsed_ms: u64,
}

impl PipelineTrace {
    fn new(session_id: String) -> Self {
        Self {
            session_id,
            transitions: vec![PipelineState::Init],
            diagnostics: Vec::new(),
            parse_fallbacks: Vec::new(),
            elapsed_ms: 0,
        }
    }

    fn advance(&mut self, state: PipelineState) {
        self.transitions.push(state);
    }

    fn note_fallback<T>(&mut self, step: &str, outcome: &ParseOutcome<T>) {
        if let Some(reason) = &outcome.fallback_reason {
            self.parse_fallbacks.push(format!("{step}: {reason}"));
        }
    }

    /// Last state reached
    pub fn state(&self) -> PipelineState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(PipelineState::Init)
    }
}

/// Runs the full analysis pipeline
pub struct PipelineDirector {
    config: PipelineConfig,
    classifier: QueryClassifier,
    technical: Arc<dyn AnalysisStage>,
    fundamental: Arc<dyn AnalysisStage>,
    sentiment: Arc<dyn AnalysisStage>,
    aggregator: SynthesisAggregator,
}

impl fmt::Debug for PipelineDirector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineDirector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PipelineDirector {
    pub fn builder() -> PipelineDirectorBuilder {
        PipelineDirectorBuilder::new()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyze `query` and return the recommendation.
    ///
    /// `ticker`, when given, overrides whatever the classifier extracts and
    /// is prefixed to the query as `"{TICKER}: {query}"`.
    pub async fn analyze(
        &self,
        query: &str,
        ticker: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<Recommendation> {
        self.analyze_with_trace(query, ticker, session_id)
            .await
            .map(|(recommendation, _)| recommendation)
    }

    /// Same as [`Self::analyze`], also returning the request trace
    #[instrument(skip_all, fields(session_id = tracing::field::Empty))]
    pub async fn analyze_with_trace(
        &self,
        query: &str,
        ticker: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<(Recommendation, PipelineTrace)> {
        let started = Instant::now();
        let session_id = session_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map_or_else(|| Uuid::new_v4().to_string(), ToString::to_string);
        tracing::Span::current().record("session_id", session_id.as_str());

        let mut trace = PipelineTrace::new(session_id);
        let result = self.run(query, ticker, &mut trace).await;
        trace.elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(recommendation) => {
                trace.advance(PipelineState::Done);
                info!(
                    ticker = %recommendation.ticker,
                    signal = recommendation.signal.as_str(),
                    confidence = recommendation.confidence,
                    stages = recommendation.stages_used.len(),
                    elapsed_ms = trace.elapsed_ms,
                    "Analysis complete"
                );
                Ok((recommendation, trace))
            }
            Err(e) => {
                warn!(error = %e, reached = %trace.state(), "Analysis failed");
                trace.advance(PipelineState::Failed);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        query: &str,
        ticker: Option<&str>,
        trace: &mut PipelineTrace,
    ) -> Result<Recommendation> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PipelineError::InvalidRequest("query is empty".to_string()));
        }

        let ticker_override = match ticker.map(normalize_ticker).filter(|t| !t.is_empty()) {
            Some(t) if !is_valid_symbol(&t) => {
                return Err(PipelineError::InvalidRequest(format!("invalid ticker {t:?}")));
            }
            other => other,
        };
        let query = match &ticker_override {
            Some(t) => format!("{t}: {query}"),
            None => query.to_string(),
        };

        let classified = self.classifier.classify(&query).await;
        trace.note_fallback("classifier", &classified);
        let classification = classified.value;
        let ticker = ticker_override.unwrap_or(classification.ticker);
        if !is_valid_symbol(&ticker) {
            return Err(PipelineError::InvalidRequest(format!(
                "could not resolve a valid ticker, got {ticker:?}"
            )));
        }
        trace.advance(PipelineState::Classified);
        info!(
            ticker = %ticker,
            analysis_type = %classification.analysis_type,
            horizon = %classification.time_horizon,
            "Request classified"
        );

        let request = AnalysisRequest {
            query,
            ticker,
            time_horizon: classification.time_horizon,
            analysis_type: classification.analysis_type,
            session_id: trace.session_id.clone(),
        };

        let (technical, fundamental, sentiment) = tokio::join!(
            self.run_stage(self.technical.as_ref(), &request),
            self.run_stage(self.fundamental.as_ref(), &request),
            self.run_stage(self.sentiment.as_ref(), &request),
        );
        let technical = settle(StageKind::Technical, technical, trace);
        let fundamental = settle(StageKind::Fundamental, fundamental, trace);
        let sentiment = settle(StageKind::Sentiment, sentiment, trace);
        trace.advance(PipelineState::StagesSettled);

        let indicators = risk_indicators(technical.as_ref(), fundamental.as_ref());
        let sentiment_score = sentiment.as_ref().and_then(|s| s.metric_f64("score"));
        let risk_flags = derive_risk_flags(&indicators, sentiment_score, &self.config.risk);

        let input = SynthesisInput {
            ticker: &request.ticker,
            query: &request.query,
            horizon: request.time_horizon,
            technical: technical.as_ref(),
            fundamental: fundamental.as_ref(),
            sentiment: sentiment.as_ref(),
            risk_flags: &risk_flags,
        };
        let synthesized = self.aggregator.synthesize(&input).await?;
        trace.note_fallback("synthesis", &synthesized);
        trace.advance(PipelineState::Synthesized);

        Ok(synthesized.value)
    }

    async fn run_stage(
        &self,
        stage: &dyn AnalysisStage,
        request: &AnalysisRequest,
    ) -> StageOutcome<ParseOutcome<StageResult>> {
        let budget = self.config.stage_timeout;
        tokio::time::timeout(budget, stage.run(request))
            .await
            .unwrap_or(Err(StageError::Timeout(budget)))
    }
}

/// Turn a stage outcome into present-or-absent, recording what went wrong
fn settle(
    kind: StageKind,
    outcome: StageOutcome<ParseOutcome<StageResult>>,
    trace: &mut PipelineTrace,
) -> Option<StageResult> {
    match outcome {
        Ok(outcome) => {
            trace.note_fallback(kind.name(), &outcome);
            Some(outcome.value)
        }
        Err(e) => {
            warn!(stage = kind.name(), error = %e, "Stage produced no result");
            trace.diagnostics.push(StageDiagnostic {
                stage: kind,
                reason: e.to_string(),
            });
            None
        }
    }
}

/// Risk inputs from the technical stage, with price bands filled in from
/// the fundamental snapshot when the technical stage lacks them
fn risk_indicators(
    technical: Option<&StageResult>,
    fundamental: Option<&StageResult>,
) -> RiskIndicators {
    let mut indicators = technical.map(RiskIndicators::from_stage).unwrap_or_default();
    if let Some(fundamental) = fundamental {
        indicators.price = indicators.price.or_else(|| fundamental.metric_f64("price"));
        indicators.high_52w = indicators.high_52w.or_else(|| fundamental.metric_f64("high_52w"));
        indicators.low_52w = indicators.low_52w.or_else(|| fundamental.metric_f64("low_52w"));
    }
    indicators
}

/// Builder for [`PipelineDirector`]
///
/// A generator and a market-data provider are required. Document and news
/// search default to an empty [`KeywordStore`].
#[derive(Default)]
pub struct PipelineDirectorBuilder {
    config: Option<PipelineConfig>,
    generator: Option<Arc<dyn TextGenerator>>,
    market: Option<Arc<dyn MarketDataProvider>>,
    documents: Option<Arc<dyn DocumentSearch>>,
    news: Option<Arc<dyn DocumentSearch>>,
    technical: Option<Arc<dyn AnalysisStage>>,
    fundamental: Option<Arc<dyn AnalysisStage>>,
    sentiment: Option<Arc<dyn AnalysisStage>>,
}

impl PipelineDirectorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn market(mut self, market: Arc<dyn MarketDataProvider>) -> Self {
        self.market = Some(market);
        self
    }

    pub fn documents(mut self, documents: Arc<dyn DocumentSearch>) -> Self {
        self.documents = Some(documents);
        self
    }

    pub fn news(mut self, news: Arc<dyn DocumentSearch>) -> Self {
        self.news = Some(news);
        self
    }

    /// Replace one of the built-in stages
    pub fn stage(mut self, stage: Arc<dyn AnalysisStage>) -> Self {
        match stage.kind() {
            StageKind::Technical => self.technical = Some(stage),
            StageKind::Fundamental => self.fundamental = Some(stage),
            StageKind::Sentiment => self.sentiment = Some(stage),
        }
        self
    }

    pub fn build(self) -> Result<PipelineDirector> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let generator = self
            .generator
            .ok_or_else(|| PipelineError::Config("a text generator is required".to_string()))?;
        let market = self
            .market
            .ok_or_else(|| PipelineError::Config("a market data provider is required".to_string()))?;
        let documents = self
            .documents
            .unwrap_or_else(|| Arc::new(KeywordStore::new()));
        let news = self.news.unwrap_or_else(|| Arc::new(KeywordStore::new()));

        let technical = self.technical.unwrap_or_else(|| {
            let sandbox = Arc::new(SandboxExecutor::new(config.sandbox.clone()));
            Arc::new(
                TechnicalStage::new(Arc::clone(&market), sandbox, Arc::clone(&generator))
                    .with_candles(config.candle_interval.clone(), config.lookback_days)
                    .with_deadline(config.sandbox.default_deadline),
            )
        });
        let fundamental = self.fundamental.unwrap_or_else(|| {
            Arc::new(
                FundamentalStage::new(Arc::clone(&market), documents, Arc::clone(&generator))
                    .with_document_limit(config.document_limit),
            )
        });
        let sentiment = self.sentiment.unwrap_or_else(|| {
            Arc::new(
                SentimentStage::new(news, Arc::clone(&generator)).with_news_limit(config.news_limit),
            )
        });

        Ok(PipelineDirector {
            classifier: QueryClassifier::new(Arc::clone(&generator), config.default_ticker.clone()),
            aggregator: SynthesisAggregator::new(generator),
            technical,
            fundamental,
            sentiment,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Candle, MarketSnapshot, StageSignal, TradeSignal};
    use crate::error::DataError;
    use crate::market::MockMarketDataProvider;
    use crate::retrieval::RetrievedDocument;
    use crate::testing::{FailingGenerator, ScriptedGenerator};
    use analyst_sandbox::SandboxConfig;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::time::Duration;

    const CLASSIFIER_REPLY: &str =
        r#"{"ticker":"RELIANCE","analysis_type":"composite","time_horizon":"swing"}"#;
    const TECHNICAL_REPLY: &str = r#"{"signal":"BULLISH","confidence":0.7,"summary":"Uptrend"}"#;
    const FUNDAMENTAL_REPLY: &str =
        r#"{"signal":"POSITIVE","confidence":0.6,"summary":"Healthy balance sheet"}"#;
    const SENTIMENT_REPLY: &str =
        r#"{"score":0.4,"label":"POSITIVE","summary":"Upbeat coverage","confidence":0.6}"#;
    const SYNTHESIS_REPLY: &str = r#"{"signal":"BUY","confidence":0.68,"reasoning":"Stages agree","summary":"Constructive setup"}"#;

    fn generator() -> Arc<ScriptedGenerator> {
        Arc::new(
            ScriptedGenerator::new("not json")
                .on("query classifier", CLASSIFIER_REPLY)
                .on("technical analyst", TECHNICAL_REPLY)
                .on("fundamental analyst", FUNDAMENTAL_REPLY)
                .on("sentiment analyst", SENTIMENT_REPLY)
                .on("synthesizing", SYNTHESIS_REPLY),
        )
    }

    fn candles(n: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let close = 1_000.0 + i as f64 * 3.0 + (i as f64).cos() * 8.0;
                Candle {
                    ticker: "RELIANCE".to_string(),
                    timestamp: start + ChronoDuration::days(i as i64),
                    open: close - 2.0,
                    high: close + 6.0,
                    low: close - 6.0,
                    close,
                    volume: 500_000,
                    interval: "1d".to_string(),
                }
            })
            .collect()
    }

    fn market(candles_ok: bool) -> MockMarketDataProvider {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_name().return_const("yahoo".to_string());
        mock.expect_candles().returning(move |s, _, _| {
            if candles_ok {
                Ok(candles(60))
            } else {
                Err(DataError::DataUnavailable {
                    symbol: s.to_string(),
                    reason: "exchange closed".to_string(),
                })
            }
        });
        mock.expect_snapshot().returning(|s| {
            Ok(MarketSnapshot {
                symbol: s.to_string(),
                price: Some(1_180.0),
                high_52w: Some(1_400.0),
                low_52w: Some(900.0),
                pe_ratio: Some(24.0),
                ..MarketSnapshot::default()
            })
        });
        mock
    }

    async fn news_store() -> Arc<KeywordStore> {
        let store = Arc::new(KeywordStore::new());
        store
            .upsert("RELIANCE", RetrievedDocument::new("Reliance wins new energy contract", "wire"))
            .await;
        store
    }

    fn director(
        generator: Arc<dyn TextGenerator>,
        market: MockMarketDataProvider,
        news: Arc<KeywordStore>,
    ) -> PipelineDirector {
        PipelineDirector::builder()
            .generator(generator)
            .market(Arc::new(market))
            .news(news)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_full_run() {
        let generator = generator();
        let director = director(generator.clone(), market(true), news_store().await);
        let (rec, trace) = director
            .analyze_with_trace("Should I buy Reliance?", None, Some("s-1"))
            .await
            .unwrap();

        assert_eq!(rec.ticker, "RELIANCE");
        assert_eq!(rec.signal, TradeSignal::Buy);
        assert_eq!(rec.stages_used.len(), 3);
        assert_eq!(rec.top_headlines, vec!["Reliance wins new energy contract"]);
        assert!(rec.key_metrics.contains_key("rsi"));
        assert_eq!(trace.session_id, "s-1");
        assert_eq!(
            trace.transitions,
            vec![
                PipelineState::Init,
                PipelineState::Classified,
                PipelineState::StagesSettled,
                PipelineState::Synthesized,
                PipelineState::Done,
            ]
        );
        assert!(trace.diagnostics.is_empty());
        assert!(trace.parse_fallbacks.is_empty());
        // classifier, three stages, synthesis
        assert_eq!(generator.calls(), 5);
    }

    #[tokio::test]
    async fn test_technical_failure_is_isolated() {
        let director = director(generator(), market(false), news_store().await);
        let (rec, trace) = director
            .analyze_with_trace("Should I buy Reliance?", None, None)
            .await
            .unwrap();

        assert_eq!(trace.state(), PipelineState::Done);
        assert!(!rec.stages_used.contains(&StageKind::Technical));
        assert!(rec.stages_used.contains(&StageKind::Fundamental));
        assert!(rec.stages_used.contains(&StageKind::Sentiment));
        assert_eq!(trace.diagnostics.len(), 1);
        assert_eq!(trace.diagnostics[0].stage, StageKind::Technical);
        assert!(!trace.session_id.is_empty());
    }

    #[tokio::test]
    async fn test_all_stages_absent_holds() {
        let mut market = MockMarketDataProvider::new();
        market.expect_name().return_const("yahoo".to_string());
        market
            .expect_candles()
            .returning(|_, _, _| Err(DataError::provider("yahoo", "down")));
        market
            .expect_snapshot()
            .returning(|_| Err(DataError::provider("yahoo", "down")));

        // Everything fails: classifier falls back, stages cannot interpret.
        let director = director(Arc::new(FailingGenerator), market, news_store().await);
        let (rec, trace) = director
            .analyze_with_trace("Is the market bullish today?", None, None)
            .await
            .unwrap();

        assert_eq!(rec.signal, TradeSignal::Hold);
        assert!(rec.confidence <= 0.3);
        assert!(rec.stages_used.is_empty());
        assert_eq!(rec.ticker, "NIFTY");
        assert_eq!(trace.diagnostics.len(), 3);
        assert!(trace.parse_fallbacks.iter().any(|r| r.starts_with("classifier:")));
        assert!(trace.parse_fallbacks.iter().any(|r| r.starts_with("synthesis:")));
    }

    #[tokio::test]
    async fn test_ticker_override() {
        let generator = generator();
        let director = director(generator.clone(), market(true), news_store().await);
        let rec = director
            .analyze("what's the outlook?", Some(" tcs "), None)
            .await
            .unwrap();

        assert_eq!(rec.ticker, "TCS");
        assert_eq!(rec.query, "TCS: what's the outlook?");
        assert!(generator.user_prompts()[0].contains("TCS: what's the outlook?"));
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let director = director(generator(), market(true), news_store().await);

        let blank = director.analyze("   ", None, None).await.unwrap_err();
        assert!(matches!(blank, PipelineError::InvalidRequest(_)));

        let bad_ticker = director
            .analyze("outlook?", Some("$$$"), None)
            .await
            .unwrap_err();
        assert!(matches!(bad_ticker, PipelineError::InvalidRequest(_)));
    }

    struct StalledStage;

    #[async_trait]
    impl AnalysisStage for StalledStage {
        fn kind(&self) -> StageKind {
            StageKind::Sentiment
        }

        async fn run(&self, _request: &AnalysisRequest) -> StageOutcome<ParseOutcome<StageResult>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ParseOutcome::parsed(StageResult::new(
                StageKind::Sentiment,
                StageSignal::Neutral,
                0.5,
                "too late",
            )))
        }
    }

    #[tokio::test]
    async fn test_stage_timeout_becomes_diagnostic() {
        let config = PipelineConfig::builder()
            .stage_timeout(Duration::from_millis(200))
            .sandbox_deadline(Duration::from_millis(150))
            .build()
            .unwrap();
        let director = PipelineDirector::builder()
            .config(config)
            .generator(generator())
            .market(Arc::new(market(true)))
            .stage(Arc::new(StalledStage))
            .build()
            .unwrap();

        let started = Instant::now();
        let (rec, trace) = director
            .analyze_with_trace("Should I buy Reliance?", None, None)
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!rec.stages_used.contains(&StageKind::Sentiment));
        assert_eq!(trace.diagnostics.len(), 1);
        assert_eq!(trace.diagnostics[0].stage, StageKind::Sentiment);
        assert!(trace.diagnostics[0].reason.contains("timed out"));
    }

    fn director_with_technical(
        generator: Arc<ScriptedGenerator>,
        technical: TechnicalStage,
    ) -> PipelineDirector {
        PipelineDirector::builder()
            .generator(generator)
            .market(Arc::new(market(true)))
            .stage(Arc::new(technical))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_sandbox_timeout_drops_technical_stage() {
        let generator = generator();
        let technical = TechnicalStage::new(
            Arc::new(market(true)),
            Arc::new(SandboxExecutor::new(SandboxConfig::default())),
            generator.clone(),
        )
        .with_deadline(Duration::from_nanos(1));
        let director = director_with_technical(generator.clone(), technical);

        let (rec, trace) = director
            .analyze_with_trace("Should I buy Reliance?", None, None)
            .await
            .unwrap();

        assert_eq!(trace.state(), PipelineState::Done);
        assert!(!rec.stages_used.contains(&StageKind::Technical));
        assert!(rec.stages_used.contains(&StageKind::Fundamental));
        assert_eq!(trace.diagnostics.len(), 1);
        assert_eq!(trace.diagnostics[0].stage, StageKind::Technical);
        let reason = &trace.diagnostics[0].reason;
        assert!(reason.starts_with("sandbox:"), "{reason}");
        assert!(reason.contains("deadline"), "{reason}");
        // The technical analyst is never asked to interpret a failed computation.
        assert!(
            !generator
                .user_prompts()
                .iter()
                .any(|p| p.contains("Calculated Indicators"))
        );
    }

    #[tokio::test]
    async fn test_sandbox_budget_failure_drops_technical_stage() {
        let generator = generator();
        let sandbox = SandboxExecutor::new(SandboxConfig {
            max_operations: Some(50),
            ..SandboxConfig::default()
        });
        let technical =
            TechnicalStage::new(Arc::new(market(true)), Arc::new(sandbox), generator.clone());
        let director = director_with_technical(generator, technical);

        let (rec, trace) = director
            .analyze_with_trace("Should I buy Reliance?", None, None)
            .await
            .unwrap();

        assert_eq!(trace.state(), PipelineState::Done);
        assert_eq!(rec.stages_used.len(), 2);
        assert!(!rec.stages_used.contains(&StageKind::Technical));
        assert_eq!(trace.diagnostics[0].stage, StageKind::Technical);
        assert!(trace.diagnostics[0].reason.contains("operation budget"));
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let err = PipelineDirector::builder().build().unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));

        let err = PipelineDirector::builder()
            .generator(Arc::new(FailingGenerator))
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_risk_indicators_fill_from_fundamentals() {
        let fundamental = StageResult::new(StageKind::Fundamental, StageSignal::Positive, 0.6, "ok")
            .with_metric("price", 995.0)
            .with_metric("high_52w", 1_000.0);
        let indicators = risk_indicators(None, Some(&fundamental));

        assert_eq!(indicators.price, Some(995.0));
        assert_eq!(indicators.high_52w, Some(1_000.0));
        assert!(indicators.rsi.is_none());
    }
}
