//! Fundamental stage: snapshot metrics plus retrieved report excerpts

use super::{AnalysisStage, default_confidence, signal_for};
use crate::domain::{AnalysisRequest, StageKind, StageResult, StageSignal};
use crate::error::{StageError, StageOutcome};
use crate::market::MarketDataProvider;
use crate::prompts::{self, FUNDAMENTAL_SYSTEM, FUNDAMENTAL_USER, fmt_opt};
use crate::retrieval::DocumentSearch;
use analyst_llm::{ParseOutcome, TextGenerator, parse_or_fallback, truncate_chars};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Debug, Deserialize)]
struct FundamentalReply {
    signal: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    positive_highlights: Vec<String>,
    #[serde(default)]
    red_flags: Vec<String>,
    #[serde(default)]
    management_sentiment: Option<String>,
}

struct Interpretation {
    signal: StageSignal,
    confidence: f64,
    summary: String,
    reasoning: String,
    positive_highlights: Vec<String>,
    red_flags: Vec<String>,
    management_sentiment: Option<String>,
}

pub struct FundamentalStage {
    market: Arc<dyn MarketDataProvider>,
    documents: Arc<dyn DocumentSearch>,
    generator: Arc<dyn TextGenerator>,
    document_limit: usize,
}

impl FundamentalStage {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        documents: Arc<dyn DocumentSearch>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            market,
            documents,
            generator,
            document_limit: 5,
        }
    }

    pub fn with_document_limit(mut self, limit: usize) -> Self {
        self.document_limit = limit;
        self
    }
}

fn interpret(ticker: &str, raw: &str) -> ParseOutcome<Interpretation> {
    parse_or_fallback(
        raw,
        |reply: FundamentalReply| {
            Ok(Interpretation {
                signal: signal_for(StageKind::Fundamental, &reply.signal)?,
                confidence: reply.confidence,
                summary: reply.summary,
                reasoning: reply.reasoning,
                positive_highlights: reply.positive_highlights,
                red_flags: reply.red_flags,
                management_sentiment: reply
                    .management_sentiment
                    .filter(|s| !s.trim().is_empty()),
            })
        },
        |raw| Interpretation {
            signal: StageSignal::Neutral,
            confidence: 0.3,
            summary: format!("Fundamental analysis for {ticker} (model output unreadable)"),
            reasoning: truncate_chars(raw, 300),
            positive_highlights: Vec::new(),
            red_flags: Vec::new(),
            management_sentiment: None,
        },
    )
}

#[async_trait]
impl AnalysisStage for FundamentalStage {
    fn kind(&self) -> StageKind {
        StageKind::Fundamental
    }

    #[instrument(skip_all, fields(ticker = %request.ticker, stage = "fundamental"))]
    async fn run(&self, request: &AnalysisRequest) -> StageOutcome<ParseOutcome<StageResult>> {
        let ticker = request.ticker.as_str();
        let (snapshot, documents) = tokio::join!(
            self.market.snapshot(ticker),
            self.documents.search(ticker, &request.query, self.document_limit),
        );
        let snapshot = snapshot?;
        let documents = documents.unwrap_or_else(|e| {
            warn!(error = %e, store = %self.documents.name(), "Document search failed, continuing without excerpts");
            Vec::new()
        });
        debug!(documents = documents.len(), "Fundamental inputs ready");

        let provider = self.market.name();
        let market_cap = snapshot
            .market_cap
            .map_or_else(|| "N/A".to_string(), |cap| format!("{:.0} Cr", cap / 1e7));
        let dividend_yield = snapshot
            .dividend_yield
            .map_or_else(|| "N/A".to_string(), |y| format!("{:.2}%", y * 100.0));
        let excerpts: Vec<String> = documents
            .iter()
            .map(|d| format!("[{}]\n{}", d.provenance, d.text))
            .collect();
        let user = prompts::render(
            FUNDAMENTAL_USER,
            &json!({
                "ticker": ticker,
                "query": request.query,
                "provider": provider,
                "price": fmt_opt(snapshot.price),
                "pe_ratio": fmt_opt(snapshot.pe_ratio),
                "pb_ratio": fmt_opt(snapshot.pb_ratio),
                "eps": fmt_opt(snapshot.eps),
                "dividend_yield": dividend_yield,
                "market_cap": market_cap,
                "sector": snapshot.sector.as_deref().unwrap_or("N/A"),
                "documents": excerpts,
            }),
        )
        .map_err(|e| StageError::Compute(format!("prompt rendering failed: {e}")))?;

        let raw = self.generator.generate(FUNDAMENTAL_SYSTEM, &user).await?;
        let ParseOutcome {
            value: reading,
            fallback_reason,
        } = interpret(ticker, &raw);
        if let Some(reason) = &fallback_reason {
            warn!(reason = %reason, "Fundamental interpretation fell back to NEUTRAL");
        }

        let mut result = StageResult::new(
            StageKind::Fundamental,
            reading.signal,
            reading.confidence,
            reading.summary,
        )
        .with_optional_metric("price", snapshot.price)
        .with_optional_metric("pe_ratio", snapshot.pe_ratio)
        .with_optional_metric("pb_ratio", snapshot.pb_ratio)
        .with_optional_metric("eps", snapshot.eps)
        .with_optional_metric("market_cap", snapshot.market_cap)
        .with_optional_metric("dividend_yield", snapshot.dividend_yield)
        .with_optional_metric("high_52w", snapshot.high_52w)
        .with_optional_metric("low_52w", snapshot.low_52w)
        .with_optional_metric("sector", snapshot.sector)
        .with_optional_metric("management_sentiment", reading.management_sentiment)
        .with_metric("positive_highlights", reading.positive_highlights)
        .with_metric("red_flags", reading.red_flags)
        .with_metric("document_count", documents.len() as f64)
        .with_metric("reasoning", reading.reasoning);
        for document in &documents {
            result = result.with_source(document.provenance.clone());
        }
        result = result.with_source(format!("{provider}:fundamentals"));

        Ok(ParseOutcome {
            value: result,
            fallback_reason,
        })
    }
}
