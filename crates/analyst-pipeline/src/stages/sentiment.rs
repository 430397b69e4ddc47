//! Sentiment stage: recent headlines scored by the generator

use super::{AnalysisStage, default_confidence, signal_for};
use crate::domain::{AnalysisRequest, StageKind, StageResult, StageSignal};
use crate::error::{StageError, StageOutcome};
use crate::prompts::{self, SENTIMENT_SYSTEM, SENTIMENT_USER};
use crate::retrieval::DocumentSearch;
use analyst_llm::{ParseOutcome, TextGenerator, parse_or_fallback};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Headlines shown to the model
const PROMPT_HEADLINES: usize = 15;
/// Headlines carried into the result
const TOP_HEADLINES: usize = 5;
/// Confidence when there is nothing to judge
const EMPTY_CONFIDENCE: f64 = 0.1;

#[derive(Debug, Deserialize)]
struct SentimentReply {
    score: f64,
    label: String,
    #[serde(default)]
    summary: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

struct Reading {
    score: f64,
    signal: StageSignal,
    confidence: f64,
    summary: String,
}

pub struct SentimentStage {
    news: Arc<dyn DocumentSearch>,
    generator: Arc<dyn TextGenerator>,
    news_limit: usize,
}

impl SentimentStage {
    pub fn new(news: Arc<dyn DocumentSearch>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            news,
            generator,
            news_limit: 20,
        }
    }

    pub fn with_news_limit(mut self, limit: usize) -> Self {
        self.news_limit = limit;
        self
    }
}

/// Clamp a model score into [-1, 1]; garbage becomes 0
fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

fn interpret(raw: &str) -> ParseOutcome<Reading> {
    parse_or_fallback(
        raw,
        |reply: SentimentReply| {
            Ok(Reading {
                score: clamp_score(reply.score),
                signal: signal_for(StageKind::Sentiment, &reply.label)?,
                confidence: reply.confidence,
                summary: reply.summary,
            })
        },
        |_| Reading {
            score: 0.0,
            signal: StageSignal::Neutral,
            confidence: EMPTY_CONFIDENCE,
            summary: "Sentiment could not be determined from the model output".to_string(),
        },
    )
}

#[async_trait]
impl AnalysisStage for SentimentStage {
    fn kind(&self) -> StageKind {
        StageKind::Sentiment
    }

    #[instrument(skip_all, fields(ticker = %request.ticker, stage = "sentiment"))]
    async fn run(&self, request: &AnalysisRequest) -> StageOutcome<ParseOutcome<StageResult>> {
        let ticker = request.ticker.as_str();
        let articles = self
            .news
            .search(ticker, &request.query, self.news_limit)
            .await?;
        debug!(headlines = articles.len(), source = %self.news.name(), "Headlines fetched");

        let headlines: Vec<String> = articles.iter().map(|a| a.text.clone()).collect();
        let top: Vec<String> = headlines.iter().take(TOP_HEADLINES).cloned().collect();

        if headlines.is_empty() {
            let result = StageResult::new(
                StageKind::Sentiment,
                StageSignal::Neutral,
                EMPTY_CONFIDENCE,
                format!("No recent news found for {ticker}"),
            )
            .with_metric("score", 0.0)
            .with_metric("headline_count", 0.0)
            .with_metric("top_headlines", Vec::<String>::new());
            return Ok(ParseOutcome::parsed(result));
        }

        let user = prompts::render(
            SENTIMENT_USER,
            &json!({
                "ticker": ticker,
                "query": request.query,
                "headlines": headlines.iter().take(PROMPT_HEADLINES).collect::<Vec<_>>(),
            }),
        )
        .map_err(|e| StageError::Compute(format!("prompt rendering failed: {e}")))?;

        let raw = self.generator.generate(SENTIMENT_SYSTEM, &user).await?;
        let ParseOutcome {
            value: reading,
            fallback_reason,
        } = interpret(&raw);
        if let Some(reason) = &fallback_reason {
            warn!(reason = %reason, "Sentiment interpretation fell back to neutral");
        }

        let mut result = StageResult::new(
            StageKind::Sentiment,
            reading.signal,
            reading.confidence,
            reading.summary,
        )
        .with_metric("score", reading.score)
        .with_metric("headline_count", headlines.len() as f64)
        .with_metric("top_headlines", top);
        for article in &articles {
            result = result.with_source(article.provenance.clone());
        }

        Ok(ParseOutcome {
            value: result,
            fallback_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnalysisType, TimeHorizon};
    use crate::error::DataError;
    use crate::retrieval::{MockDocumentSearch, RetrievedDocument};
    use crate::testing::{FailingGenerator, ScriptedGenerator};

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            query: "INFY: what is the news flow?".to_string(),
            ticker: "INFY".to_string(),
            time_horizon: TimeHorizon::Swing,
            analysis_type: AnalysisType::Sentiment,
            session_id: "test".to_string(),
        }
    }

    fn news(count: usize) -> MockDocumentSearch {
        let mut mock = MockDocumentSearch::new();
        mock.expect_name().return_const("finnhub".to_string());
        mock.expect_search().returning(move |_, _, _| {
            Ok((0..count)
                .map(|i| {
                    let source = if i % 2 == 0 { "finnhub:Reuters" } else { "finnhub:Mint" };
                    RetrievedDocument::new(format!("Infosys headline {i}"), source)
                })
                .collect())
        });
        mock
    }

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(1.7), 1.0);
        assert_eq!(clamp_score(-3.0), -1.0);
        assert_eq!(clamp_score(f64::NAN), 0.0);
        assert_eq!(clamp_score(0.25), 0.25);
    }

    #[tokio::test]
    async fn test_scored_headlines() {
        let generator = Arc::new(ScriptedGenerator::new(
            r#"{"score": 1.4, "label": "positive", "summary": "Deal wins dominate", "confidence": 0.7}"#,
        ));
        let stage = SentimentStage::new(Arc::new(news(18)), generator.clone());
        let outcome = stage.run(&request()).await.unwrap();

        assert!(!outcome.is_fallback());
        let result = outcome.value;
        assert_eq!(result.signal, StageSignal::Positive);
        assert_eq!(result.metric_f64("score"), Some(1.0));
        assert_eq!(result.metric_f64("headline_count"), Some(18.0));
        assert_eq!(result.metric("top_headlines").unwrap().texts().len(), 5);
        assert_eq!(result.sources, vec!["finnhub:Reuters", "finnhub:Mint"]);

        let prompt = &generator.user_prompts()[0];
        assert!(prompt.contains("Infosys headline 14"));
        assert!(!prompt.contains("Infosys headline 15"));
    }

    #[tokio::test]
    async fn test_no_headlines_skips_generator() {
        let generator = Arc::new(ScriptedGenerator::new("{}"));
        let stage = SentimentStage::new(Arc::new(news(0)), generator.clone());
        let outcome = stage.run(&request()).await.unwrap();

        assert!(!outcome.is_fallback());
        assert_eq!(outcome.value.signal, StageSignal::Neutral);
        assert_eq!(outcome.value.metric_f64("score"), Some(0.0));
        assert!((outcome.value.confidence() - 0.1).abs() < 1e-9);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_garbage_reply_is_neutral_fallback() {
        let generator = Arc::new(ScriptedGenerator::new("Markets are moody today."));
        let stage = SentimentStage::new(Arc::new(news(3)), generator);
        let outcome = stage.run(&request()).await.unwrap();

        assert!(outcome.is_fallback());
        assert_eq!(outcome.value.metric_f64("score"), Some(0.0));
        assert_eq!(outcome.value.signal, StageSignal::Neutral);
        assert!((outcome.value.confidence() - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_news_failure_is_fetch_error() {
        let mut mock = MockDocumentSearch::new();
        mock.expect_name().return_const("finnhub".to_string());
        mock.expect_search()
            .returning(|_, _, _| Err(DataError::provider("finnhub", "HTTP 429")));

        let stage = SentimentStage::new(Arc::new(mock), Arc::new(FailingGenerator));
        let err = stage.run(&request()).await.unwrap_err();
        assert!(matches!(err, StageError::Fetch(_)));
    }
}
