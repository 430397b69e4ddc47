//! Query classification: ticker, analysis type and time horizon

use crate::domain::{AnalysisType, TimeHorizon, is_valid_symbol, normalize_ticker};
use crate::prompts::{self, CLASSIFIER_SYSTEM, CLASSIFIER_USER};
use analyst_llm::{ParseOutcome, TextGenerator, parse_or_fallback};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Uppercase words that are never tickers
const STOPWORDS: &[&str] = &[
    "THE", "AND", "FOR", "BUY", "SELL", "HOLD", "AVOID", "WHAT", "WHY", "HOW", "WHEN", "SHOULD",
    "WILL", "CAN", "ARE", "YOU", "NOT", "NOW", "TODAY", "STOCK", "STOCKS", "SHARE", "SHARES",
    "PRICE", "MARKET", "NEWS", "RSI", "MACD", "SMA", "EMA", "NSE", "BSE", "IPO", "CEO", "CFO",
    "EPS", "ROE", "GDP", "RBI", "FII", "DII", "USD", "INR", "ETF", "ATH", "YOY", "QOQ",
];

const TECHNICAL_KEYWORDS: &[&str] = &[
    "price", "chart", "rsi", "macd", "support", "resistance", "breakout", "candle",
    "moving average", "bollinger", "option chain", "f&o", "momentum", "trend",
];

const FUNDAMENTAL_KEYWORDS: &[&str] = &[
    "earnings", "revenue", "pe ratio", "p/e", "debt", "balance sheet", "management", "profit",
    "valuation", "dividend", "margin", "quarterly results", "cash flow",
];

const SENTIMENT_KEYWORDS: &[&str] = &[
    "news", "mood", "sentiment", "event", "announcement", "headline", "rumour", "rumor",
];

const INTRADAY_KEYWORDS: &[&str] = &["intraday", "today", "day trade", "scalp", "short term", "short-term"];

const POSITIONAL_KEYWORDS: &[&str] = &["positional", "few weeks", "few months", "quarter"];

const LONGTERM_KEYWORDS: &[&str] = &[
    "long term", "long-term", "longterm", "years", "invest", "retirement", "multibagger",
];

/// Classification of one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub ticker: String,
    pub analysis_type: AnalysisType,
    pub time_horizon: TimeHorizon,
}

#[derive(Debug, Deserialize)]
struct ClassifierReply {
    ticker: Option<String>,
    #[serde(default)]
    tickers: Vec<String>,
    analysis_type: Option<String>,
    time_horizon: Option<String>,
}

/// LLM-first classifier with a deterministic fallback
pub struct QueryClassifier {
    generator: Arc<dyn TextGenerator>,
    default_ticker: String,
}

impl QueryClassifier {
    pub fn new(generator: Arc<dyn TextGenerator>, default_ticker: impl Into<String>) -> Self {
        Self {
            generator,
            default_ticker: default_ticker.into(),
        }
    }

    /// Classify `query`.
    ///
    /// Never fails: parse and transport problems fall back to
    /// [`heuristic_classification`], with the reason recorded.
    #[instrument(skip(self))]
    pub async fn classify(&self, query: &str) -> ParseOutcome<Classification> {
        let rendered = (
            prompts::render(CLASSIFIER_SYSTEM, &json!({ "default_ticker": self.default_ticker })),
            prompts::render(CLASSIFIER_USER, &json!({ "query": query })),
        );
        let (system, user) = match rendered {
            (Ok(system), Ok(user)) => (system, user),
            (Err(e), _) | (_, Err(e)) => {
                return self.fallback(query, format!("prompt rendering failed: {e}"));
            }
        };

        let raw = match self.generator.generate(&system, &user).await {
            Ok(raw) => raw,
            Err(e) => return self.fallback(query, format!("generator failed: {e}")),
        };

        let outcome = parse_or_fallback(
            &raw,
            |reply: ClassifierReply| self.validate(query, reply),
            |_| heuristic_classification(query, &self.default_ticker),
        );
        match &outcome.fallback_reason {
            Some(reason) => warn!(reason = %reason, "Classifier reply unusable, using heuristic"),
            None => debug!(ticker = %outcome.value.ticker, "Classified by model"),
        }
        outcome
    }

    fn validate(&self, query: &str, reply: ClassifierReply) -> Result<Classification, String> {
        let ticker = reply
            .ticker
            .or_else(|| reply.tickers.into_iter().next())
            .map(|t| normalize_ticker(&t))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.default_ticker.clone());
        if !is_valid_symbol(&ticker) {
            return Err(format!("model returned invalid ticker {ticker:?}"));
        }

        let lowered = query.to_lowercase();
        let analysis_type = reply
            .analysis_type
            .and_then(|t| t.parse().ok())
            .unwrap_or_else(|| keyword_analysis_type(&lowered));
        let time_horizon = reply
            .time_horizon
            .and_then(|h| h.parse().ok())
            .unwrap_or_else(|| keyword_time_horizon(&lowered));

        Ok(Classification {
            ticker,
            analysis_type,
            time_horizon,
        })
    }

    fn fallback(&self, query: &str, reason: String) -> ParseOutcome<Classification> {
        warn!(reason = %reason, "Classifier unavailable, using heuristic");
        ParseOutcome::fallback(heuristic_classification(query, &self.default_ticker), reason)
    }
}

/// Deterministic classification without a model.
///
/// The ticker is the first uppercase word of 3 to 12 letters that is not
/// a common word, else `default_ticker`. Type and horizon come from
/// keyword tables.
pub fn heuristic_classification(query: &str, default_ticker: &str) -> Classification {
    let lowered = query.to_lowercase();
    Classification {
        ticker: extract_ticker(query).unwrap_or_else(|| default_ticker.to_string()),
        analysis_type: keyword_analysis_type(&lowered),
        time_horizon: keyword_time_horizon(&lowered),
    }
}

/// First ticker-like token in `query`, if any
pub fn extract_ticker(query: &str) -> Option<String> {
    let Ok(re) = Regex::new(r"\b[A-Z]{3,12}\b") else {
        return None;
    };
    re.find_iter(query)
        .map(|m| m.as_str())
        .find(|token| !STOPWORDS.contains(token))
        .map(ToString::to_string)
}

fn mentions(lowered: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| lowered.contains(k))
}

fn keyword_analysis_type(lowered: &str) -> AnalysisType {
    let matched: Vec<AnalysisType> = [
        (AnalysisType::Technical, TECHNICAL_KEYWORDS),
        (AnalysisType::Fundamental, FUNDAMENTAL_KEYWORDS),
        (AnalysisType::Sentiment, SENTIMENT_KEYWORDS),
    ]
    .into_iter()
    .filter(|(_, keywords)| mentions(lowered, keywords))
    .map(|(kind, _)| kind)
    .collect();

    match matched.as_slice() {
        [only] => *only,
        _ => AnalysisType::Composite,
    }
}

fn keyword_time_horizon(lowered: &str) -> TimeHorizon {
    if mentions(lowered, INTRADAY_KEYWORDS) {
        TimeHorizon::Intraday
    } else if mentions(lowered, LONGTERM_KEYWORDS) {
        TimeHorizon::Longterm
    } else if mentions(lowered, POSITIONAL_KEYWORDS) {
        TimeHorizon::Positional
    } else {
        TimeHorizon::Swing
    }
}
