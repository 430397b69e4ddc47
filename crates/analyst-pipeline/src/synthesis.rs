//! Weighted merge of stage results into one recommendation

use crate::domain::{
    Recommendation, RiskFlag, StageKind, StageResult, TimeHorizon, TradeSignal,
    stage::clamp_unit,
};
use crate::error::{PipelineError, Result};
use crate::prompts::{self, SYNTHESIS_SYSTEM, SYNTHESIS_USER};
use analyst_llm::{ParseOutcome, TextGenerator, parse_or_fallback, truncate_chars};
use analyst_sandbox::MetricValue;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Confidence used whenever the merge has to fall back
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Characters of raw model output kept as fallback reasoning
const FALLBACK_REASONING_CHARS: usize = 400;

/// Headlines carried onto the recommendation
const MAX_TOP_HEADLINES: usize = 5;

/// Stage metrics copied into `key_metrics` when present
const PASS_THROUGH: [(StageKind, &str, &str); 5] = [
    (StageKind::Technical, "rsi", "rsi"),
    (StageKind::Technical, "macd_signal", "macd_signal"),
    (StageKind::Technical, "price", "price"),
    (StageKind::Fundamental, "pe_ratio", "pe_ratio"),
    (StageKind::Sentiment, "score", "sentiment_score"),
];

/// Relative weight of each stage for a time horizon
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageWeights {
    pub technical: f64,
    pub fundamental: f64,
    pub sentiment: f64,
}

impl StageWeights {
    pub fn for_horizon(horizon: TimeHorizon) -> Self {
        match horizon {
            TimeHorizon::Intraday => Self {
                technical: 0.6,
                fundamental: 0.1,
                sentiment: 0.3,
            },
            TimeHorizon::Swing | TimeHorizon::Positional => Self {
                technical: 0.4,
                fundamental: 0.4,
                sentiment: 0.2,
            },
            TimeHorizon::Longterm => Self {
                technical: 0.2,
                fundamental: 0.6,
                sentiment: 0.2,
            },
        }
    }

    pub fn weight(&self, kind: StageKind) -> f64 {
        match kind {
            StageKind::Technical => self.technical,
            StageKind::Fundamental => self.fundamental,
            StageKind::Sentiment => self.sentiment,
        }
    }
}

/// Everything the aggregator reads. Absent stages are `None`.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub ticker: &'a str,
    pub query: &'a str,
    pub horizon: TimeHorizon,
    pub technical: Option<&'a StageResult>,
    pub fundamental: Option<&'a StageResult>,
    pub sentiment: Option<&'a StageResult>,
    pub risk_flags: &'a BTreeSet<RiskFlag>,
}

impl<'a> SynthesisInput<'a> {
    pub fn stage(&self, kind: StageKind) -> Option<&'a StageResult> {
        match kind {
            StageKind::Technical => self.technical,
            StageKind::Fundamental => self.fundamental,
            StageKind::Sentiment => self.sentiment,
        }
    }

    /// Present stages in technical, fundamental, sentiment order
    pub fn present(&self) -> Vec<&'a StageResult> {
        StageKind::ALL
            .iter()
            .filter_map(|kind| self.stage(*kind))
            .collect()
    }
}

/// Confidence-weighted directional score over the present stages.
///
/// In `[-1, 1]`; `None` when no stage is present.
pub fn weighted_score(weights: &StageWeights, stages: &[&StageResult]) -> Option<f64> {
    let total_weight: f64 = stages.iter().map(|s| weights.weight(s.kind)).sum();
    if stages.is_empty() || total_weight <= 0.0 {
        return None;
    }
    let score: f64 = stages
        .iter()
        .map(|s| weights.weight(s.kind) * s.signal.direction() * s.confidence())
        .sum();
    Some((score / total_weight).clamp(-1.0, 1.0))
}

#[derive(Debug, Deserialize)]
struct SynthesisReply {
    signal: String,
    #[serde(default = "default_reply_confidence")]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    summary: String,
}

fn default_reply_confidence() -> f64 {
    0.4
}

/// Verdict part of a recommendation, before mechanical fields are attached
#[derive(Debug, Clone, PartialEq)]
struct Verdict {
    signal: TradeSignal,
    confidence: f64,
    reasoning: String,
    summary: String,
}

impl Verdict {
    fn fallback(ticker: &str, reasoning: String) -> Self {
        Self {
            signal: TradeSignal::Hold,
            confidence: FALLBACK_CONFIDENCE,
            reasoning,
            summary: format!("Analysis for {ticker}"),
        }
    }
}

/// Merges stage results into a [`Recommendation`]
pub struct SynthesisAggregator {
    generator: Arc<dyn TextGenerator>,
}

impl SynthesisAggregator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Produce the recommendation.
    ///
    /// The generator is consulted only when at least one stage is present.
    /// Unparsable output and transport failures both yield HOLD at
    /// [`FALLBACK_CONFIDENCE`]; the outcome's `fallback_reason` says why.
    /// Only a prompt rendering failure is an error.
    #[instrument(skip_all, fields(ticker = %input.ticker, horizon = %input.horizon))]
    pub async fn synthesize(&self, input: &SynthesisInput<'_>) -> Result<ParseOutcome<Recommendation>> {
        let weights = StageWeights::for_horizon(input.horizon);
        let present = input.present();
        let score = weighted_score(&weights, &present);

        let outcome = if present.is_empty() {
            debug!("No stage results, skipping generator");
            ParseOutcome::fallback(
                Verdict::fallback(
                    input.ticker,
                    "No analysis stage completed; insufficient data for a directional call."
                        .to_string(),
                ),
                "no stage results available",
            )
        } else {
            let user = build_context(input, &weights, score)
                .map_err(|e| PipelineError::Synthesis(format!("prompt rendering failed: {e}")))?;
            match self.generator.generate(SYNTHESIS_SYSTEM, &user).await {
                Ok(raw) => parse_verdict(input.ticker, &raw),
                Err(e) => {
                    warn!(error = %e, "Synthesis generator unavailable, holding");
                    ParseOutcome::fallback(
                        Verdict::fallback(input.ticker, e.to_string()),
                        format!("generator failed: {e}"),
                    )
                }
            }
        };

        if let Some(reason) = &outcome.fallback_reason {
            warn!(reason = %reason, "Synthesis fell back to HOLD");
        }

        let ParseOutcome {
            value: verdict,
            fallback_reason,
        } = outcome;
        let recommendation = assemble(input, &weights, score, &present, verdict);
        Ok(ParseOutcome {
            value: recommendation,
            fallback_reason,
        })
    }
}

fn parse_verdict(ticker: &str, raw: &str) -> ParseOutcome<Verdict> {
    parse_or_fallback(
        raw,
        |reply: SynthesisReply| {
            let signal = reply.signal.parse::<TradeSignal>()?;
            Ok(Verdict {
                signal,
                confidence: clamp_unit(reply.confidence),
                reasoning: reply.reasoning,
                summary: reply.summary,
            })
        },
        |raw| Verdict::fallback(ticker, truncate_chars(raw, FALLBACK_REASONING_CHARS)),
    )
}

fn build_context(
    input: &SynthesisInput<'_>,
    weights: &StageWeights,
    score: Option<f64>,
) -> std::result::Result<String, minijinja::Error> {
    let stages: Vec<serde_json::Value> = StageKind::ALL
        .iter()
        .map(|kind| {
            let title = match kind {
                StageKind::Technical => "Technical Analysis",
                StageKind::Fundamental => "Fundamental Analysis",
                StageKind::Sentiment => "Sentiment Analysis",
            };
            match input.stage(*kind) {
                None => json!({ "title": title, "present": false }),
                Some(stage) => {
                    let metrics: Vec<serde_json::Value> = stage
                        .metrics
                        .iter()
                        .map(|(name, value)| json!({ "name": name, "value": value.to_string() }))
                        .collect();
                    json!({
                        "title": title,
                        "present": true,
                        "signal": stage.signal.as_str(),
                        "confidence": format!("{:.2}", stage.confidence()),
                        "summary": stage.summary,
                        "metrics": metrics,
                    })
                }
            }
        })
        .collect();

    let risk_flags = if input.risk_flags.is_empty() {
        "none".to_string()
    } else {
        input
            .risk_flags
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    prompts::render(
        SYNTHESIS_USER,
        &json!({
            "ticker": input.ticker,
            "query": input.query,
            "horizon": input.horizon.as_str(),
            "weights": weights,
            "weighted_score": prompts::fmt_opt(score),
            "stages": stages,
            "risk_flags": risk_flags,
        }),
    )
}

fn assemble(
    input: &SynthesisInput<'_>,
    weights: &StageWeights,
    score: Option<f64>,
    present: &[&StageResult],
    verdict: Verdict,
) -> Recommendation {
    let mut key_metrics = BTreeMap::new();
    key_metrics.insert("weight_technical".to_string(), MetricValue::from(weights.technical));
    key_metrics.insert("weight_fundamental".to_string(), MetricValue::from(weights.fundamental));
    key_metrics.insert("weight_sentiment".to_string(), MetricValue::from(weights.sentiment));
    if let Some(score) = score {
        key_metrics.insert("weighted_score".to_string(), MetricValue::from(score));
    }
    for (kind, metric, key) in PASS_THROUGH {
        if let Some(value) = input.stage(kind).and_then(|s| s.metric(metric)) {
            key_metrics.insert(key.to_string(), value.clone());
        }
    }

    let mut sources: Vec<String> = Vec::new();
    for source in present.iter().flat_map(|s| s.sources.iter()) {
        if !sources.contains(source) {
            sources.push(source.clone());
        }
    }

    let top_headlines = input
        .sentiment
        .and_then(|s| s.metric("top_headlines"))
        .map(|v| v.texts().into_iter().take(MAX_TOP_HEADLINES).collect())
        .unwrap_or_default();

    Recommendation {
        ticker: input.ticker.to_string(),
        query: input.query.to_string(),
        time_horizon: input.horizon,
        signal: verdict.signal,
        confidence: clamp_unit(verdict.confidence),
        reasoning: verdict.reasoning,
        summary: verdict.summary,
        key_metrics,
        risk_flags: input.risk_flags.clone(),
        sources,
        stages_used: present.iter().map(|s| s.kind).collect(),
        top_headlines,
    }
}
