//! Analysis stages
//!
//! Each stage turns a classified request into one [`StageResult`]. Stages
//! are independent: they share no state and the director runs them
//! concurrently.

pub mod fundamental;
pub mod sentiment;
pub mod technical;

pub use fundamental::FundamentalStage;
pub use sentiment::SentimentStage;
pub use technical::{INDICATOR_SNIPPET, TechnicalStage};

use crate::domain::{AnalysisRequest, StageKind, StageResult, StageSignal};
use crate::error::StageOutcome;
use analyst_llm::ParseOutcome;
use async_trait::async_trait;

/// One analysis dimension.
///
/// `Err` means the stage produced nothing. `Ok` with a fallback reason
/// means the stage completed but the model's interpretation was unusable
/// and a low-confidence default was substituted.
#[async_trait]
pub trait AnalysisStage: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn run(&self, request: &AnalysisRequest) -> StageOutcome<ParseOutcome<StageResult>>;
}

/// Parse a model label into the vocabulary of `kind`.
///
/// Technical stages speak BULLISH/BEARISH, the others POSITIVE/NEGATIVE;
/// a label from the other vocabulary is translated.
pub(crate) fn signal_for(kind: StageKind, label: &str) -> Result<StageSignal, String> {
    let signal: StageSignal = label.parse()?;
    Ok(match (kind, signal) {
        (StageKind::Technical, StageSignal::Positive) => StageSignal::Bullish,
        (StageKind::Technical, StageSignal::Negative) => StageSignal::Bearish,
        (StageKind::Fundamental | StageKind::Sentiment, StageSignal::Bullish) => {
            StageSignal::Positive
        }
        (StageKind::Fundamental | StageKind::Sentiment, StageSignal::Bearish) => {
            StageSignal::Negative
        }
        (_, signal) => signal,
    })
}

fn default_confidence() -> f64 {
    0.4
}
