//! Market-analysis pipeline
//!
//! Turns a natural-language question about an Indian equity or index into
//! a structured [`Recommendation`]. It includes:
//!
//! - Query classification (model first, keyword heuristic as fallback)
//! - Three independent analysis stages: technical indicators computed in
//!   the `analyst-sandbox` interpreter, fundamentals with retrieved report
//!   excerpts, and news sentiment
//! - Rule-based risk flags derived from indicator values
//! - Horizon-weighted synthesis into a BUY / SELL / HOLD / AVOID call
//!
//! # Architecture
//!
//! [`PipelineDirector`] classifies the query, fans the stages out
//! concurrently under per-stage timeouts, derives risk flags and hands the
//! surviving results to [`SynthesisAggregator`]. Collaborators sit behind
//! traits so they can be swapped or mocked:
//! - [`MarketDataProvider`]: candles and snapshots (Yahoo Finance, cached)
//! - [`DocumentSearch`]: report excerpts and news headlines
//! - [`analyst_llm::TextGenerator`]: the model
//!
//! # Example
//!
//! ```rust,ignore
//! use analyst_pipeline::{CachedMarketData, PipelineConfig, PipelineDirector, YahooFinanceProvider};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::from_env()?;
//!     let market = Arc::new(CachedMarketData::new(
//!         Arc::new(YahooFinanceProvider::new()),
//!         config.cache_ttl_candles,
//!         config.cache_ttl_snapshot,
//!     ));
//!
//!     let director = PipelineDirector::builder()
//!         .config(config)
//!         .generator(/* your generator */)
//!         .market(market)
//!         .build()?;
//!
//!     let rec = director.analyze("Is RELIANCE a buy for the next few weeks?", None, None).await?;
//!     println!("{} {:.2}", rec.signal, rec.confidence);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod classifier;
pub mod config;
pub mod director;
pub mod domain;
pub mod error;
pub mod market;
pub mod prompts;
pub mod retrieval;
pub mod risk;
pub mod stages;
pub mod synthesis;

#[cfg(test)]
mod testing;

pub use cache::DataCache;
pub use classifier::{Classification, QueryClassifier};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use director::{PipelineDirector, PipelineDirectorBuilder, PipelineState, PipelineTrace, StageDiagnostic};
pub use domain::{
    AnalysisRequest, AnalysisType, Candle, MarketSnapshot, Recommendation, RiskFlag, StageKind,
    StageResult, StageSignal, TimeHorizon, TradeSignal,
};
pub use error::{DataError, PipelineError, Result, StageError};
pub use market::{CachedMarketData, MarketDataProvider, YahooFinanceProvider};
pub use retrieval::{
    DocumentSearch, FinnhubNewsSource, KeywordStore, RemoteDocumentStore, RetrievedDocument,
    select_document_store, select_news_source,
};
pub use risk::{RiskIndicators, RiskThresholds, derive_risk_flags};
pub use stages::AnalysisStage;
pub use synthesis::{StageWeights, SynthesisAggregator};
