//! Data shared by every part of the pipeline

pub mod market;
pub mod recommendation;
pub mod request;
pub mod stage;

pub use market::{Candle, MarketSnapshot};
pub use recommendation::{Recommendation, RiskFlag, TradeSignal};
pub use request::{AnalysisRequest, AnalysisType, TimeHorizon, is_valid_symbol, normalize_ticker};
pub use stage::{StageKind, StageResult, StageSignal};
