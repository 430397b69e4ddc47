//! Market-data collaborator contract and implementations

pub mod cached;
pub mod yahoo;

pub use cached::CachedMarketData;
pub use yahoo::YahooFinanceProvider;

use crate::domain::{Candle, MarketSnapshot};
use crate::error::DataResult;
use async_trait::async_trait;

/// Source of candles and fundamentals snapshots.
///
/// Either call may return empty or partial data; callers decide what is
/// enough.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Short label used in source attributions
    fn name(&self) -> String;

    /// Candles for `symbol`, oldest first
    async fn candles(&self, symbol: &str, interval: &str, lookback_days: u32)
    -> DataResult<Vec<Candle>>;

    async fn snapshot(&self, symbol: &str) -> DataResult<MarketSnapshot>;
}

/// Map an exchange ticker to the symbol Yahoo Finance expects.
///
/// Index aliases map to their `^` symbols, `.NS`/`.BO` suffixes and `^`
/// symbols are kept, anything else is treated as an NSE listing.
pub fn to_yahoo_symbol(ticker: &str) -> String {
    let ticker = ticker.trim().to_uppercase();
    match ticker.as_str() {
        "NIFTY" | "NIFTY50" => "^NSEI".to_string(),
        "BANKNIFTY" => "^NSEBANK".to_string(),
        "SENSEX" => "^BSESN".to_string(),
        "MIDCAP" => "^NSEMDCP50".to_string(),
        t if t.starts_with('^') || t.ends_with(".NS") || t.ends_with(".BO") => ticker,
        _ => format!("{ticker}.NS"),
    }
}
