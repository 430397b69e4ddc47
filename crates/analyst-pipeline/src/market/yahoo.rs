//! Yahoo Finance market-data provider

use super::{MarketDataProvider, to_yahoo_symbol};
use crate::domain::{Candle, MarketSnapshot};
use crate::error::{DataError, DataResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use time::OffsetDateTime;
use tracing::{debug, instrument};
use yahoo_finance_api as yahoo;

const PROVIDER: &str = "yahoo";

/// Days of history used to derive the 52-week band
const SNAPSHOT_LOOKBACK_DAYS: i64 = 365;

/// Candles and price snapshots from Yahoo Finance.
///
/// The chart API carries no valuation data, so snapshot fundamentals
/// (`pe_ratio`, `eps` and friends) are always `None`.
#[derive(Debug, Clone, Default)]
pub struct YahooFinanceProvider {}

impl YahooFinanceProvider {
    pub fn new() -> Self {
        Self {}
    }

    async fn history(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: &str,
    ) -> DataResult<Vec<yahoo::Quote>> {
        let connector =
            yahoo::YahooConnector::new().map_err(|e| DataError::provider(PROVIDER, e.to_string()))?;

        let start_odt = OffsetDateTime::from_unix_timestamp(start.timestamp())
            .map_err(|e| DataError::provider(PROVIDER, format!("Invalid start timestamp: {e}")))?;
        let end_odt = OffsetDateTime::from_unix_timestamp(end.timestamp())
            .map_err(|e| DataError::provider(PROVIDER, format!("Invalid end timestamp: {e}")))?;

        let response = connector
            .get_quote_history_interval(symbol, start_odt, end_odt, interval)
            .await
            .map_err(|e| DataError::provider(PROVIDER, e.to_string()))?;

        response
            .quotes()
            .map_err(|e| DataError::provider(PROVIDER, e.to_string()))
    }
}

#[async_trait]
impl MarketDataProvider for YahooFinanceProvider {
    fn name(&self) -> String {
        PROVIDER.to_string()
    }

    #[instrument(skip(self))]
    async fn candles(
        &self,
        symbol: &str,
        interval: &str,
        lookback_days: u32,
    ) -> DataResult<Vec<Candle>> {
        let yahoo_symbol = to_yahoo_symbol(symbol);
        let end = Utc::now();
        let start = end - Duration::days(i64::from(lookback_days));

        let quotes = self.history(&yahoo_symbol, start, end, interval).await?;
        let candles: Vec<Candle> = quotes
            .iter()
            .filter(|q| q.close.is_finite() && q.close > 0.0)
            .filter_map(|q| {
                let timestamp = DateTime::from_timestamp(q.timestamp as i64, 0)?;
                Some(Candle {
                    ticker: symbol.to_string(),
                    timestamp,
                    open: q.open,
                    high: q.high,
                    low: q.low,
                    close: q.close,
                    volume: q.volume,
                    interval: interval.to_string(),
                })
            })
            .collect();

        debug!(symbol = %yahoo_symbol, count = candles.len(), "Fetched candles");
        Ok(candles)
    }

    #[instrument(skip(self))]
    async fn snapshot(&self, symbol: &str) -> DataResult<MarketSnapshot> {
        let yahoo_symbol = to_yahoo_symbol(symbol);
        let end = Utc::now();
        let start = end - Duration::days(SNAPSHOT_LOOKBACK_DAYS);

        let quotes = self.history(&yahoo_symbol, start, end, "1d").await?;
        let valid: Vec<&yahoo::Quote> = quotes
            .iter()
            .filter(|q| q.close.is_finite() && q.close > 0.0)
            .collect();

        let Some(last) = valid.last() else {
            return Err(DataError::DataUnavailable {
                symbol: yahoo_symbol,
                reason: "no quotes in the last year".to_string(),
            });
        };

        let high_52w = valid.iter().map(|q| q.high).fold(f64::MIN, f64::max);
        let low_52w = valid.iter().map(|q| q.low).fold(f64::MAX, f64::min);

        Ok(MarketSnapshot {
            symbol: yahoo_symbol,
            price: Some(last.close),
            high_52w: Some(high_52w).filter(|v| v.is_finite() && *v > 0.0),
            low_52w: Some(low_52w).filter(|v| v.is_finite() && *v > 0.0),
            ..MarketSnapshot::default()
        })
    }
}
