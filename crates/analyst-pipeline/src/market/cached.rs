//! Read-through caching around any market-data provider

use super::MarketDataProvider;
use crate::cache::{CacheKey, DataCache};
use crate::domain::{Candle, MarketSnapshot};
use crate::error::DataResult;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Caches candles and snapshots of an inner provider with separate TTLs.
pub struct CachedMarketData {
    inner: Arc<dyn MarketDataProvider>,
    candles: DataCache,
    snapshots: DataCache,
}

impl CachedMarketData {
    pub fn new(inner: Arc<dyn MarketDataProvider>, candles_ttl: Duration, snapshot_ttl: Duration) -> Self {
        Self {
            inner,
            candles: DataCache::new(candles_ttl),
            snapshots: DataCache::new(snapshot_ttl),
        }
    }
}

#[async_trait]
impl MarketDataProvider for CachedMarketData {
    fn name(&self) -> String {
        self.inner.name()
    }

    async fn candles(
        &self,
        symbol: &str,
        interval: &str,
        lookback_days: u32,
    ) -> DataResult<Vec<Candle>> {
        let key = CacheKey::new(
            symbol,
            "candles",
            json!({ "interval": interval, "lookback_days": lookback_days }),
        );
        let value = self
            .candles
            .get_or_fetch(key, || async {
                let candles = self.inner.candles(symbol, interval, lookback_days).await?;
                Ok::<_, crate::error::DataError>(serde_json::to_value(candles)?)
            })
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn snapshot(&self, symbol: &str) -> DataResult<MarketSnapshot> {
        let key = CacheKey::new(symbol, "snapshot", json!({}));
        let value = self
            .snapshots
            .get_or_fetch(key, || async {
                let snapshot = self.inner.snapshot(symbol).await?;
                Ok::<_, crate::error::DataError>(serde_json::to_value(snapshot)?)
            })
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataError;
    use crate::market::MockMarketDataProvider;
    use chrono::{TimeZone, Utc};

    fn candle(close: f64) -> Candle {
        Candle {
            ticker: "TCS".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000,
            interval: "1d".to_string(),
        }
    }

    #[tokio::test]
    async fn test_candles_fetched_once() {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_candles()
            .times(1)
            .returning(|_, _, _| Ok(vec![candle(10.0), candle(11.0)]));

        let cached = CachedMarketData::new(
            Arc::new(mock),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );

        let first = cached.candles("TCS", "1d", 60).await.unwrap();
        let second = cached.candles("TCS", "1d", 60).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_errors_pass_through() {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_snapshot()
            .times(2)
            .returning(|s| Err(DataError::InvalidSymbol(s.to_string())));

        let cached = CachedMarketData::new(
            Arc::new(mock),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );

        assert!(cached.snapshot("???").await.is_err());
        assert!(cached.snapshot("???").await.is_err());
    }

    #[tokio::test]
    async fn test_distinct_params_distinct_entries() {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_candles()
            .times(2)
            .returning(|_, _, days| Ok(vec![candle(f64::from(days))]));

        let cached = CachedMarketData::new(
            Arc::new(mock),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );

        let short = cached.candles("TCS", "1d", 30).await.unwrap();
        let long = cached.candles("TCS", "1d", 60).await.unwrap();
        assert!((short[0].close - 30.0).abs() < f64::EPSILON);
        assert!((long[0].close - 60.0).abs() < f64::EPSILON);
    }
}
