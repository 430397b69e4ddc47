//! Market data shapes returned by collaborators

use analyst_sandbox::Ohlcv;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV candle with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    /// e.g. "15m", "1h", "1d"
    pub interval: String,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn body_size(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    /// Row handed to the sandbox
    pub fn to_ohlcv(&self) -> Ohlcv {
        Ohlcv::new(self.open, self.high, self.low, self.close, self.volume as f64)
    }
}

/// Price and fundamentals snapshot; any field may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub price: Option<f64>,
    pub high_52w: Option<f64>,
    pub low_52w: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub eps: Option<f64>,
    pub market_cap: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub sector: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            ticker: "INFY".to_string(),
            timestamp: Utc::now(),
            open,
            high,
            low,
            close,
            volume: 10,
            interval: "1d".to_string(),
        }
    }

    #[test]
    fn test_candle_shape() {
        let c = candle(100.0, 110.0, 95.0, 105.0);
        assert!(c.is_bullish());
        assert!((c.body_size() - 5.0).abs() < f64::EPSILON);
        assert!((c.upper_wick() - 5.0).abs() < f64::EPSILON);
        assert!((c.lower_wick() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_to_ohlcv() {
        let row = candle(1.0, 2.0, 0.5, 1.5).to_ohlcv();
        assert_eq!(row, Ohlcv::new(1.0, 2.0, 0.5, 1.5, 10.0));
    }
}
