//! Input rows bound into the snippet scope

use serde::{Deserialize, Serialize};

/// One OHLCV bar, oldest first in any dataset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ohlcv {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Ohlcv {
    pub fn new(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Column-wise copy of a dataset
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Columns {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl Columns {
    pub(crate) fn from_rows(rows: &[Ohlcv]) -> Self {
        let mut columns = Self::default();
        for row in rows {
            columns.open.push(row.open);
            columns.high.push(row.high);
            columns.low.push(row.low);
            columns.close.push(row.close);
            columns.volume.push(row.volume);
        }
        columns
    }
}
