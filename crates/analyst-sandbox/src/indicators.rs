//! Indicator math over plain `f64` series
//!
//! Thin wrappers around the `ta` crate that produce one output per input
//! bar. They back the snippet functions in [`crate::functions`] and are
//! usable directly from Rust.

use ta::Next;
use ta::indicators::{
    AverageTrueRange, BollingerBands, ExponentialMovingAverage, RelativeStrengthIndex,
    SimpleMovingAverage, StandardDeviation,
};

/// Indicator construction or input error
pub type IndicatorResult<T> = std::result::Result<T, String>;

/// MACD line, signal line and histogram, aligned with the input
#[derive(Debug, Clone, PartialEq)]
pub struct Macd {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// Bollinger bands aligned with the input
#[derive(Debug, Clone, PartialEq)]
pub struct Bands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn sma(values: &[f64], period: usize) -> IndicatorResult<Vec<f64>> {
    let mut sma = SimpleMovingAverage::new(period).map_err(|e| format!("sma: {e}"))?;
    Ok(values.iter().map(|v| sma.next(*v)).collect())
}

pub fn ema(values: &[f64], period: usize) -> IndicatorResult<Vec<f64>> {
    let mut ema = ExponentialMovingAverage::new(period).map_err(|e| format!("ema: {e}"))?;
    Ok(values.iter().map(|v| ema.next(*v)).collect())
}

/// Relative strength index; every output lies in `0..=100`.
pub fn rsi(values: &[f64], period: usize) -> IndicatorResult<Vec<f64>> {
    let mut rsi = RelativeStrengthIndex::new(period).map_err(|e| format!("rsi: {e}"))?;
    Ok(values.iter().map(|v| rsi.next(*v).clamp(0.0, 100.0)).collect())
}

pub fn stdev(values: &[f64], period: usize) -> IndicatorResult<Vec<f64>> {
    let mut sd = StandardDeviation::new(period).map_err(|e| format!("stdev: {e}"))?;
    Ok(values.iter().map(|v| sd.next(*v)).collect())
}

/// MACD from two EMAs with an EMA signal line over the MACD line.
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> IndicatorResult<Macd> {
    if fast >= slow {
        return Err(format!("macd: fast period {fast} must be below slow period {slow}"));
    }
    let fast_ema = ema(values, fast)?;
    let slow_ema = ema(values, slow)?;
    let line: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal_line = ema(&line, signal)?;
    let histogram = line.iter().zip(&signal_line).map(|(m, s)| m - s).collect();

    Ok(Macd {
        line,
        signal: signal_line,
        histogram,
    })
}

pub fn bollinger(values: &[f64], period: usize, multiplier: f64) -> IndicatorResult<Bands> {
    let mut bb = BollingerBands::new(period, multiplier).map_err(|e| format!("bbands: {e}"))?;
    let mut bands = Bands {
        upper: Vec::with_capacity(values.len()),
        middle: Vec::with_capacity(values.len()),
        lower: Vec::with_capacity(values.len()),
    };
    for v in values {
        let out = bb.next(*v);
        bands.upper.push(out.upper);
        bands.middle.push(out.average);
        bands.lower.push(out.lower);
    }
    Ok(bands)
}

/// Average true range. Opens are not needed, so each bar opens at its close.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> IndicatorResult<Vec<f64>> {
    if high.len() != low.len() || low.len() != close.len() {
        return Err("atr: high, low and close must have equal length".to_string());
    }
    let mut atr = AverageTrueRange::new(period).map_err(|e| format!("atr: {e}"))?;
    let mut out = Vec::with_capacity(close.len());
    for ((h, l), c) in high.iter().zip(low).zip(close) {
        let bar = ta::DataItem::builder()
            .open(*c)
            .high(*h)
            .low(*l)
            .close(*c)
            .volume(0.0)
            .build()
            .map_err(|e| format!("atr: invalid bar: {e}"))?;
        out.push(atr.next(&bar));
    }
    Ok(out)
}

/// Highest value among the last `n` entries.
pub fn highest(values: &[f64], n: usize) -> Option<f64> {
    tail(values, n).iter().copied().reduce(f64::max)
}

/// Lowest value among the last `n` entries.
pub fn lowest(values: &[f64], n: usize) -> Option<f64> {
    tail(values, n).iter().copied().reduce(f64::min)
}

pub fn tail(values: &[f64], n: usize) -> &[f64] {
    &values[values.len().saturating_sub(n)..]
}
