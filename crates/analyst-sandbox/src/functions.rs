//! The closed set of functions a snippet may call
//!
//! Every function here is pure: output depends only on arguments, with no
//! clock, randomness, I/O or global state. Anything not registered below
//! is unreachable from a snippet.

use crate::indicators;
use rhai::{Array, Dynamic, Engine, EvalAltResult, FLOAT, INT, Map};

type FnResult<T> = Result<T, Box<EvalAltResult>>;

/// Names registered by [`register_allow_list`]
pub const ALLOWED_FUNCTIONS: &[&str] = &[
    // scalar math
    "abs", "sqrt", "ln", "exp", "pow", "floor", "ceil", "round", "min", "max", "to_float",
    "to_int", "is_nan",
    // arrays
    "len", "first", "last", "tail", "push", "sum", "mean", "pct_change",
    // indicators
    "sma", "ema", "rsi", "macd", "bbands", "stdev", "atr", "highest", "lowest",
];

/// Whether `name` is part of the allow-list
pub fn is_allowed(name: &str) -> bool {
    ALLOWED_FUNCTIONS.contains(&name)
}

/// Register every allow-listed function on `engine`.
///
/// Indicator periods above `max_period` are rejected before any indicator
/// state is allocated.
pub fn register_allow_list(engine: &mut Engine, max_period: usize) {
    register_math(engine);
    register_arrays(engine);
    register_indicators(engine, max_period);
}

fn register_math(engine: &mut Engine) {
    engine
        .register_fn("abs", |x: FLOAT| x.abs())
        .register_fn("abs", |x: INT| -> FnResult<INT> {
            x.checked_abs().ok_or_else(|| "abs: integer overflow".into())
        })
        .register_fn("sqrt", |x: FLOAT| x.sqrt())
        .register_fn("ln", |x: FLOAT| x.ln())
        .register_fn("exp", |x: FLOAT| x.exp())
        .register_fn("pow", |x: FLOAT, y: FLOAT| x.powf(y))
        .register_fn("floor", |x: FLOAT| x.floor())
        .register_fn("ceil", |x: FLOAT| x.ceil())
        .register_fn("round", |x: FLOAT| x.round())
        .register_fn("round", |x: FLOAT, digits: INT| {
            let factor = 10f64.powi(digits.clamp(0, 12) as i32);
            (x * factor).round() / factor
        })
        .register_fn("min", |a: FLOAT, b: FLOAT| a.min(b))
        .register_fn("min", |a: INT, b: INT| a.min(b))
        .register_fn("max", |a: FLOAT, b: FLOAT| a.max(b))
        .register_fn("max", |a: INT, b: INT| a.max(b))
        .register_fn("to_float", |x: INT| x as FLOAT)
        .register_fn("to_float", |x: FLOAT| x)
        .register_fn("to_int", |x: FLOAT| -> FnResult<INT> {
            if x.is_finite() {
                Ok(x.trunc() as INT)
            } else {
                Err(format!("to_int: {x} is not finite").into())
            }
        })
        .register_fn("to_int", |x: INT| x)
        .register_fn("is_nan", |x: FLOAT| x.is_nan());
}

fn register_arrays(engine: &mut Engine) {
    engine
        .register_fn("len", |arr: Array| to_int(arr.len()))
        .register_fn("first", |arr: Array| -> FnResult<Dynamic> {
            arr.first().cloned().ok_or_else(|| "first: empty array".into())
        })
        .register_fn("last", |arr: Array| -> FnResult<Dynamic> {
            arr.last().cloned().ok_or_else(|| "last: empty array".into())
        })
        .register_fn("tail", |arr: Array, n: INT| -> FnResult<Array> {
            let n = count(n, "tail")?;
            Ok(arr[arr.len().saturating_sub(n)..].to_vec())
        })
        .register_fn("push", |arr: &mut Array, value: Dynamic| arr.push(value))
        .register_fn("sum", |arr: Array| -> FnResult<FLOAT> {
            Ok(series(&arr, "sum")?.iter().sum())
        })
        .register_fn("mean", |arr: Array| -> FnResult<FLOAT> {
            let values = series(&arr, "mean")?;
            if values.is_empty() {
                return Err("mean: empty array".into());
            }
            Ok(values.iter().sum::<f64>() / values.len() as f64)
        })
        .register_fn("pct_change", |arr: Array| -> FnResult<Array> {
            let values = series(&arr, "pct_change")?;
            Ok(to_array(
                values
                    .windows(2)
                    .map(|w| if w[0] == 0.0 { 0.0 } else { (w[1] - w[0]) / w[0] })
                    .collect(),
            ))
        });
}

fn register_indicators(engine: &mut Engine, max_period: usize) {
    engine
        .register_fn("sma", move |arr: Array, n: INT| -> FnResult<Array> {
            let values = series(&arr, "sma")?;
            indicators::sma(&values, period(n, max_period, "sma")?)
                .map(to_array)
                .map_err(Into::into)
        })
        .register_fn("ema", move |arr: Array, n: INT| -> FnResult<Array> {
            let values = series(&arr, "ema")?;
            indicators::ema(&values, period(n, max_period, "ema")?)
                .map(to_array)
                .map_err(Into::into)
        })
        .register_fn("rsi", move |arr: Array, n: INT| -> FnResult<Array> {
            let values = series(&arr, "rsi")?;
            indicators::rsi(&values, period(n, max_period, "rsi")?)
                .map(to_array)
                .map_err(Into::into)
        })
        .register_fn("stdev", move |arr: Array, n: INT| -> FnResult<Array> {
            let values = series(&arr, "stdev")?;
            indicators::stdev(&values, period(n, max_period, "stdev")?)
                .map(to_array)
                .map_err(Into::into)
        })
        .register_fn(
            "macd",
            move |arr: Array, fast: INT, slow: INT, signal: INT| -> FnResult<Map> {
                let values = series(&arr, "macd")?;
                let m = indicators::macd(
                    &values,
                    period(fast, max_period, "macd")?,
                    period(slow, max_period, "macd")?,
                    period(signal, max_period, "macd")?,
                )?;
                let mut map = Map::new();
                map.insert("macd".into(), Dynamic::from_array(to_array(m.line)));
                map.insert("signal".into(), Dynamic::from_array(to_array(m.signal)));
                map.insert("histogram".into(), Dynamic::from_array(to_array(m.histogram)));
                Ok(map)
            },
        )
        .register_fn(
            "bbands",
            move |arr: Array, n: INT, k: FLOAT| -> FnResult<Map> {
                let values = series(&arr, "bbands")?;
                let bands = indicators::bollinger(&values, period(n, max_period, "bbands")?, k)?;
                let mut map = Map::new();
                map.insert("upper".into(), Dynamic::from_array(to_array(bands.upper)));
                map.insert("middle".into(), Dynamic::from_array(to_array(bands.middle)));
                map.insert("lower".into(), Dynamic::from_array(to_array(bands.lower)));
                Ok(map)
            },
        )
        .register_fn(
            "atr",
            move |high: Array, low: Array, close: Array, n: INT| -> FnResult<Array> {
                let h = series(&high, "atr")?;
                let l = series(&low, "atr")?;
                let c = series(&close, "atr")?;
                indicators::atr(&h, &l, &c, period(n, max_period, "atr")?)
                    .map(to_array)
                    .map_err(Into::into)
            },
        )
        .register_fn("highest", |arr: Array, n: INT| -> FnResult<FLOAT> {
            let values = series(&arr, "highest")?;
            indicators::highest(&values, count(n, "highest")?)
                .ok_or_else(|| "highest: empty array".into())
        })
        .register_fn("lowest", |arr: Array, n: INT| -> FnResult<FLOAT> {
            let values = series(&arr, "lowest")?;
            indicators::lowest(&values, count(n, "lowest")?)
                .ok_or_else(|| "lowest: empty array".into())
        });
}

/// Read a numeric array; integers are widened to floats.
fn series(arr: &Array, func: &str) -> FnResult<Vec<f64>> {
    arr.iter()
        .map(|v| {
            if let Ok(f) = v.as_float() {
                Ok(f)
            } else if let Ok(i) = v.as_int() {
                Ok(i as f64)
            } else {
                Err(format!("{func}: expected numbers, found {}", v.type_name()).into())
            }
        })
        .collect()
}

fn to_array(values: Vec<f64>) -> Array {
    values.into_iter().map(Dynamic::from).collect()
}

fn period(n: INT, max: usize, func: &str) -> FnResult<usize> {
    match usize::try_from(n) {
        Ok(p) if p > max => Err(format!("{func}: period {n} exceeds the limit of {max}").into()),
        Ok(p) if p > 0 => Ok(p),
        _ => Err(format!("{func}: period must be positive, got {n}").into()),
    }
}

fn count(n: INT, func: &str) -> FnResult<usize> {
    usize::try_from(n).map_err(|_| format!("{func}: count must not be negative, got {n}").into())
}

fn to_int(n: usize) -> INT {
    INT::try_from(n).unwrap_or(INT::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        let mut engine = Engine::new_raw();
        register_allow_list(&mut engine, 1_000);
        engine.register_iterator::<Array>();
        engine
    }

    #[test]
    fn test_allow_list_lookup() {
        assert!(is_allowed("rsi"));
        assert!(is_allowed("round"));
        assert!(!is_allowed("print_file"));
    }

    #[test]
    fn test_math_helpers() {
        let engine = engine();
        assert_eq!(engine.eval::<FLOAT>("round(3.14159, 2)").unwrap(), 3.14);
        assert_eq!(engine.eval::<INT>("max(3, 7)").unwrap(), 7);
        assert_eq!(engine.eval::<INT>("to_int(9.9)").unwrap(), 9);
    }

    #[test]
    fn test_series_helpers() {
        let engine = engine();
        assert_eq!(engine.eval::<FLOAT>("mean([1, 2.0, 3])").unwrap(), 2.0);
        assert_eq!(engine.eval::<INT>("len(tail([1, 2, 3, 4], 2))").unwrap(), 2);
        assert_eq!(engine.eval::<FLOAT>("highest([1.0, 5.0, 2.0], 3)").unwrap(), 5.0);
    }

    #[test]
    fn test_indicator_map_shape() {
        let engine = engine();
        let map = engine
            .eval::<Map>("macd([1.0, 2.0, 3.0, 2.5, 2.0, 3.5], 2, 4, 2)")
            .unwrap();
        assert!(map.contains_key("macd"));
        assert!(map.contains_key("signal"));
        assert!(map.contains_key("histogram"));
    }

    #[test]
    fn test_non_numeric_series_rejected() {
        let engine = engine();
        let err = engine.eval::<Array>(r#"sma(["a", "b"], 2)"#).unwrap_err();
        assert!(err.to_string().contains("expected numbers"));
    }

    #[test]
    fn test_bad_period_rejected() {
        let engine = engine();
        assert!(engine.eval::<Array>("rsi([1.0, 2.0], 0)").is_err());
        assert!(engine.eval::<Array>("ema([1.0, 2.0], -3)").is_err());
    }

    #[test]
    fn test_oversized_period_rejected() {
        let engine = engine();
        let err = engine.eval::<Array>("sma([1.0, 2.0], 10000000000)").unwrap_err();
        assert!(err.to_string().contains("exceeds the limit"), "{err}");
        assert!(engine.eval::<Map>("bbands([1.0, 2.0], 1001, 2.0)").is_err());
        assert!(engine.eval::<Array>("stdev([1.0, 2.0], 1000)").is_ok());
    }
}
