//! Values a snippet may place in `result`

use crate::error::{SandboxError, SandboxResult};
use rhai::{Array, Dynamic, ImmutableString, Map};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Numeric, text or list value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
    List(Vec<MetricValue>),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[MetricValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Numbers inside a list, skipping anything else
    pub fn numbers(&self) -> Vec<f64> {
        self.as_list()
            .map(|items| items.iter().filter_map(Self::as_f64).collect())
            .unwrap_or_default()
    }

    /// Text entries inside a list, skipping anything else
    pub fn texts(&self) -> Vec<String> {
        self.as_list()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(ToString::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<f64>> for MetricValue {
    fn from(values: Vec<f64>) -> Self {
        Self::List(values.into_iter().map(Self::Number).collect())
    }
}

impl From<Vec<String>> for MetricValue {
    fn from(values: Vec<String>) -> Self {
        Self::List(values.into_iter().map(Self::Text).collect())
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Convert the snippet's `result` binding into plain values.
pub(crate) fn extract_result(result: Dynamic) -> SandboxResult<BTreeMap<String, MetricValue>> {
    let result = result.flatten();
    let type_name = result.type_name();
    let Some(map) = result.try_cast::<Map>() else {
        return Err(SandboxError::ContractViolation(format!(
            "`result` must be a map, found {type_name}"
        )));
    };

    let mut values = BTreeMap::new();
    for (key, value) in map {
        let path = key.to_string();
        if let Some(converted) = convert(value, &path)? {
            values.insert(path, converted);
        }
    }
    Ok(values)
}

/// `Ok(None)` means the entry is unit and gets dropped.
fn convert(value: Dynamic, path: &str) -> SandboxResult<Option<MetricValue>> {
    if value.is::<()>() {
        return Ok(None);
    }
    if let Ok(n) = value.as_float() {
        return Ok(Some(MetricValue::Number(n)));
    }
    if let Ok(n) = value.as_int() {
        return Ok(Some(MetricValue::Number(n as f64)));
    }
    if let Ok(b) = value.as_bool() {
        return Ok(Some(MetricValue::Text(b.to_string())));
    }
    if let Ok(c) = value.as_char() {
        return Ok(Some(MetricValue::Text(c.to_string())));
    }
    if value.is::<ImmutableString>() {
        let text = value
            .into_string()
            .map_err(|t| SandboxError::ContractViolation(format!("`result.{path}`: {t}")))?;
        return Ok(Some(MetricValue::Text(text)));
    }
    if value.is::<Array>() {
        let type_name = value.type_name();
        let items = value.try_cast::<Array>().ok_or_else(|| {
            SandboxError::ContractViolation(format!("`result.{path}` is not a list ({type_name})"))
        })?;
        let mut list = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            let item_path = format!("{path}[{i}]");
            if item.is::<Array>() {
                return Err(SandboxError::ContractViolation(format!(
                    "`result.{item_path}` is a nested list"
                )));
            }
            match convert(item, &item_path)? {
                Some(v) => list.push(v),
                None => {
                    return Err(SandboxError::ContractViolation(format!(
                        "`result.{item_path}` is unit"
                    )));
                }
            }
        }
        return Ok(Some(MetricValue::List(list)));
    }

    Err(SandboxError::ContractViolation(format!(
        "`result.{path}` has unsupported type {}",
        value.type_name()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_serialization() {
        let value = MetricValue::List(vec![MetricValue::Number(1.5), "x".into()]);
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"[1.5,"x"]"#);

        let back: MetricValue = serde_json::from_str(r#"[1.5,"x"]"#).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_list_accessors() {
        let value = MetricValue::from(vec![1.0, 2.0]);
        assert_eq!(value.numbers(), vec![1.0, 2.0]);
        assert!(value.texts().is_empty());
        assert_eq!(MetricValue::from(3.0).numbers(), Vec::<f64>::new());
    }

    #[test]
    fn test_display() {
        let value = MetricValue::List(vec![1.0.into(), "a".into()]);
        assert_eq!(value.to_string(), "[1, a]");
    }

    #[test]
    fn test_extract_rejects_non_map() {
        let arr: Array = vec![Dynamic::from(1_i64)];
        let err = extract_result(Dynamic::from_array(arr)).unwrap_err();
        assert!(matches!(err, SandboxError::ContractViolation(_)));
    }

    #[test]
    fn test_extract_converts_scalars() {
        let mut map = Map::new();
        map.insert("rsi".into(), Dynamic::from(55.5_f64));
        map.insert("bars".into(), Dynamic::from(60_i64));
        map.insert("flag".into(), Dynamic::from(true));
        map.insert("skip".into(), Dynamic::UNIT);
        let values = extract_result(Dynamic::from_map(map)).unwrap();

        assert_eq!(values.get("rsi"), Some(&MetricValue::Number(55.5)));
        assert_eq!(values.get("bars"), Some(&MetricValue::Number(60.0)));
        assert_eq!(values.get("flag"), Some(&MetricValue::Text("true".to_string())));
        assert!(!values.contains_key("skip"));
    }

    #[test]
    fn test_extract_rejects_nested_map() {
        let mut inner = Map::new();
        inner.insert("a".into(), Dynamic::from(1.0_f64));
        let mut map = Map::new();
        map.insert("nested".into(), Dynamic::from_map(inner));
        let err = extract_result(Dynamic::from_map(map)).unwrap_err();
        assert!(err.to_string().contains("nested"));
    }
}
