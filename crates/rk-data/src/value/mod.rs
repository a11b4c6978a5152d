//! Typed access to JSON-like rows
//!
//! Every accessor returns a sentinel for absent or unparsable data
//! (`None`, `NaN`, empty vector); none of them fail.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::config::NullConfig;

/// A row together with its position in the provider's row set
#[derive(Debug, Clone, Copy)]
pub struct DataRow<'a> {
    pub index: usize,
    pub value: &'a Value,
}

impl<'a> DataRow<'a> {
    pub fn new(index: usize, value: &'a Value) -> Self {
        Self { index, value }
    }

    /// Resolve a (possibly dotted) attribute path
    pub fn get(&self, path: &str) -> Option<&'a Value> {
        resolve(self.value, path)
    }
}

/// Resolve an attribute of a row object
///
/// An exact key match wins; otherwise `a.b.c` walks nested objects.
pub fn resolve<'a>(row: &'a Value, path: &str) -> Option<&'a Value> {
    let object = row.as_object()?;
    if let Some(value) = object.get(path) {
        return Some(value);
    }
    if !path.contains('.') {
        return None;
    }
    path.split('.').try_fold(row, |current, key| current.as_object()?.get(key))
}

/// Numeric interpretation of a cell, `NaN` when missing
pub fn as_number(value: Option<&Value>, nulls: &NullConfig) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) if !nulls.is_missing(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => f64::NAN,
    }
}

/// Textual interpretation of a cell
pub fn as_text(value: Option<&Value>, nulls: &NullConfig) -> Option<String> {
    match value? {
        Value::String(s) if nulls.is_missing(s) => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Boolean interpretation of a cell
pub fn as_bool(value: Option<&Value>, nulls: &NullConfig) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) if nulls.is_missing(s) => None,
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "x" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Date interpretation of a cell
///
/// Numbers are epoch milliseconds; strings are tried as RFC 3339, then
/// with the given format, then as `%Y-%m-%d`.
pub fn as_date(value: Option<&Value>, format: Option<&str>, nulls: &NullConfig) -> Option<DateTime<Utc>> {
    match value? {
        Value::Number(n) => n
            .as_f64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms as i64).single()),
        Value::String(s) if nulls.is_missing(s) => None,
        Value::String(s) => parse_date(s.trim(), format),
        _ => None,
    }
}

pub fn parse_date(text: &str, format: Option<&str>) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    if let Some(format) = format {
        if let Ok(date) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&date));
        }
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0).map(|d| Utc.from_utc_datetime(&d));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| Utc.from_utc_datetime(&d))
}

/// Per-element numeric interpretation of an array cell
pub fn as_numbers(value: Option<&Value>, nulls: &NullConfig) -> Vec<f64> {
    match value {
        Some(Value::Array(items)) => items.iter().map(|v| as_number(Some(v), nulls)).collect(),
        _ => Vec::new(),
    }
}

/// Per-element textual interpretation of an array cell
pub fn as_texts(value: Option<&Value>, nulls: &NullConfig) -> Vec<Option<String>> {
    match value {
        Some(Value::Array(items)) => items.iter().map(|v| as_text(Some(v), nulls)).collect(),
        _ => Vec::new(),
    }
}

/// Per-element boolean interpretation of an array cell
pub fn as_bools(value: Option<&Value>, nulls: &NullConfig) -> Vec<Option<bool>> {
    match value {
        Some(Value::Array(items)) => items.iter().map(|v| as_bool(Some(v), nulls)).collect(),
        _ => Vec::new(),
    }
}
