//! Row loading from CSV and JSON files

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use serde_json::{Map, Number, Value};

use crate::{ProviderError, Result};

/// Load a CSV file with a header row
///
/// Every record becomes an object keyed by header. Numeric cells become
/// numbers and `true`/`false` become booleans; everything else stays text.
/// Empty cells are kept as empty strings so missing value detection sees
/// them.
pub async fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Value>> {
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || read_csv(&path)).await?
}

fn read_csv(path: &Path) -> Result<Vec<Value>> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let row: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| (header.to_string(), parse_cell(cell)))
            .collect();
        rows.push(Value::Object(row));
    }
    tracing::debug!(path = %path.display(), rows = rows.len(), "loaded CSV");
    Ok(rows)
}

fn parse_cell(cell: &str) -> Value {
    let trimmed = cell.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    match trimmed {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(cell.to_string()),
    }
}

/// Load a JSON file holding an array of row objects
pub async fn load_json(path: impl AsRef<Path>) -> Result<Vec<Value>> {
    let path = path.as_ref().to_path_buf();
    let text = tokio::fs::read_to_string(&path).await?;
    let rows: Vec<Value> = serde_json::from_str(&text)?;
    tracing::debug!(path = %path.display(), rows = rows.len(), "loaded JSON");
    Ok(rows)
}

/// Load rows, choosing the format by file extension
pub async fn load_rows(path: impl AsRef<Path>) -> Result<Vec<Value>> {
    let path: PathBuf = path.as_ref().to_path_buf();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("csv") => load_csv(&path).await,
        Some("json") => load_json(&path).await,
        _ => Err(ProviderError::UnsupportedFormat(path.display().to_string())),
    }
}
