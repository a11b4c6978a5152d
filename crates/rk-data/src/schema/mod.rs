use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::NullConfig;
use crate::value;

/// Static description of a column
///
/// `kind` selects the column variant through the provider's registry.
/// Descriptors are never part of a session dump; dumps reference them by
/// [`ColumnDesc::desc_ref`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDesc {
    #[serde(rename = "type")]
    pub kind: String,

    /// Attribute of the row the column reads; empty for virtual columns
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub column: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<[f64; 2]>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<CategoryDesc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<MappingDesc>,

    /// Sort method of array/box plot columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,

    /// Grouping threshold of number columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_range: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// Fixed length of array columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,

    /// Date grouping granularity: `year`, `month` or `day`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_grouper: Option<String>,

    /// Script of script composites
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    /// Reduce method of reduce composites
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renderer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
}

impl ColumnDesc {
    pub fn new(kind: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            column: column.into(),
            ..Self::default()
        }
    }

    /// Descriptor of a virtual column type (rank, stack, ...)
    pub fn virtual_of(kind: impl Into<String>) -> Self {
        Self::new(kind, "")
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_domain(mut self, min: f64, max: f64) -> Self {
        self.domain = Some([min, max]);
        self
    }

    pub fn with_categories<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.categories = Some(names.into_iter().map(|n| CategoryDesc::Name(n.into())).collect());
        self
    }

    /// Reference used by session dumps: `<type>@<column>`, or the bare type
    /// for virtual columns
    pub fn desc_ref(&self) -> String {
        if self.column.is_empty() {
            self.kind.clone()
        } else {
            format!("{}@{}", self.kind, self.column)
        }
    }

    /// Split a descriptor reference into type and column
    pub fn parse_ref(desc_ref: &str) -> (&str, &str) {
        match desc_ref.split_once('@') {
            Some((kind, column)) => (kind, column),
            None => (desc_ref, ""),
        }
    }

    /// Display label, defaulting to the attribute name
    pub fn display_label(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None if !self.column.is_empty() => self.column.clone(),
            None => self.kind.clone(),
        }
    }
}

/// A declared category, either a bare name or a full record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryDesc {
    Name(String),
    Full {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<f64>,
    },
}

impl CategoryDesc {
    pub fn name(&self) -> &str {
        match self {
            CategoryDesc::Name(name) => name,
            CategoryDesc::Full { name, .. } => name,
        }
    }
}

/// Serialized form of a mapping function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDesc {
    #[serde(rename = "type")]
    pub kind: String,

    pub domain: [f64; 2],

    #[serde(default = "unit_range")]
    pub range: [f64; 2],

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exponent: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

fn unit_range() -> [f64; 2] {
    [0.0, 1.0]
}

/// Detector deriving column descriptors from sample rows
pub struct SchemaDetector {
    sample_size: usize,
    max_categories: usize,
    nulls: NullConfig,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Detected {
    Boolean,
    Number { min: f64, max: f64 },
    Date,
    Categorical,
    String,
}

impl SchemaDetector {
    /// Create a new schema detector
    pub fn new() -> Self {
        Self {
            sample_size: 1000,
            max_categories: 10,
            nulls: NullConfig::default(),
        }
    }

    /// Set the sample size for detection
    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size;
        self
    }

    /// Maximum distinct values for a string attribute to become categorical
    pub fn with_max_categories(mut self, max: usize) -> Self {
        self.max_categories = max;
        self
    }

    pub fn with_nulls(mut self, nulls: NullConfig) -> Self {
        self.nulls = nulls;
        self
    }

    /// Derive one descriptor per attribute, in first-seen attribute order
    pub fn detect(&self, rows: &[Value]) -> Vec<ColumnDesc> {
        let sample = &rows[..rows.len().min(self.sample_size)];
        let mut attributes: Vec<String> = Vec::new();
        let mut seen = AHashSet::new();
        for row in sample {
            if let Some(object) = row.as_object() {
                for key in object.keys() {
                    if seen.insert(key.clone()) {
                        attributes.push(key.clone());
                    }
                }
            }
        }

        let descs: Vec<ColumnDesc> = attributes
            .into_iter()
            .map(|attribute| self.describe(sample, &attribute))
            .collect();
        tracing::debug!(sampled = sample.len(), columns = descs.len(), "detected column descriptors");
        descs
    }

    fn describe(&self, sample: &[Value], attribute: &str) -> ColumnDesc {
        let values: Vec<&Value> = sample
            .iter()
            .filter_map(|row| value::resolve(row, attribute))
            .filter(|v| value::as_text(Some(v), &self.nulls).is_some())
            .collect();

        match self.analyze(&values) {
            Detected::Boolean => ColumnDesc::new("boolean", attribute),
            Detected::Number { min, max } => {
                let (min, max) = if min < max { (min, max) } else { (min - 0.5, max + 0.5) };
                ColumnDesc::new("number", attribute).with_domain(min, max)
            }
            Detected::Date => ColumnDesc::new("date", attribute),
            Detected::Categorical => {
                let mut categories: Vec<String> = values
                    .iter()
                    .filter_map(|v| value::as_text(Some(v), &self.nulls))
                    .collect::<AHashSet<_>>()
                    .into_iter()
                    .collect();
                categories.sort();
                ColumnDesc::new("categorical", attribute).with_categories(categories)
            }
            Detected::String => ColumnDesc::new("string", attribute),
        }
    }

    fn analyze(&self, values: &[&Value]) -> Detected {
        if values.is_empty() {
            return Detected::String;
        }

        let mut is_bool = true;
        let mut is_number = true;
        let mut is_date = true;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut distinct: AHashMap<String, usize> = AHashMap::new();

        for v in values {
            if is_bool && !matches!(v, Value::Bool(_)) {
                is_bool = false;
            }
            let number = value::as_number(Some(v), &self.nulls);
            if number.is_nan() || matches!(v, Value::Bool(_)) {
                is_number = false;
            } else {
                min = min.min(number);
                max = max.max(number);
            }
            if is_date && !matches!(v, Value::String(s) if value::parse_date(s, None).is_some()) {
                is_date = false;
            }
            if let Some(text) = value::as_text(Some(v), &self.nulls) {
                *distinct.entry(text).or_insert(0) += 1;
            }
        }

        if is_bool {
            Detected::Boolean
        } else if is_number {
            Detected::Number { min, max }
        } else if is_date {
            Detected::Date
        } else if distinct.len() <= self.max_categories && distinct.len() < values.len() {
            Detected::Categorical
        } else {
            Detected::String
        }
    }
}

impl Default for SchemaDetector {
    fn default() -> Self {
        Self::new()
    }
}
