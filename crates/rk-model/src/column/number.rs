//! Numeric value columns: number, box plot, numbers and booleans arrays

use std::cmp::Ordering;

use rk_data::schema::ColumnDesc;
use rk_data::stats::{compute_box_plot, SortMethod};
use rk_data::value::{self, DataRow};
use rk_data::MappingFunction;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::EvalContext;
use crate::ranking::Group;
use crate::ModelError;

/// Total order on numbers with missing (NaN) values first
pub fn compare_numbers(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Compact label of a number; empty for missing
pub fn format_number(v: f64) -> String {
    if v.is_nan() {
        return String::new();
    }
    if v.fract() == 0.0 && v.abs() < 1e15 {
        return format!("{:.0}", v);
    }
    let text = format!("{:.3}", v);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Mapping from a descriptor: explicit `map`, else `domain`/`range`, else [0, 1]
pub(crate) fn mapping_from_desc(desc: &ColumnDesc) -> Result<MappingFunction, ModelError> {
    if let Some(map) = &desc.map {
        return Ok(MappingFunction::from_desc(map)?);
    }
    let [min, max] = desc.domain.unwrap_or([0.0, 1.0]);
    let mapping = MappingFunction::linear(min, max)?;
    Ok(match desc.range {
        Some(range) => mapping.with_range(range)?,
        None => mapping,
    })
}

/// Range filter on raw values
///
/// Unset bounds are open. `filter_missing` removes rows whose value is
/// missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default)]
    pub filter_missing: bool,
}

impl NumberFilter {
    pub fn new(min: Option<f64>, max: Option<f64>, filter_missing: bool) -> Self {
        Self { min, max, filter_missing }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.min.map_or(false, f64::is_nan) || self.max.map_or(false, f64::is_nan) {
            return Err(ModelError::InvalidFilter("NaN bound".to_string()));
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(ModelError::InvalidFilter(format!("min {} > max {}", min, max)));
            }
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.min.is_some() || self.max.is_some() || self.filter_missing
    }

    pub fn accepts(&self, v: f64) -> bool {
        if v.is_nan() {
            return !self.filter_missing;
        }
        self.min.map_or(true, |min| v >= min) && self.max.map_or(true, |max| v <= max)
    }
}

/// Per-row box plot summary, either given precomputed or derived
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowSummary {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub mean: f64,
}

impl RowSummary {
    pub fn statistic(&self, method: SortMethod) -> f64 {
        match method {
            SortMethod::Min => self.min,
            SortMethod::Max => self.max,
            SortMethod::Median => self.median,
            SortMethod::Q1 => self.q1,
            SortMethod::Q3 => self.q3,
            SortMethod::Mean => self.mean,
        }
    }

    fn from_values(values: &[f64]) -> Option<Self> {
        let b = compute_box_plot(values.iter().copied(), None);
        if b.is_empty() {
            return None;
        }
        Some(Self {
            min: b.min(),
            q1: b.q1(),
            median: b.median(),
            q3: b.q3(),
            max: b.max(),
            mean: b.mean(),
        })
    }

    fn map(&self, mapping: &MappingFunction) -> Self {
        Self {
            min: mapping.apply(self.min),
            q1: mapping.apply(self.q1),
            median: mapping.apply(self.median),
            q3: mapping.apply(self.q3),
            max: mapping.apply(self.max),
            mean: mapping.apply(self.mean),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NumberColumn {
    pub(crate) attribute: String,
    pub(crate) mapping: MappingFunction,
    pub(crate) filter: NumberFilter,
    pub(crate) threshold: Option<f64>,
}

impl NumberColumn {
    pub fn from_desc(desc: &ColumnDesc) -> Result<Self, ModelError> {
        Ok(Self {
            attribute: desc.column.clone(),
            mapping: mapping_from_desc(desc)?,
            filter: NumberFilter::default(),
            threshold: desc.threshold,
        })
    }

    pub fn raw(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> f64 {
        value::as_number(row.get(&self.attribute), ctx.nulls)
    }

    pub fn normalized(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> f64 {
        self.mapping.apply(self.raw(row, ctx))
    }

    pub fn mapping(&self) -> &MappingFunction {
        &self.mapping
    }

    pub fn filter(&self) -> &NumberFilter {
        &self.filter
    }

    /// Grouping threshold; defaults to the middle of the mapping domain
    pub fn threshold(&self) -> f64 {
        self.threshold.unwrap_or_else(|| {
            let [min, max] = self.mapping.domain();
            (min + max) / 2.0
        })
    }

    pub(crate) fn group(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> Group {
        let raw = self.raw(row, ctx);
        if raw.is_nan() {
            return Group::missing();
        }
        let t = self.threshold();
        if raw < t {
            Group::new(format!("< {}", format_number(t)), "#9ecae1")
        } else {
            Group::new(format!("≥ {}", format_number(t)), "#3182bd")
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoxPlotColumn {
    pub(crate) attribute: String,
    pub(crate) mapping: MappingFunction,
    pub(crate) filter: NumberFilter,
    pub(crate) sort_method: SortMethod,
}

impl BoxPlotColumn {
    pub fn from_desc(desc: &ColumnDesc) -> Result<Self, ModelError> {
        Ok(Self {
            attribute: desc.column.clone(),
            mapping: mapping_from_desc(desc)?,
            filter: NumberFilter::default(),
            sort_method: desc.sort.as_deref().and_then(SortMethod::parse).unwrap_or_default(),
        })
    }

    /// Raw summary of a row: a `{min, q1, median, q3, max, mean?}` object
    /// or an array of numbers
    pub fn summary(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> Option<RowSummary> {
        match row.get(&self.attribute)? {
            Value::Object(object) => {
                let field = |name: &str| value::as_number(object.get(name), ctx.nulls);
                let (min, q1, median, q3, max) = (field("min"), field("q1"), field("median"), field("q3"), field("max"));
                if [min, q1, median, q3, max].iter().any(|v| v.is_nan()) {
                    return None;
                }
                let mean = field("mean");
                Some(RowSummary {
                    min,
                    q1,
                    median,
                    q3,
                    max,
                    mean: if mean.is_nan() { median } else { mean },
                })
            }
            v @ Value::Array(_) => RowSummary::from_values(&value::as_numbers(Some(v), ctx.nulls)),
            _ => None,
        }
    }

    pub fn mapped_summary(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> Option<RowSummary> {
        self.summary(row, ctx).map(|s| s.map(&self.mapping))
    }

    pub fn raw(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> f64 {
        self.summary(row, ctx)
            .map_or(f64::NAN, |s| s.statistic(self.sort_method))
    }

    pub fn normalized(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> f64 {
        self.mapping.apply(self.raw(row, ctx))
    }

    pub fn label(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> String {
        match self.summary(row, ctx) {
            Some(s) => format!(
                "min = {}, median = {}, max = {}",
                format_number(s.min),
                format_number(s.median),
                format_number(s.max)
            ),
            None => String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NumbersColumn {
    pub(crate) attribute: String,
    pub(crate) mapping: MappingFunction,
    pub(crate) filter: NumberFilter,
    pub(crate) sort_method: SortMethod,
    pub(crate) data_length: Option<usize>,
}

impl NumbersColumn {
    pub fn from_desc(desc: &ColumnDesc) -> Result<Self, ModelError> {
        Ok(Self {
            attribute: desc.column.clone(),
            mapping: mapping_from_desc(desc)?,
            filter: NumberFilter::default(),
            sort_method: desc.sort.as_deref().and_then(SortMethod::parse).unwrap_or_default(),
            data_length: desc.data_length,
        })
    }

    /// Raw values of a row, padded or truncated to the declared length
    pub fn values(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> Vec<f64> {
        let mut values = value::as_numbers(row.get(&self.attribute), ctx.nulls);
        if let Some(len) = self.data_length {
            values.resize(len, f64::NAN);
        }
        values
    }

    pub fn raw(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> f64 {
        let values = self.values(row, ctx);
        compute_box_plot(values, None).statistic(self.sort_method)
    }

    pub fn normalized(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> f64 {
        let values = self.values(row, ctx);
        compute_box_plot(values, Some(&self.mapping)).statistic(self.sort_method)
    }

    pub fn label(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> String {
        self.values(row, ctx)
            .into_iter()
            .map(format_number)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone)]
pub struct BooleansColumn {
    pub(crate) attribute: String,
    /// `Some(true)`: at least one true value; `Some(false)`: none
    pub(crate) filter: Option<bool>,
    pub(crate) data_length: Option<usize>,
}

impl BooleansColumn {
    pub fn from_desc(desc: &ColumnDesc) -> Self {
        Self {
            attribute: desc.column.clone(),
            filter: None,
            data_length: desc.data_length,
        }
    }

    pub fn values(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> Vec<Option<bool>> {
        let mut values = value::as_bools(row.get(&self.attribute), ctx.nulls);
        if let Some(len) = self.data_length {
            values.resize(len, None);
        }
        values
    }

    /// Number of true values, NaN when the row has no values at all
    pub fn raw(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> f64 {
        let values = self.values(row, ctx);
        if values.iter().all(Option::is_none) {
            return f64::NAN;
        }
        values.iter().filter(|v| **v == Some(true)).count() as f64
    }

    /// Share of true values
    pub fn normalized(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> f64 {
        let values = self.values(row, ctx);
        let present = values.iter().filter(|v| v.is_some()).count();
        if present == 0 {
            return f64::NAN;
        }
        values.iter().filter(|v| **v == Some(true)).count() as f64 / present as f64
    }

    pub fn accepts(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> bool {
        match self.filter {
            None => true,
            Some(wanted) => self.values(row, ctx).iter().any(|v| *v == Some(true)) == wanted,
        }
    }

    pub fn label(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> String {
        self.values(row, ctx)
            .into_iter()
            .map(|v| match v {
                Some(true) => "1",
                Some(false) => "0",
                None => "",
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rk_core::SelectionState;
    use rk_data::NullConfig;
    use serde_json::json;

    fn with_ctx<R>(f: impl FnOnce(&EvalContext<'_>) -> R) -> R {
        let nulls = NullConfig::default();
        let selection = SelectionState::default();
        f(&EvalContext::new(&nulls, &selection))
    }

    #[test]
    fn test_missing_sorts_first() {
        assert_eq!(compare_numbers(f64::NAN, -1e9), Ordering::Less);
        assert_eq!(compare_numbers(3.0, f64::NAN), Ordering::Greater);
        assert_eq!(compare_numbers(f64::NAN, f64::NAN), Ordering::Equal);
        assert_eq!(compare_numbers(1.0, 2.0), Ordering::Less);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(1.23456), "1.235");
        assert_eq!(format_number(f64::NAN), "");
    }

    #[test]
    fn test_number_filter() {
        let f = NumberFilter::new(Some(2.0), Some(5.0), true);
        assert!(f.accepts(2.0));
        assert!(!f.accepts(5.5));
        assert!(!f.accepts(f64::NAN));
        assert!(NumberFilter::new(None, None, false).accepts(f64::NAN));
        assert!(NumberFilter::new(Some(3.0), Some(1.0), false).validate().is_err());
        assert!(!NumberFilter::default().is_active());
    }

    #[test]
    fn test_number_column_normalizes() {
        let desc = ColumnDesc::new("number", "a").with_domain(0.0, 20.0);
        let column = NumberColumn::from_desc(&desc).unwrap();
        let row = json!({"a": 5});
        with_ctx(|ctx| {
            assert_eq!(column.raw(DataRow::new(0, &row), ctx), 5.0);
            assert_eq!(column.normalized(DataRow::new(0, &row), ctx), 0.25);
            assert_eq!(column.group(DataRow::new(0, &row), ctx).name, "< 10");
        });
    }

    #[test]
    fn test_box_plot_column_reads_objects_and_arrays() {
        let desc = ColumnDesc {
            sort: Some("max".to_string()),
            ..ColumnDesc::new("boxplot", "b").with_domain(0.0, 10.0)
        };
        let column = BoxPlotColumn::from_desc(&desc).unwrap();
        let object = json!({"b": {"min": 1, "q1": 2, "median": 3, "q3": 4, "max": 5}});
        let array = json!({"b": [1, 2, 8]});
        with_ctx(|ctx| {
            let summary = column.summary(DataRow::new(0, &object), ctx).unwrap();
            assert_eq!(summary.mean, 3.0);
            assert_eq!(column.raw(DataRow::new(0, &object), ctx), 5.0);
            assert_eq!(column.normalized(DataRow::new(0, &array), ctx), 0.8);
            assert!(column.raw(DataRow::new(0, &json!({})), ctx).is_nan());
        });
    }

    #[test]
    fn test_numbers_column_sort_statistic() {
        let desc = ColumnDesc {
            data_length: Some(4),
            ..ColumnDesc::new("numbers", "v").with_domain(0.0, 10.0)
        };
        let column = NumbersColumn::from_desc(&desc).unwrap();
        let row = json!({"v": [2, 4, 9]});
        with_ctx(|ctx| {
            assert_eq!(column.values(DataRow::new(0, &row), ctx).len(), 4);
            assert_eq!(column.raw(DataRow::new(0, &row), ctx), 4.0);
            assert_eq!(column.normalized(DataRow::new(0, &row), ctx), 0.4);
            assert_eq!(column.label(DataRow::new(0, &row), ctx), "2, 4, 9, ");
        });
    }

    #[test]
    fn test_booleans_column() {
        let mut column = BooleansColumn::from_desc(&ColumnDesc::new("booleans", "b"));
        let row = json!({"b": [true, false, true, false]});
        let none = json!({"b": [false, false]});
        with_ctx(|ctx| {
            assert_eq!(column.raw(DataRow::new(0, &row), ctx), 2.0);
            assert_eq!(column.normalized(DataRow::new(0, &row), ctx), 0.5);
            column.filter = Some(true);
            assert!(column.accepts(DataRow::new(0, &row), ctx));
            assert!(!column.accepts(DataRow::new(1, &none), ctx));
        });
    }
}
