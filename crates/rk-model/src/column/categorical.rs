//! Categorical and ordinal columns, single valued and array valued

use std::cmp::Ordering;

use rk_data::schema::{CategoryDesc, ColumnDesc};
use rk_data::value::{self, DataRow};
use rk_data::DataError;
use serde::{Deserialize, Serialize};

use super::EvalContext;
use crate::ranking::Group;
use crate::ModelError;

/// Default category colors
pub const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f", "#bcbd22", "#17becf",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub name: String,
    pub label: String,
    pub color: String,
    /// Ordinal value in [0, 1]
    pub value: f64,
}

/// Resolve declared categories, filling labels, palette colors and evenly
/// spaced ordinal values
pub(crate) fn categories_from_desc(desc: &ColumnDesc) -> Result<Vec<Category>, ModelError> {
    let declared = desc.categories.as_deref().unwrap_or_default();
    if declared.is_empty() {
        return Err(DataError::Descriptor(format!("categorical column '{}' declares no categories", desc.column)).into());
    }
    let step = if declared.len() > 1 { 1.0 / (declared.len() - 1) as f64 } else { 1.0 };
    Ok(declared
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let default_color = desc
                .color_range
                .as_ref()
                .and_then(|colors| colors.get(i))
                .cloned()
                .unwrap_or_else(|| PALETTE[i % PALETTE.len()].to_string());
            match c {
                CategoryDesc::Name(name) => Category {
                    name: name.clone(),
                    label: name.clone(),
                    color: default_color,
                    value: i as f64 * step,
                },
                CategoryDesc::Full { name, label, color, value } => Category {
                    name: name.clone(),
                    label: label.clone().unwrap_or_else(|| name.clone()),
                    color: color.clone().unwrap_or(default_color),
                    value: value.unwrap_or(i as f64 * step),
                },
            }
        })
        .collect())
}

/// Set filter on category names
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoricalFilter {
    pub categories: Vec<String>,
    #[serde(default)]
    pub filter_missing: bool,
}

impl CategoricalFilter {
    pub fn new<S: Into<String>>(categories: impl IntoIterator<Item = S>, filter_missing: bool) -> Self {
        Self {
            categories: categories.into_iter().map(Into::into).collect(),
            filter_missing,
        }
    }

    fn accepts(&self, name: Option<&str>) -> bool {
        match name {
            Some(name) => self.categories.iter().any(|c| c == name),
            None => !self.filter_missing,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CategoricalColumn {
    pub(crate) attribute: String,
    pub(crate) categories: Vec<Category>,
    pub(crate) filter: Option<CategoricalFilter>,
    pub(crate) ordinal: bool,
}

impl CategoricalColumn {
    pub fn from_desc(desc: &ColumnDesc, ordinal: bool) -> Result<Self, ModelError> {
        Ok(Self {
            attribute: desc.column.clone(),
            categories: categories_from_desc(desc)?,
            filter: None,
            ordinal,
        })
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn is_ordinal(&self) -> bool {
        self.ordinal
    }

    /// Declared category of a row; undeclared values count as missing
    pub fn category(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> Option<(usize, &Category)> {
        let text = value::as_text(row.get(&self.attribute), ctx.nulls)?;
        self.categories.iter().enumerate().find(|(_, c)| c.name == text)
    }

    pub fn number(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> f64 {
        self.category(row, ctx).map_or(f64::NAN, |(_, c)| c.value)
    }

    pub fn compare(&self, a: DataRow<'_>, b: DataRow<'_>, ctx: &EvalContext<'_>) -> Ordering {
        let index = |row| self.category(row, ctx).map(|(i, _)| i);
        index(a).cmp(&index(b))
    }

    pub fn accepts(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> bool {
        match &self.filter {
            None => true,
            Some(filter) => filter.accepts(self.category(row, ctx).map(|(_, c)| c.name.as_str())),
        }
    }

    pub(crate) fn group(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> Group {
        match self.category(row, ctx) {
            Some((_, c)) => Group::new(c.label.clone(), c.color.clone()),
            None => Group::missing(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CategoricalsColumn {
    pub(crate) attribute: String,
    pub(crate) categories: Vec<Category>,
    /// Keeps rows with at least one element in the filter set
    pub(crate) filter: Option<CategoricalFilter>,
    pub(crate) data_length: Option<usize>,
}

impl CategoricalsColumn {
    pub fn from_desc(desc: &ColumnDesc) -> Result<Self, ModelError> {
        Ok(Self {
            attribute: desc.column.clone(),
            categories: categories_from_desc(desc)?,
            filter: None,
            data_length: desc.data_length,
        })
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Category index per element, `None` for missing or undeclared values
    pub fn indices(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> Vec<Option<usize>> {
        let mut indices: Vec<Option<usize>> = value::as_texts(row.get(&self.attribute), ctx.nulls)
            .into_iter()
            .map(|text| text.and_then(|t| self.categories.iter().position(|c| c.name == t)))
            .collect();
        if let Some(len) = self.data_length {
            indices.resize(len, None);
        }
        indices
    }

    pub fn names(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> Vec<Option<String>> {
        self.indices(row, ctx)
            .into_iter()
            .map(|i| i.map(|i| self.categories[i].name.clone()))
            .collect()
    }

    pub fn compare(&self, a: DataRow<'_>, b: DataRow<'_>, ctx: &EvalContext<'_>) -> Ordering {
        self.indices(a, ctx).cmp(&self.indices(b, ctx))
    }

    pub fn accepts(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> bool {
        let Some(filter) = &self.filter else {
            return true;
        };
        let indices = self.indices(row, ctx);
        if indices.iter().all(Option::is_none) {
            return !filter.filter_missing;
        }
        indices
            .into_iter()
            .flatten()
            .any(|i| filter.categories.iter().any(|c| *c == self.categories[i].name))
    }

    pub fn label(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> String {
        self.indices(row, ctx)
            .into_iter()
            .map(|i| i.map_or("", |i| self.categories[i].label.as_str()).to_string())
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

    fn column() -> CategoricalColumn {
        let desc = ColumnDesc::new("categorical", "c").with_categories(["low", "mid", "high"]);
        CategoricalColumn::from_desc(&desc, false).unwrap()
    }

    #[test]
    fn test_categories_get_palette_and_ordinal_values() {
        let c = column();
        assert_eq!(c.categories()[0].color, PALETTE[0]);
        assert_eq!(c.categories()[1].value, 0.5);
        assert_eq!(c.categories()[2].value, 1.0);
    }

    #[test]
    fn test_undeclared_value_is_missing() {
        let nulls = NullConfig::default();
        let selection = SelectionState::default();
        let ctx = EvalContext::new(&nulls, &selection);
        let c = column();
        let unknown = json!({"c": "huge"});
        let high = json!({"c": "high"});
        assert!(c.category(DataRow::new(0, &unknown), &ctx).is_none());
        assert_eq!(
            c.compare(DataRow::new(0, &unknown), DataRow::new(1, &high), &ctx),
            Ordering::Less
        );
        assert!(c.group(DataRow::new(0, &unknown), &ctx).is_missing());
    }

    #[test]
    fn test_filter_by_name_and_missing() {
        let nulls = NullConfig::default();
        let selection = SelectionState::default();
        let ctx = EvalContext::new(&nulls, &selection);
        let mut c = column();
        c.filter = Some(CategoricalFilter::new(["low"], true));
        assert!(c.accepts(DataRow::new(0, &json!({"c": "low"})), &ctx));
        assert!(!c.accepts(DataRow::new(0, &json!({"c": "mid"})), &ctx));
        assert!(!c.accepts(DataRow::new(0, &json!({"c": null})), &ctx));
    }

    #[test]
    fn test_categoricals_filter_any_element() {
        let nulls = NullConfig::default();
        let selection = SelectionState::default();
        let ctx = EvalContext::new(&nulls, &selection);
        let desc = ColumnDesc::new("categoricals", "tags").with_categories(["a", "b", "c"]);
        let mut c = CategoricalsColumn::from_desc(&desc).unwrap();
        c.filter = Some(CategoricalFilter::new(["b"], false));
        let row = json!({"tags": ["a", "b"]});
        assert!(c.accepts(DataRow::new(0, &row), &ctx));
        assert!(!c.accepts(DataRow::new(0, &json!({"tags": ["c"]})), &ctx));
        assert_eq!(c.label(DataRow::new(0, &row), &ctx), "a, b");
    }

    #[test]
    fn test_categorical_without_categories_is_rejected() {
        assert!(CategoricalColumn::from_desc(&ColumnDesc::new("categorical", "c"), false).is_err());
    }
}
