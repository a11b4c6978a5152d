//! String, boolean and date columns

use std::cmp::Ordering;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, Utc};
use regex::{Regex, RegexBuilder};
use rk_data::schema::ColumnDesc;
use rk_data::value::{self, DataRow};
use serde::{Deserialize, Serialize};

use super::number::NumberFilter;
use super::EvalContext;
use crate::ranking::Group;
use crate::ModelError;

/// Text filter: case-insensitive substring, or a regular expression
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringFilter {
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub regex: bool,
    #[serde(default)]
    pub filter_missing: bool,
}

impl StringFilter {
    pub fn substring(pattern: impl Into<String>) -> Self {
        Self { pattern: pattern.into(), ..Self::default() }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self { pattern: pattern.into(), regex: true, ..Self::default() }
    }

    /// Only drop rows with a missing value
    pub fn missing_only() -> Self {
        Self { filter_missing: true, ..Self::default() }
    }

    pub(crate) fn compile(&self) -> Result<Option<Regex>, ModelError> {
        if !self.regex {
            return Ok(None);
        }
        RegexBuilder::new(&self.pattern)
            .case_insensitive(true)
            .build()
            .map(Some)
            .map_err(|e| ModelError::InvalidFilter(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct StringColumn {
    pub(crate) attribute: String,
    pub(crate) filter: Option<StringFilter>,
    pub(crate) compiled: Option<Regex>,
}

impl StringColumn {
    pub fn from_desc(desc: &ColumnDesc) -> Self {
        Self { attribute: desc.column.clone(), filter: None, compiled: None }
    }

    pub fn text(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> Option<String> {
        value::as_text(row.get(&self.attribute), ctx.nulls)
    }

    pub(crate) fn set_filter(&mut self, filter: Option<StringFilter>) -> Result<(), ModelError> {
        let compiled = match &filter {
            Some(f) => f.compile()?,
            None => None,
        };
        self.filter = filter;
        self.compiled = compiled;
        Ok(())
    }

    pub fn accepts(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> bool {
        let Some(filter) = &self.filter else {
            return true;
        };
        let Some(text) = self.text(row, ctx) else {
            return !filter.filter_missing;
        };
        if filter.pattern.is_empty() {
            return true;
        }
        match &self.compiled {
            Some(re) => re.is_match(&text),
            None => text.to_lowercase().contains(&filter.pattern.to_lowercase()),
        }
    }

    pub fn compare(&self, a: DataRow<'_>, b: DataRow<'_>, ctx: &EvalContext<'_>) -> Ordering {
        match (self.text(a, ctx), self.text(b, ctx)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.to_lowercase().cmp(&y.to_lowercase()).then_with(|| x.cmp(&y)),
        }
    }

    pub(crate) fn group(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> Group {
        match self.text(row, ctx) {
            Some(text) => Group::new(text, "#7f7f7f"),
            None => Group::missing(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BooleanColumn {
    pub(crate) attribute: String,
    pub(crate) filter: Option<bool>,
}

impl BooleanColumn {
    pub fn from_desc(desc: &ColumnDesc) -> Self {
        Self { attribute: desc.column.clone(), filter: None }
    }

    pub fn flag(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> Option<bool> {
        value::as_bool(row.get(&self.attribute), ctx.nulls)
    }

    pub fn accepts(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> bool {
        match self.filter {
            None => true,
            Some(wanted) => self.flag(row, ctx) == Some(wanted),
        }
    }

    pub(crate) fn group(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> Group {
        match self.flag(row, ctx) {
            Some(true) => Group::new("true", "#2ca02c"),
            Some(false) => Group::new("false", "#d62728"),
            None => Group::missing(),
        }
    }
}

/// Calendar unit used to group dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateGranularity {
    #[default]
    Year,
    Month,
    Day,
}

impl DateGranularity {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "year" => DateGranularity::Year,
            "month" => DateGranularity::Month,
            "day" => DateGranularity::Day,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DateGranularity::Year => "year",
            DateGranularity::Month => "month",
            DateGranularity::Day => "day",
        }
    }

    pub fn label(&self, date: &DateTime<Utc>) -> String {
        match self {
            DateGranularity::Year => format!("{}", date.year()),
            DateGranularity::Month => format!("{}-{:02}", date.year(), date.month()),
            DateGranularity::Day => format!("{}-{:02}-{:02}", date.year(), date.month(), date.day()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DateColumn {
    pub(crate) attribute: String,
    pub(crate) format: Option<String>,
    /// Bounds in epoch milliseconds
    pub(crate) filter: NumberFilter,
    pub(crate) granularity: DateGranularity,
}

impl DateColumn {
    pub fn from_desc(desc: &ColumnDesc) -> Self {
        Self {
            attribute: desc.column.clone(),
            format: desc.date_format.clone(),
            filter: NumberFilter::default(),
            granularity: desc
                .date_grouper
                .as_deref()
                .and_then(DateGranularity::parse)
                .unwrap_or_default(),
        }
    }

    pub fn date(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> Option<DateTime<Utc>> {
        value::as_date(row.get(&self.attribute), self.format.as_deref(), ctx.nulls)
    }

    /// Epoch milliseconds, NaN when missing
    pub fn millis(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> f64 {
        self.date(row, ctx).map_or(f64::NAN, |d| d.timestamp_millis() as f64)
    }

    pub fn label(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> String {
        // an invalid format string would make chrono's Display fail
        let format = self
            .format
            .as_deref()
            .filter(|f| StrftimeItems::new(f).all(|item| !matches!(item, Item::Error)))
            .unwrap_or("%Y-%m-%d");
        match self.date(row, ctx) {
            Some(date) => date.format(format).to_string(),
            None => String::new(),
        }
    }

    pub(crate) fn group(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> Group {
        match self.date(row, ctx) {
            Some(date) => Group::new(self.granularity.label(&date), "#7f7f7f"),
            None => Group::missing(),
        }
    }
}
