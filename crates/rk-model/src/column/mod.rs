//! Columns of a ranking
//!
//! A [`Column`] carries the state every column shares (id, label, width,
//! flags) and a [`ColumnKind`] holding the variant specific state.
//! Evaluation (`value`, `compare`, `filter`, `group`, ...) is a pure
//! function of a row plus an [`EvalContext`]. Setters validate first and
//! return the event kinds they fired; an unchanged value fires nothing.

pub mod categorical;
pub mod composite;
pub mod number;
pub mod special;
pub mod value;

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rk_core::{AggregationState, ColumnEventKind, ColumnId, RankingId, SelectionState};
use rk_data::schema::ColumnDesc;
use rk_data::stats::SortMethod;
use rk_data::value::DataRow;
use rk_data::{MappingFunction, NullConfig};
use serde_json::Value;
use smallvec::{smallvec, SmallVec};

pub use categorical::{CategoricalColumn, CategoricalFilter, CategoricalsColumn, Category, PALETTE};
pub use composite::{ImposeColumn, NestedColumn, ReduceColumn, ReduceOp, ScriptColumn, StackColumn};
pub use number::{
    compare_numbers, format_number, BooleansColumn, BoxPlotColumn, NumberColumn, NumberFilter, NumbersColumn, RowSummary,
};
pub use special::SelectionColumn;
pub use value::{BooleanColumn, DateColumn, DateGranularity, StringColumn, StringFilter};

use crate::dump::ColumnDump;
use crate::ranking::{Group, RankIndex};
use crate::ModelError;

/// Width of a column whose descriptor does not set one
pub const DEFAULT_WIDTH: f64 = 100.0;

/// Event kinds fired by one setter call, in firing order
pub type Fired = SmallVec<[ColumnEventKind; 4]>;

/// Provider state a column may read while evaluating a row
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub nulls: &'a NullConfig,
    pub selection: &'a SelectionState,
    pub ranks: Option<&'a RankIndex>,
    pub aggregation: Option<(&'a RankingId, &'a AggregationState)>,
}

impl<'a> EvalContext<'a> {
    pub fn new(nulls: &'a NullConfig, selection: &'a SelectionState) -> Self {
        Self {
            nulls,
            selection,
            ranks: None,
            aggregation: None,
        }
    }

    pub fn with_ranks(mut self, ranks: &'a RankIndex) -> Self {
        self.ranks = Some(ranks);
        self
    }

    pub fn with_aggregation(mut self, ranking: &'a RankingId, state: &'a AggregationState) -> Self {
        self.aggregation = Some((ranking, state));
        self
    }
}

/// Typed value of a cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Missing,
    Text(String),
    Number(f64),
    Bool(bool),
    Category(String),
    Date(DateTime<Utc>),
    Numbers(Vec<f64>),
    Bools(Vec<Option<bool>>),
    Categories(Vec<Option<String>>),
    Summary(RowSummary),
    Composite(Vec<CellValue>),
}

impl CellValue {
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Missing => true,
            CellValue::Number(v) => v.is_nan(),
            _ => false,
        }
    }

    fn number(v: f64) -> Self {
        if v.is_nan() {
            CellValue::Missing
        } else {
            CellValue::Number(v)
        }
    }
}

/// A filter as handed to [`Column::set_filter`]
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnFilter {
    /// Range on raw values (epoch ms for dates, sort statistic for arrays)
    Number(NumberFilter),
    String(StringFilter),
    Categorical(CategoricalFilter),
    /// Boolean value, or "at least one true" for boolean arrays
    Boolean(bool),
    /// Selected rows only (`true`) or unselected rows only (`false`)
    Selection(bool),
}

impl ColumnFilter {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ColumnFilter::Number(_) => "number",
            ColumnFilter::String(_) => "string",
            ColumnFilter::Categorical(_) => "categorical",
            ColumnFilter::Boolean(_) => "boolean",
            ColumnFilter::Selection(_) => "selection",
        }
    }
}

/// Variant specific column state
#[derive(Debug, Clone)]
pub enum ColumnKind {
    Rank,
    Selection(SelectionColumn),
    Aggregate,
    String(StringColumn),
    Boolean(BooleanColumn),
    Categorical(CategoricalColumn),
    Date(DateColumn),
    Number(NumberColumn),
    BoxPlot(BoxPlotColumn),
    Numbers(NumbersColumn),
    Booleans(BooleansColumn),
    Categoricals(CategoricalsColumn),
    Stack(StackColumn),
    Nested(NestedColumn),
    Impose(ImposeColumn),
    Reduce(ReduceColumn),
    Script(ScriptColumn),
}

impl ColumnKind {
    /// Type tag, matching the descriptor `type` the factory registers
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnKind::Rank => "rank",
            ColumnKind::Selection(_) => "selection",
            ColumnKind::Aggregate => "aggregate",
            ColumnKind::String(_) => "string",
            ColumnKind::Boolean(_) => "boolean",
            ColumnKind::Categorical(c) if c.is_ordinal() => "ordinal",
            ColumnKind::Categorical(_) => "categorical",
            ColumnKind::Date(_) => "date",
            ColumnKind::Number(_) => "number",
            ColumnKind::BoxPlot(_) => "boxplot",
            ColumnKind::Numbers(_) => "numbers",
            ColumnKind::Booleans(_) => "booleans",
            ColumnKind::Categoricals(_) => "categoricals",
            ColumnKind::Stack(_) => "stack",
            ColumnKind::Nested(_) => "nested",
            ColumnKind::Impose(_) => "impose",
            ColumnKind::Reduce(_) => "reduce",
            ColumnKind::Script(_) => "script",
        }
    }

    /// Whether the column yields a normalized number usable by composites
    pub fn is_numeric(&self) -> bool {
        match self {
            ColumnKind::Number(_)
            | ColumnKind::BoxPlot(_)
            | ColumnKind::Numbers(_)
            | ColumnKind::Booleans(_)
            | ColumnKind::Stack(_)
            | ColumnKind::Impose(_)
            | ColumnKind::Reduce(_)
            | ColumnKind::Script(_) => true,
            ColumnKind::Categorical(c) => c.is_ordinal(),
            _ => false,
        }
    }

    pub fn is_sortable(&self) -> bool {
        !matches!(self, ColumnKind::Rank | ColumnKind::Aggregate)
    }

    pub fn is_groupable(&self) -> bool {
        match self {
            ColumnKind::String(_)
            | ColumnKind::Boolean(_)
            | ColumnKind::Categorical(_)
            | ColumnKind::Date(_)
            | ColumnKind::Number(_)
            | ColumnKind::Selection(_) => true,
            ColumnKind::Impose(c) => c.color_source().map_or(false, Column::is_groupable),
            _ => false,
        }
    }

    pub fn is_composite(&self) -> bool {
        self.children().is_some()
    }

    pub fn children(&self) -> Option<&[Column]> {
        match self {
            ColumnKind::Stack(c) => Some(&c.children),
            ColumnKind::Nested(c) => Some(&c.children),
            ColumnKind::Impose(c) => Some(&c.children),
            ColumnKind::Reduce(c) => Some(&c.children),
            ColumnKind::Script(c) => Some(&c.children),
            _ => None,
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<Column>> {
        match self {
            ColumnKind::Stack(c) => Some(&mut c.children),
            ColumnKind::Nested(c) => Some(&mut c.children),
            ColumnKind::Impose(c) => Some(&mut c.children),
            ColumnKind::Reduce(c) => Some(&mut c.children),
            ColumnKind::Script(c) => Some(&mut c.children),
            _ => None,
        }
    }

    fn mapping(&self) -> Option<&MappingFunction> {
        match self {
            ColumnKind::Number(c) => Some(&c.mapping),
            ColumnKind::BoxPlot(c) => Some(&c.mapping),
            ColumnKind::Numbers(c) => Some(&c.mapping),
            _ => None,
        }
    }

    fn mapping_mut(&mut self) -> Option<&mut MappingFunction> {
        match self {
            ColumnKind::Number(c) => Some(&mut c.mapping),
            ColumnKind::BoxPlot(c) => Some(&mut c.mapping),
            ColumnKind::Numbers(c) => Some(&mut c.mapping),
            _ => None,
        }
    }

    fn sort_method_mut(&mut self) -> Option<&mut SortMethod> {
        match self {
            ColumnKind::BoxPlot(c) => Some(&mut c.sort_method),
            ColumnKind::Numbers(c) => Some(&mut c.sort_method),
            _ => None,
        }
    }
}

/// One column of a ranking
#[derive(Debug, Clone)]
pub struct Column {
    id: ColumnId,
    desc: Arc<ColumnDesc>,
    label: String,
    width: f64,
    hidden: bool,
    compressed: bool,
    renderer: String,
    color: Option<String>,
    parent: Option<ColumnId>,
    kind: ColumnKind,
}

impl Column {
    pub fn new(id: ColumnId, desc: Arc<ColumnDesc>, kind: ColumnKind) -> Self {
        Self {
            label: desc.display_label(),
            width: desc.width.unwrap_or(DEFAULT_WIDTH),
            renderer: desc.renderer.clone().unwrap_or_else(|| kind.type_name().to_string()),
            color: desc.color.clone(),
            hidden: false,
            compressed: false,
            parent: None,
            id,
            desc,
            kind,
        }
    }

    pub fn id(&self) -> &ColumnId {
        &self.id
    }

    pub fn desc(&self) -> &Arc<ColumnDesc> {
        &self.desc
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn kind(&self) -> &ColumnKind {
        &self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn renderer(&self) -> &str {
        &self.renderer
    }

    pub fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }

    /// Id of the composite owning this column, if any
    pub fn parent(&self) -> Option<&ColumnId> {
        self.parent.as_ref()
    }

    pub fn is_numeric(&self) -> bool {
        self.kind.is_numeric()
    }

    pub fn is_sortable(&self) -> bool {
        self.kind.is_sortable()
    }

    pub fn is_groupable(&self) -> bool {
        self.kind.is_groupable()
    }

    pub fn mapping(&self) -> Option<&MappingFunction> {
        self.kind.mapping()
    }

    pub fn children(&self) -> &[Column] {
        self.kind.children().unwrap_or_default()
    }

    /// This column followed by all its descendants, depth first
    pub fn flatten(&self) -> Vec<&Column> {
        let mut out = vec![self];
        for child in self.children() {
            out.extend(child.flatten());
        }
        out
    }

    pub fn find(&self, id: &ColumnId) -> Option<&Column> {
        if &self.id == id {
            return Some(self);
        }
        self.children().iter().find_map(|c| c.find(id))
    }

    pub fn find_mut(&mut self, id: &ColumnId) -> Option<&mut Column> {
        if &self.id == id {
            return Some(self);
        }
        self.kind.children_mut()?.iter_mut().find_map(|c| c.find_mut(id))
    }

    /// Copy of this subtree with new ids; `remap` collects old to new ids
    pub fn with_fresh_ids(
        &self,
        next_id: &mut dyn FnMut() -> ColumnId,
        remap: &mut Vec<(ColumnId, ColumnId)>,
    ) -> Column {
        let mut copy = self.clone();
        copy.id = next_id();
        remap.push((self.id.clone(), copy.id.clone()));
        let parent = copy.id.clone();
        if let Some(children) = copy.kind.children_mut() {
            for child in children.iter_mut() {
                let mut fresh = child.with_fresh_ids(next_id, remap);
                fresh.parent = Some(parent.clone());
                *child = fresh;
            }
        }
        copy
    }

    // Evaluation

    pub fn value(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> CellValue {
        match &self.kind {
            ColumnKind::Rank => special::rank_of(row, ctx).map_or(CellValue::Missing, |r| CellValue::Number(r as f64)),
            ColumnKind::Selection(c) => CellValue::Bool(c.is_selected(row, ctx)),
            ColumnKind::Aggregate => self.collapsed(row, ctx).map_or(CellValue::Missing, CellValue::Bool),
            ColumnKind::String(c) => c.text(row, ctx).map_or(CellValue::Missing, CellValue::Text),
            ColumnKind::Boolean(c) => c.flag(row, ctx).map_or(CellValue::Missing, CellValue::Bool),
            ColumnKind::Categorical(c) => c
                .category(row, ctx)
                .map_or(CellValue::Missing, |(_, cat)| CellValue::Category(cat.name.clone())),
            ColumnKind::Date(c) => c.date(row, ctx).map_or(CellValue::Missing, CellValue::Date),
            ColumnKind::Number(c) => CellValue::number(c.raw(row, ctx)),
            ColumnKind::BoxPlot(c) => c.summary(row, ctx).map_or(CellValue::Missing, CellValue::Summary),
            ColumnKind::Numbers(c) => CellValue::Numbers(c.values(row, ctx)),
            ColumnKind::Booleans(c) => CellValue::Bools(c.values(row, ctx)),
            ColumnKind::Categoricals(c) => CellValue::Categories(c.names(row, ctx)),
            ColumnKind::Nested(c) => CellValue::Composite(c.children.iter().map(|c| c.value(row, ctx)).collect()),
            ColumnKind::Stack(_) | ColumnKind::Impose(_) | ColumnKind::Reduce(_) | ColumnKind::Script(_) => {
                CellValue::number(self.number(row, ctx))
            }
        }
    }

    /// Normalized value in [0, 1], NaN when missing or not numeric
    pub fn number(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> f64 {
        match &self.kind {
            ColumnKind::Number(c) => c.normalized(row, ctx),
            ColumnKind::BoxPlot(c) => c.normalized(row, ctx),
            ColumnKind::Numbers(c) => c.normalized(row, ctx),
            ColumnKind::Booleans(c) => c.normalized(row, ctx),
            ColumnKind::Categorical(c) if c.is_ordinal() => c.number(row, ctx),
            ColumnKind::Stack(c) => c.number(row, ctx),
            ColumnKind::Impose(c) => c.numeric().map_or(f64::NAN, |n| n.number(row, ctx)),
            ColumnKind::Reduce(c) => c.number(row, ctx),
            ColumnKind::Script(c) => c.number(row, ctx),
            _ => f64::NAN,
        }
    }

    /// Value before normalization
    pub fn raw_number(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> f64 {
        match &self.kind {
            ColumnKind::Number(c) => c.raw(row, ctx),
            ColumnKind::BoxPlot(c) => c.raw(row, ctx),
            ColumnKind::Numbers(c) => c.raw(row, ctx),
            ColumnKind::Booleans(c) => c.raw(row, ctx),
            ColumnKind::Date(c) => c.millis(row, ctx),
            ColumnKind::Impose(c) => c.numeric().map_or(f64::NAN, |n| n.raw_number(row, ctx)),
            _ => self.number(row, ctx),
        }
    }

    pub fn label_for(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> String {
        match &self.kind {
            ColumnKind::Rank => special::rank_of(row, ctx).map_or_else(String::new, |r| r.to_string()),
            ColumnKind::Selection(c) if c.is_selected(row, ctx) => "✓".to_string(),
            ColumnKind::Selection(_) => String::new(),
            ColumnKind::Aggregate => match self.collapsed(row, ctx) {
                Some(true) => "collapsed".to_string(),
                Some(false) => "expanded".to_string(),
                None => String::new(),
            },
            ColumnKind::String(c) => c.text(row, ctx).unwrap_or_default(),
            ColumnKind::Boolean(c) => c.flag(row, ctx).map_or_else(String::new, |b| b.to_string()),
            ColumnKind::Categorical(c) => c.category(row, ctx).map_or_else(String::new, |(_, cat)| cat.label.clone()),
            ColumnKind::Date(c) => c.label(row, ctx),
            ColumnKind::Number(c) => format_number(c.raw(row, ctx)),
            ColumnKind::BoxPlot(c) => c.label(row, ctx),
            ColumnKind::Numbers(c) => c.label(row, ctx),
            ColumnKind::Booleans(c) => c.label(row, ctx),
            ColumnKind::Categoricals(c) => c.label(row, ctx),
            ColumnKind::Nested(c) => c.children.iter().map(|c| c.label_for(row, ctx)).collect::<Vec<_>>().join(" / "),
            ColumnKind::Impose(c) => c.numeric().map_or_else(String::new, |n| n.label_for(row, ctx)),
            ColumnKind::Stack(_) | ColumnKind::Reduce(_) | ColumnKind::Script(_) => format_number(self.number(row, ctx)),
        }
    }

    /// Color of a cell; falls back to the column color
    pub fn color_for(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> Option<String> {
        match &self.kind {
            ColumnKind::Categorical(c) => c.category(row, ctx).map(|(_, cat)| cat.color.clone()),
            ColumnKind::Impose(c) => c
                .color_source()
                .and_then(|source| source.color_for(row, ctx))
                .or_else(|| self.color.clone()),
            _ => self.color.clone(),
        }
    }

    /// Total order of two rows; missing values sort first
    pub fn compare(&self, a: DataRow<'_>, b: DataRow<'_>, ctx: &EvalContext<'_>) -> Ordering {
        match &self.kind {
            ColumnKind::Rank | ColumnKind::Aggregate => Ordering::Equal,
            ColumnKind::Selection(c) => c.compare(a, b, ctx),
            ColumnKind::String(c) => c.compare(a, b, ctx),
            ColumnKind::Boolean(c) => c.flag(a, ctx).cmp(&c.flag(b, ctx)),
            ColumnKind::Categorical(c) => c.compare(a, b, ctx),
            ColumnKind::Categoricals(c) => c.compare(a, b, ctx),
            ColumnKind::Date(c) => compare_numbers(c.millis(a, ctx), c.millis(b, ctx)),
            ColumnKind::Nested(c) => c.compare(a, b, ctx),
            _ => compare_numbers(self.number(a, ctx), self.number(b, ctx)),
        }
    }

    /// Whether a row passes this column's filter; composites require every
    /// child to pass
    pub fn filter(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> bool {
        match &self.kind {
            ColumnKind::Selection(c) => c.accepts(row, ctx),
            ColumnKind::String(c) => c.accepts(row, ctx),
            ColumnKind::Boolean(c) => c.accepts(row, ctx),
            ColumnKind::Categorical(c) => c.accepts(row, ctx),
            ColumnKind::Categoricals(c) => c.accepts(row, ctx),
            ColumnKind::Booleans(c) => c.accepts(row, ctx),
            ColumnKind::Date(c) => c.filter.accepts(c.millis(row, ctx)),
            ColumnKind::Number(c) => c.filter.accepts(c.raw(row, ctx)),
            ColumnKind::BoxPlot(c) => c.filter.accepts(c.raw(row, ctx)),
            ColumnKind::Numbers(c) => c.filter.accepts(c.raw(row, ctx)),
            ColumnKind::Rank | ColumnKind::Aggregate => true,
            _ => self.children().iter().all(|c| c.filter(row, ctx)),
        }
    }

    /// Whether this column or one of its descendants has an active filter
    pub fn is_filtered(&self) -> bool {
        self.filter_state().is_some() || self.children().iter().any(Column::is_filtered)
    }

    /// Group of a row; `None` when the column cannot group
    pub fn group(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> Option<Group> {
        Some(match &self.kind {
            ColumnKind::Selection(c) => c.group(row, ctx),
            ColumnKind::String(c) => c.group(row, ctx),
            ColumnKind::Boolean(c) => c.group(row, ctx),
            ColumnKind::Categorical(c) => c.group(row, ctx),
            ColumnKind::Date(c) => c.group(row, ctx),
            ColumnKind::Number(c) => c.group(row, ctx),
            ColumnKind::Impose(c) => return c.color_source()?.group(row, ctx),
            _ => return None,
        })
    }

    fn collapsed(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> Option<bool> {
        let (ranking, state) = ctx.aggregation?;
        let group = ctx.ranks?.group_name(row.index)?;
        Some(state.is_collapsed(ranking, group))
    }

    // Setters

    pub fn set_width(&mut self, width: f64) -> Result<Fired, ModelError> {
        if !width.is_finite() || width < 0.0 {
            return Err(ModelError::InvalidWidth(width));
        }
        if width == self.width {
            return Ok(Fired::new());
        }
        self.width = width;
        Ok(smallvec![ColumnEventKind::Width, ColumnEventKind::DirtyHeader])
    }

    pub fn set_label(&mut self, label: impl Into<String>) -> Fired {
        let label = label.into();
        if label == self.label {
            return Fired::new();
        }
        self.label = label;
        smallvec![ColumnEventKind::Label, ColumnEventKind::DirtyHeader]
    }

    pub fn set_hidden(&mut self, hidden: bool) -> Fired {
        if hidden == self.hidden {
            return Fired::new();
        }
        self.hidden = hidden;
        smallvec![ColumnEventKind::Visibility, ColumnEventKind::DirtyHeader]
    }

    pub fn set_compressed(&mut self, compressed: bool) -> Fired {
        if compressed == self.compressed {
            return Fired::new();
        }
        self.compressed = compressed;
        smallvec![ColumnEventKind::Compressed, ColumnEventKind::DirtyHeader]
    }

    pub fn set_renderer(&mut self, renderer: impl Into<String>) -> Fired {
        let renderer = renderer.into();
        if renderer == self.renderer {
            return Fired::new();
        }
        self.renderer = renderer;
        smallvec![ColumnEventKind::Renderer, ColumnEventKind::DirtyHeader]
    }

    pub fn set_color(&mut self, color: Option<String>) -> Fired {
        if color == self.color {
            return Fired::new();
        }
        self.color = color;
        smallvec![ColumnEventKind::ColorMapping, ColumnEventKind::DirtyHeader]
    }

    /// Current active filter, if any
    pub fn filter_state(&self) -> Option<ColumnFilter> {
        match &self.kind {
            ColumnKind::Selection(c) => c.filter.map(ColumnFilter::Selection),
            ColumnKind::String(c) => c.filter.clone().map(ColumnFilter::String),
            ColumnKind::Boolean(c) => c.filter.map(ColumnFilter::Boolean),
            ColumnKind::Booleans(c) => c.filter.map(ColumnFilter::Boolean),
            ColumnKind::Categorical(c) => c.filter.clone().map(ColumnFilter::Categorical),
            ColumnKind::Categoricals(c) => c.filter.clone().map(ColumnFilter::Categorical),
            ColumnKind::Date(c) => Some(c.filter).filter(NumberFilter::is_active).map(ColumnFilter::Number),
            ColumnKind::Number(c) => Some(c.filter).filter(NumberFilter::is_active).map(ColumnFilter::Number),
            ColumnKind::BoxPlot(c) => Some(c.filter).filter(NumberFilter::is_active).map(ColumnFilter::Number),
            ColumnKind::Numbers(c) => Some(c.filter).filter(NumberFilter::is_active).map(ColumnFilter::Number),
            _ => None,
        }
    }

    /// Set the filter; a filter of the wrong kind or with invalid bounds is
    /// rejected without touching the current one
    pub fn set_filter(&mut self, filter: ColumnFilter) -> Result<Fired, ModelError> {
        let before = self.filter_state();
        if before.as_ref() == Some(&filter) {
            return Ok(Fired::new());
        }
        let given = filter.kind_name();
        match (&mut self.kind, filter) {
            (ColumnKind::Selection(c), ColumnFilter::Selection(f)) => c.filter = Some(f),
            (ColumnKind::String(c), ColumnFilter::String(f)) => c.set_filter(Some(f))?,
            (ColumnKind::Boolean(c), ColumnFilter::Boolean(f)) => c.filter = Some(f),
            (ColumnKind::Booleans(c), ColumnFilter::Boolean(f)) => c.filter = Some(f),
            (ColumnKind::Categorical(c), ColumnFilter::Categorical(f)) => c.filter = Some(f),
            (ColumnKind::Categoricals(c), ColumnFilter::Categorical(f)) => c.filter = Some(f),
            (ColumnKind::Date(c), ColumnFilter::Number(f)) => {
                f.validate()?;
                c.filter = f;
            }
            (ColumnKind::Number(c), ColumnFilter::Number(f)) => {
                f.validate()?;
                c.filter = f;
            }
            (ColumnKind::BoxPlot(c), ColumnFilter::Number(f)) => {
                f.validate()?;
                c.filter = f;
            }
            (ColumnKind::Numbers(c), ColumnFilter::Number(f)) => {
                f.validate()?;
                c.filter = f;
            }
            _ => {
                return Err(ModelError::FilterMismatch {
                    column: self.id.clone(),
                    given,
                })
            }
        }
        // an inactive range filter leaves the column unfiltered
        if self.filter_state() == before {
            return Ok(Fired::new());
        }
        Ok(smallvec![ColumnEventKind::Filter, ColumnEventKind::DirtyValues])
    }

    pub fn clear_filter(&mut self) -> Fired {
        if self.filter_state().is_none() {
            return Fired::new();
        }
        match &mut self.kind {
            ColumnKind::Selection(c) => c.filter = None,
            ColumnKind::String(c) => {
                c.filter = None;
                c.compiled = None;
            }
            ColumnKind::Boolean(c) => c.filter = None,
            ColumnKind::Booleans(c) => c.filter = None,
            ColumnKind::Categorical(c) => c.filter = None,
            ColumnKind::Categoricals(c) => c.filter = None,
            ColumnKind::Date(c) => c.filter = NumberFilter::default(),
            ColumnKind::Number(c) => c.filter = NumberFilter::default(),
            ColumnKind::BoxPlot(c) => c.filter = NumberFilter::default(),
            ColumnKind::Numbers(c) => c.filter = NumberFilter::default(),
            _ => {}
        }
        smallvec![ColumnEventKind::Filter, ColumnEventKind::DirtyValues]
    }

    pub fn set_mapping(&mut self, mapping: MappingFunction) -> Result<Fired, ModelError> {
        let id = self.id.clone();
        let current = self.kind.mapping_mut().ok_or(ModelError::Unsupported(id, "mapping"))?;
        if *current == mapping {
            return Ok(Fired::new());
        }
        *current = mapping;
        Ok(smallvec![
            ColumnEventKind::Mapping,
            ColumnEventKind::DirtyHeader,
            ColumnEventKind::DirtyValues
        ])
    }

    /// Change the mapping domain only; an invalid domain keeps the old one
    pub fn set_domain(&mut self, min: f64, max: f64) -> Result<Fired, ModelError> {
        let mapping = self
            .kind
            .mapping()
            .ok_or_else(|| ModelError::Unsupported(self.id.clone(), "mapping"))?
            .with_domain(min, max)?;
        self.set_mapping(mapping)
    }

    pub fn set_sort_method(&mut self, method: SortMethod) -> Result<Fired, ModelError> {
        let id = self.id.clone();
        let current = self.kind.sort_method_mut().ok_or(ModelError::Unsupported(id, "sort method"))?;
        if *current == method {
            return Ok(Fired::new());
        }
        *current = method;
        Ok(smallvec![ColumnEventKind::SortMethod, ColumnEventKind::DirtyValues])
    }

    pub fn set_weights(&mut self, weights: &[f64]) -> Result<Fired, ModelError> {
        let ColumnKind::Stack(stack) = &mut self.kind else {
            return Err(ModelError::Unsupported(self.id.clone(), "weights"));
        };
        if !stack.set_weights(weights)? {
            return Ok(Fired::new());
        }
        Ok(smallvec![
            ColumnEventKind::Weights,
            ColumnEventKind::DirtyHeader,
            ColumnEventKind::DirtyValues
        ])
    }

    pub fn set_group_threshold(&mut self, threshold: f64) -> Result<Fired, ModelError> {
        let ColumnKind::Number(number) = &mut self.kind else {
            return Err(ModelError::Unsupported(self.id.clone(), "group threshold"));
        };
        if !threshold.is_finite() {
            return Err(ModelError::InvalidFilter(format!("threshold {}", threshold)));
        }
        if number.threshold == Some(threshold) {
            return Ok(Fired::new());
        }
        number.threshold = Some(threshold);
        Ok(smallvec![ColumnEventKind::Grouping, ColumnEventKind::DirtyValues])
    }

    pub fn set_date_grouper(&mut self, granularity: DateGranularity) -> Result<Fired, ModelError> {
        let ColumnKind::Date(date) = &mut self.kind else {
            return Err(ModelError::Unsupported(self.id.clone(), "date grouper"));
        };
        if date.granularity == granularity {
            return Ok(Fired::new());
        }
        date.granularity = granularity;
        Ok(smallvec![ColumnEventKind::Grouping, ColumnEventKind::DirtyValues])
    }

    pub fn set_reduce(&mut self, op: ReduceOp) -> Result<Fired, ModelError> {
        let ColumnKind::Reduce(reduce) = &mut self.kind else {
            return Err(ModelError::Unsupported(self.id.clone(), "reduce method"));
        };
        if reduce.op == op {
            return Ok(Fired::new());
        }
        reduce.op = op;
        Ok(smallvec![ColumnEventKind::ReduceMethod, ColumnEventKind::DirtyValues])
    }

    pub fn set_script(&mut self, code: &str) -> Result<Fired, ModelError> {
        let ColumnKind::Script(script) = &mut self.kind else {
            return Err(ModelError::Unsupported(self.id.clone(), "script"));
        };
        if !script.set_code(code)? {
            return Ok(Fired::new());
        }
        Ok(smallvec![ColumnEventKind::Script, ColumnEventKind::DirtyValues])
    }

    /// Add a child to a composite
    ///
    /// Stack, reduce and script composites accept numeric children only; an
    /// imposition holds a numeric child followed by its color source.
    pub fn insert_child(&mut self, index: usize, mut child: Column) -> Result<Fired, ModelError> {
        if self.find(child.id()).is_some() {
            return Err(ModelError::DuplicateColumn(child.id.clone()));
        }
        let numeric_only = matches!(
            self.kind,
            ColumnKind::Stack(_) | ColumnKind::Reduce(_) | ColumnKind::Script(_)
        );
        if numeric_only && !child.is_numeric() {
            return Err(ModelError::Unsupported(child.id.clone(), "numeric value"));
        }
        child.parent = Some(self.id.clone());
        match &mut self.kind {
            ColumnKind::Stack(stack) => stack.insert(index, child),
            ColumnKind::Impose(impose) => {
                if impose.children.len() >= 2 {
                    return Err(ModelError::Unsupported(self.id.clone(), "room for another child"));
                }
                if impose.children.is_empty() && !child.is_numeric() {
                    return Err(ModelError::Unsupported(child.id.clone(), "numeric value"));
                }
                let index = index.min(impose.children.len());
                impose.children.insert(index, child);
            }
            kind => {
                let Some(children) = kind.children_mut() else {
                    return Err(ModelError::Unsupported(self.id.clone(), "children"));
                };
                let index = index.min(children.len());
                children.insert(index, child);
            }
        }
        Ok(smallvec![
            ColumnEventKind::Children,
            ColumnEventKind::DirtyHeader,
            ColumnEventKind::DirtyValues
        ])
    }

    pub fn push_child(&mut self, child: Column) -> Result<Fired, ModelError> {
        let end = self.children().len();
        self.insert_child(end, child)
    }

    /// Detach a direct child
    pub fn remove_child(&mut self, id: &ColumnId) -> Result<(Column, Fired), ModelError> {
        let own = self.id.clone();
        let index = self
            .children()
            .iter()
            .position(|c| c.id() == id)
            .ok_or_else(|| ModelError::UnknownColumn(id.clone()))?;
        let mut removed = match &mut self.kind {
            ColumnKind::Stack(stack) => stack.remove(index),
            kind => match kind.children_mut() {
                Some(children) => children.remove(index),
                None => return Err(ModelError::Unsupported(own, "children")),
            },
        };
        removed.parent = None;
        Ok((
            removed,
            smallvec![
                ColumnEventKind::Children,
                ColumnEventKind::DirtyHeader,
                ColumnEventKind::DirtyValues
            ],
        ))
    }

    // Dump / restore

    fn filter_dump(&self) -> Option<Value> {
        let value = match self.filter_state()? {
            ColumnFilter::Number(f) => serde_json::to_value(f),
            ColumnFilter::String(f) => serde_json::to_value(f),
            ColumnFilter::Categorical(f) => serde_json::to_value(f),
            ColumnFilter::Boolean(b) | ColumnFilter::Selection(b) => Ok(Value::Bool(b)),
        };
        value.ok()
    }

    fn filter_from_dump(&self, value: &Value) -> Option<ColumnFilter> {
        match &self.kind {
            ColumnKind::Selection(_) => value.as_bool().map(ColumnFilter::Selection),
            ColumnKind::Boolean(_) | ColumnKind::Booleans(_) => value.as_bool().map(ColumnFilter::Boolean),
            ColumnKind::String(_) => serde_json::from_value(value.clone()).ok().map(ColumnFilter::String),
            ColumnKind::Categorical(_) | ColumnKind::Categoricals(_) => {
                serde_json::from_value(value.clone()).ok().map(ColumnFilter::Categorical)
            }
            ColumnKind::Date(_) | ColumnKind::Number(_) | ColumnKind::BoxPlot(_) | ColumnKind::Numbers(_) => {
                serde_json::from_value(value.clone()).ok().map(ColumnFilter::Number)
            }
            _ => None,
        }
    }

    /// Mutable state of this column and its children
    pub fn dump(&self) -> ColumnDump {
        let mut dump = ColumnDump::new(self.id.clone(), self.desc.desc_ref(), self.width, self.label.clone());
        dump.filter = self.filter_dump();
        dump.map = self.kind.mapping().map(MappingFunction::to_desc);
        dump.color_mapping = self.color.clone();
        dump.compressed = self.compressed;
        dump.hidden = self.hidden;
        dump.renderer = Some(self.renderer.clone());
        dump.children = self.children().iter().map(Column::dump).collect();
        match &self.kind {
            ColumnKind::BoxPlot(c) => dump.sort_method = Some(c.sort_method.as_str().to_string()),
            ColumnKind::Numbers(c) => dump.sort_method = Some(c.sort_method.as_str().to_string()),
            ColumnKind::Number(c) => dump.threshold = c.threshold,
            ColumnKind::Date(c) => dump.date_grouper = Some(c.granularity.as_str().to_string()),
            ColumnKind::Stack(c) => dump.weights = Some(c.weights.clone()),
            ColumnKind::Reduce(c) => dump.reduce = Some(c.op.as_str().to_string()),
            ColumnKind::Script(c) => dump.script = Some(c.code.clone()),
            _ => {}
        }
        dump
    }

    /// Apply dumped state; invalid parts are skipped with a warning
    ///
    /// Children must already be attached, since weights are checked
    /// against them.
    pub fn restore_state(&mut self, dump: &ColumnDump) {
        if let Err(e) = self.set_width(dump.width) {
            tracing::warn!(column = %self.id, "skipping width: {}", e);
        }
        self.set_label(dump.label.clone());
        self.set_hidden(dump.hidden);
        self.set_compressed(dump.compressed);
        if let Some(renderer) = &dump.renderer {
            self.set_renderer(renderer.clone());
        }
        self.set_color(dump.color_mapping.clone());

        let mut results: Vec<Result<Fired, ModelError>> = Vec::new();
        if let Some(map) = &dump.map {
            results.push(MappingFunction::from_desc(map).map_err(ModelError::from).and_then(|m| self.set_mapping(m)));
        }
        if let Some(method) = &dump.sort_method {
            match SortMethod::parse(method) {
                Some(method) => results.push(self.set_sort_method(method)),
                None => tracing::warn!(column = %self.id, "unknown sort method '{}'", method),
            }
        }
        if let Some(threshold) = dump.threshold {
            results.push(self.set_group_threshold(threshold));
        }
        if let Some(grouper) = dump.date_grouper.as_deref().and_then(DateGranularity::parse) {
            results.push(self.set_date_grouper(grouper));
        }
        if let Some(weights) = &dump.weights {
            if !weights.is_empty() {
                results.push(self.set_weights(weights));
            }
        }
        if let Some(op) = dump.reduce.as_deref().and_then(ReduceOp::parse) {
            results.push(self.set_reduce(op));
        }
        if let Some(code) = &dump.script {
            results.push(self.set_script(code));
        }
        match &dump.filter {
            Some(value) => match self.filter_from_dump(value) {
                Some(filter) => results.push(self.set_filter(filter)),
                None => tracing::warn!(column = %self.id, "unreadable filter {}", value),
            },
            None => {
                self.clear_filter();
            }
        }
        for result in results {
            if let Err(e) = result {
                tracing::warn!(column = %self.id, "skipping dumped state: {}", e);
            }
        }
    }
}
