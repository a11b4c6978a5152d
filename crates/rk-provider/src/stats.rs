//! Column statistics and their cache
//!
//! Statistics are derived from the rows of a ranking and never persisted.
//! The cache subscribes to the event bus and drops entries as soon as the
//! values or the order they were computed from change.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use rk_core::{ColumnEvent, ColumnEventKind, ColumnId, EventBus, RankingEvent, RankingEventKind, RankingId, SubscriptionId};
use rk_data::stats::{compute_box_plot, compute_categorical_histogram, compute_histogram};
use rk_data::value::DataRow;
use rk_data::{BoxPlot, CategoricalHistogram, Histogram};
use rk_model::{Column, ColumnKind, EvalContext};
use serde_json::Value;

/// Default upper bound of cached entries
pub const DEFAULT_MAX_ENTRIES: usize = 256;

/// Descriptive statistics of one column over a set of rows
#[derive(Debug, Clone)]
pub enum ColumnStats {
    /// Box plot over mapped values, histogram over raw values
    Numeric { box_plot: BoxPlot, histogram: Histogram },
    Categorical(CategoricalHistogram),
    /// Histogram over epoch milliseconds
    Date(Histogram),
}

impl ColumnStats {
    /// Compute the statistics of `column` over the given row indices
    ///
    /// Returns `None` for columns without a statistical summary (strings,
    /// rank, selection, nested).
    pub fn compute(column: &Column, rows: &[Value], indices: &[usize], ctx: &EvalContext<'_>) -> Option<Self> {
        let data = || {
            indices
                .iter()
                .filter_map(|&i| rows.get(i).map(|row| DataRow::new(i, row)))
        };

        match column.kind() {
            ColumnKind::Number(_) | ColumnKind::BoxPlot(_) | ColumnKind::Numbers(_) | ColumnKind::Booleans(_) => {
                let raw: Vec<f64> = data().map(|row| column.raw_number(row, ctx)).collect();
                let mapping = column.mapping();
                Some(ColumnStats::Numeric {
                    box_plot: compute_box_plot(raw.iter().copied(), mapping),
                    histogram: compute_histogram(raw, mapping.map(|m| m.domain()), None),
                })
            }
            ColumnKind::Categorical(c) => {
                let names: Vec<String> = c.categories().iter().map(|cat| cat.name.clone()).collect();
                let values = data().map(|row| c.category(row, ctx).map(|(_, cat)| cat.name.clone()));
                Some(ColumnStats::Categorical(compute_categorical_histogram(values, &names)))
            }
            ColumnKind::Categoricals(c) => {
                let names: Vec<String> = c.categories().iter().map(|cat| cat.name.clone()).collect();
                let values: Vec<Option<String>> = data().flat_map(|row| c.names(row, ctx)).collect();
                Some(ColumnStats::Categorical(compute_categorical_histogram(values, &names)))
            }
            ColumnKind::Boolean(c) => {
                let names = vec!["true".to_string(), "false".to_string()];
                let values = data().map(|row| c.flag(row, ctx).map(|b| b.to_string()));
                Some(ColumnStats::Categorical(compute_categorical_histogram(values, &names)))
            }
            ColumnKind::Date(c) => {
                let millis: Vec<f64> = data().map(|row| c.millis(row, ctx)).collect();
                Some(ColumnStats::Date(compute_histogram(millis, None, None)))
            }
            ColumnKind::Stack(_) | ColumnKind::Impose(_) | ColumnKind::Reduce(_) | ColumnKind::Script(_) => {
                let normalized: Vec<f64> = data().map(|row| column.number(row, ctx)).collect();
                Some(ColumnStats::Numeric {
                    box_plot: compute_box_plot(normalized.iter().copied(), None),
                    histogram: compute_histogram(normalized, Some([0.0, 1.0]), None),
                })
            }
            _ => None,
        }
    }

    pub fn box_plot(&self) -> Option<&BoxPlot> {
        match self {
            ColumnStats::Numeric { box_plot, .. } => Some(box_plot),
            _ => None,
        }
    }

    pub fn histogram(&self) -> Option<&Histogram> {
        match self {
            ColumnStats::Numeric { histogram, .. } | ColumnStats::Date(histogram) => Some(histogram),
            ColumnStats::Categorical(_) => None,
        }
    }

    pub fn categorical(&self) -> Option<&CategoricalHistogram> {
        match self {
            ColumnStats::Categorical(histogram) => Some(histogram),
            _ => None,
        }
    }
}

type StatsKey = (RankingId, ColumnId);

/// Statistics per (ranking, column)
///
/// Clones share the same storage, so event handlers hold a clone of the
/// cache they invalidate.
#[derive(Debug, Clone)]
pub struct StatsCache {
    entries: Arc<RwLock<AHashMap<StatsKey, Arc<ColumnStats>>>>,
    max_entries: usize,
}

impl Default for StatsCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl StatsCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(AHashMap::new())),
            max_entries: max_entries.max(1),
        }
    }

    pub fn get(&self, ranking: &RankingId, column: &ColumnId) -> Option<Arc<ColumnStats>> {
        self.entries.read().get(&(ranking.clone(), column.clone())).cloned()
    }

    pub fn put(&self, ranking: RankingId, column: ColumnId, stats: Arc<ColumnStats>) {
        let mut entries = self.entries.write();
        let key = (ranking, column);

        // Evict an arbitrary entry when at capacity
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            if let Some(evict) = entries.keys().next().cloned() {
                entries.remove(&evict);
            }
        }

        entries.insert(key, stats);
    }

    pub fn invalidate_column(&self, ranking: &RankingId, column: &ColumnId) {
        self.entries.write().remove(&(ranking.clone(), column.clone()));
    }

    pub fn invalidate_ranking(&self, ranking: &RankingId) {
        self.entries.write().retain(|(r, _), _| r != ranking);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Subscribe invalidation handlers on `bus`
    pub fn attach(&self, bus: &EventBus) -> [SubscriptionId; 2] {
        let cache = self.clone();
        let columns = bus.subscribe_fn(move |event: &ColumnEvent| {
            if matches!(event.kind, ColumnEventKind::DirtyValues | ColumnEventKind::Mapping) {
                cache.invalidate_column(&event.ranking, &event.column);
            }
        });
        let cache = self.clone();
        let rankings = bus.subscribe_fn(move |event: &RankingEvent| match &event.kind {
            RankingEventKind::OrderChanged { .. } => cache.invalidate_ranking(&event.ranking),
            RankingEventKind::ColumnRemoved(column) => cache.invalidate_column(&event.ranking, column),
            _ => {}
        });
        [columns, rankings]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rk_core::SelectionState;
    use rk_data::schema::ColumnDesc;
    use rk_data::NullConfig;
    use rk_model::ColumnFactory;
    use serde_json::json;

    fn column(desc: ColumnDesc) -> Column {
        ColumnFactory::default()
            .create(ColumnId::from("col1"), Arc::new(desc))
            .unwrap()
    }

    #[test]
    fn test_numeric_stats_use_mapped_box_plot_and_raw_histogram() {
        let rows: Vec<Value> = [10.0, 22.0, 44.0, 66.0, 88.0].iter().map(|v| json!({ "a": v })).collect();
        let column = column(ColumnDesc::new("number", "a").with_domain(0.0, 100.0));
        let nulls = NullConfig::default();
        let selection = SelectionState::default();
        let ctx = EvalContext::new(&nulls, &selection);

        let stats = ColumnStats::compute(&column, &rows, &[0, 1, 2, 3, 4], &ctx).unwrap();
        let box_plot = stats.box_plot().unwrap();
        assert!((box_plot.median() - 0.44).abs() < 1e-12);
        let histogram = stats.histogram().unwrap();
        assert_eq!(histogram.domain, [0.0, 100.0]);
        assert_eq!(histogram.count, 5);
    }

    #[test]
    fn test_categorical_stats_keep_declared_order() {
        let rows = vec![json!({"c": "b"}), json!({"c": "b"}), json!({"c": "z"}), json!({})];
        let column = column(ColumnDesc::new("categorical", "c").with_categories(["a", "b"]));
        let nulls = NullConfig::default();
        let selection = SelectionState::default();
        let ctx = EvalContext::new(&nulls, &selection);

        let stats = ColumnStats::compute(&column, &rows, &[0, 1, 2, 3], &ctx).unwrap();
        let histogram = stats.categorical().unwrap();
        assert_eq!(histogram.bins[0].count, 0);
        assert_eq!(histogram.bins[1].count, 2);
        assert_eq!(histogram.missing, 2);
    }

    #[test]
    fn test_string_column_has_no_stats() {
        let column = column(ColumnDesc::new("string", "s"));
        let nulls = NullConfig::default();
        let selection = SelectionState::default();
        let ctx = EvalContext::new(&nulls, &selection);
        assert!(ColumnStats::compute(&column, &[], &[], &ctx).is_none());
    }

    #[test]
    fn test_cache_invalidation_through_events() {
        let bus = EventBus::new();
        let cache = StatsCache::new(8);
        cache.attach(&bus);
        let rank = RankingId::from("rank0");
        let empty = Arc::new(ColumnStats::Date(compute_histogram(Vec::new(), None, None)));
        cache.put(rank.clone(), ColumnId::from("col1"), empty.clone());
        cache.put(rank.clone(), ColumnId::from("col2"), empty);

        bus.publish(ColumnEvent {
            ranking: rank.clone(),
            column: ColumnId::from("col1"),
            kind: ColumnEventKind::Width,
        });
        assert_eq!(cache.len(), 2);

        bus.publish(ColumnEvent {
            ranking: rank.clone(),
            column: ColumnId::from("col1"),
            kind: ColumnEventKind::DirtyValues,
        });
        assert!(cache.get(&rank, &ColumnId::from("col1")).is_none());
        assert!(cache.get(&rank, &ColumnId::from("col2")).is_some());

        bus.publish(RankingEvent {
            ranking: rank,
            kind: RankingEventKind::OrderChanged { generation: 1, rows: 0 },
        });
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_evicts_at_capacity() {
        let cache = StatsCache::new(1);
        let empty = Arc::new(ColumnStats::Date(compute_histogram(Vec::new(), None, None)));
        cache.put(RankingId::from("rank0"), ColumnId::from("col1"), empty.clone());
        cache.put(RankingId::from("rank0"), ColumnId::from("col2"), empty);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&RankingId::from("rank0"), &ColumnId::from("col2")).is_some());
    }
}
