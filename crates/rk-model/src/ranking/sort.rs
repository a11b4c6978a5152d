//! Filter, partition and order the rows of a ranking
//!
//! [`sort_and_group`] is a pure function of a [`SortSnapshot`], so it can
//! run inline, on a blocking pool or behind any other deferred backend.

use std::cmp::Ordering;
use std::sync::Arc;

use rk_core::{RankingId, SelectionState};
use rk_data::value::DataRow;
use rk_data::NullConfig;
use serde_json::Value;

use super::group::{self, Group, OrderedGroup};
use crate::column::{Column, EvalContext};

/// Everything needed to order one ranking, detached from the provider
#[derive(Debug, Clone)]
pub struct SortSnapshot {
    pub ranking: RankingId,
    /// Request generation; only the newest one may be committed
    pub generation: u64,
    pub rows: Arc<Vec<Value>>,
    /// Columns with an active filter
    pub filters: Vec<Column>,
    /// Sort columns with their ascending flag, highest priority first
    pub sort_criteria: Vec<(Column, bool)>,
    pub group_criteria: Vec<Column>,
    pub selection: SelectionState,
    pub nulls: NullConfig,
}

fn compare_rows(criteria: &[(Column, bool)], rows: &[Value], ctx: &EvalContext<'_>, a: usize, b: usize) -> Ordering {
    let (ra, rb) = (DataRow::new(a, &rows[a]), DataRow::new(b, &rows[b]));
    for (column, asc) in criteria {
        let ordering = column.compare(ra, rb, ctx);
        let ordering = if *asc { ordering } else { ordering.reverse() };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    // input order breaks every remaining tie, whatever the direction
    a.cmp(&b)
}

/// Filter rows, partition them by the group criteria and sort every
/// partition
///
/// Without group criteria the result is a single default group. Groups
/// appear in first-seen input order with the missing group last.
pub fn sort_and_group(snapshot: &SortSnapshot) -> Vec<OrderedGroup> {
    let ctx = EvalContext::new(&snapshot.nulls, &snapshot.selection);
    let rows = snapshot.rows.as_slice();

    let visible = (0..rows.len()).filter(|&i| {
        let row = DataRow::new(i, &rows[i]);
        snapshot.filters.iter().all(|c| c.filter(row, &ctx))
    });

    let partitions = if snapshot.group_criteria.is_empty() {
        vec![(Group::default_group(), visible.collect())]
    } else {
        group::partition(visible, |i| {
            let row = DataRow::new(i, &rows[i]);
            Group::join(
                snapshot
                    .group_criteria
                    .iter()
                    .map(|c| c.group(row, &ctx).unwrap_or_else(Group::missing))
                    .collect(),
            )
        })
    };

    partitions
        .into_iter()
        .map(|(group, mut order)| {
            order.sort_by(|&a, &b| compare_rows(&snapshot.sort_criteria, rows, &ctx, a, b));
            OrderedGroup { group, order }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{CategoricalColumn, ColumnKind, NumberColumn};
    use rk_core::ColumnId;
    use rk_data::schema::ColumnDesc;
    use serde_json::json;

    fn number_column() -> Column {
        let desc = ColumnDesc::new("number", "a").with_domain(0.0, 10.0);
        let kind = ColumnKind::Number(NumberColumn::from_desc(&desc).unwrap());
        Column::new(ColumnId::from("col1"), Arc::new(desc), kind)
    }

    fn category_column() -> Column {
        let desc = ColumnDesc::new("categorical", "c").with_categories(["x", "y"]);
        let kind = ColumnKind::Categorical(CategoricalColumn::from_desc(&desc, false).unwrap());
        Column::new(ColumnId::from("col2"), Arc::new(desc), kind)
    }

    fn snapshot(rows: Vec<Value>) -> SortSnapshot {
        SortSnapshot {
            ranking: RankingId::from("rank0"),
            generation: 1,
            rows: Arc::new(rows),
            filters: Vec::new(),
            sort_criteria: Vec::new(),
            group_criteria: Vec::new(),
            selection: SelectionState::default(),
            nulls: NullConfig::default(),
        }
    }

    fn order(groups: &[OrderedGroup]) -> Vec<usize> {
        groups.iter().flat_map(|g| g.order.iter().copied()).collect()
    }

    #[test]
    fn test_sort_ascending_and_descending() {
        let mut s = snapshot(vec![json!({"a": 10}), json!({"a": 5}), json!({"a": 2}), json!({"a": 7})]);
        s.sort_criteria = vec![(number_column(), true)];
        assert_eq!(order(&sort_and_group(&s)), vec![2, 1, 3, 0]);
        s.sort_criteria = vec![(number_column(), false)];
        assert_eq!(order(&sort_and_group(&s)), vec![0, 3, 1, 2]);
    }

    #[test]
    fn test_ties_keep_input_order_in_both_directions() {
        let mut s = snapshot(vec![json!({"a": 1}), json!({"a": 3}), json!({"a": 1}), json!({"a": 3})]);
        s.sort_criteria = vec![(number_column(), true)];
        assert_eq!(order(&sort_and_group(&s)), vec![0, 2, 1, 3]);
        s.sort_criteria = vec![(number_column(), false)];
        assert_eq!(order(&sort_and_group(&s)), vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_missing_values_first_ascending() {
        let mut s = snapshot(vec![json!({"a": 4}), json!({}), json!({"a": 1})]);
        s.sort_criteria = vec![(number_column(), true)];
        assert_eq!(order(&sort_and_group(&s)), vec![1, 2, 0]);
    }

    #[test]
    fn test_group_then_ungroup_restores_order() {
        let rows = vec![
            json!({"a": 3, "c": "y"}),
            json!({"a": 9, "c": "x"}),
            json!({"a": 1, "c": null}),
            json!({"a": 5, "c": "y"}),
        ];
        let mut s = snapshot(rows);
        s.sort_criteria = vec![(number_column(), false)];
        let before = order(&sort_and_group(&s));

        s.group_criteria = vec![category_column()];
        let grouped = sort_and_group(&s);
        let names: Vec<&str> = grouped.iter().map(|g| g.group.name.as_str()).collect();
        assert_eq!(names, vec!["y", "x", group::MISSING_GROUP]);
        assert_eq!(grouped[0].order, vec![3, 0]);

        s.group_criteria.clear();
        assert_eq!(order(&sort_and_group(&s)), before);
    }

    #[test]
    fn test_category_named_like_missing_group_stays_separate() {
        let desc = ColumnDesc::new("categorical", "c").with_categories([group::MISSING_GROUP, "a"]);
        let kind = ColumnKind::Categorical(CategoricalColumn::from_desc(&desc, false).unwrap());
        let column = Column::new(ColumnId::from("col3"), Arc::new(desc), kind);

        let mut s = snapshot(vec![json!({"c": group::MISSING_GROUP}), json!({"c": "a"}), json!({})]);
        s.group_criteria = vec![column];
        let sorted = sort_and_group(&s);
        let groups: Vec<(&str, bool, Vec<usize>)> = sorted
            .iter()
            .map(|g| (g.group.name.as_str(), g.group.is_missing(), g.order.clone()))
            .collect();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0], (group::MISSING_GROUP, false, vec![0]));
        assert_eq!(groups[1], ("a", false, vec![1]));
        assert_eq!(groups[2], (group::MISSING_GROUP, true, vec![2]));
    }

    #[test]
    fn test_filters_drop_rows() {
        let mut column = number_column();
        column
            .set_filter(crate::ColumnFilter::Number(crate::column::NumberFilter::new(Some(3.0), None, false)))
            .unwrap();
        let mut s = snapshot(vec![json!({"a": 10}), json!({"a": 2}), json!({"a": 7})]);
        s.filters = vec![column.clone()];
        s.sort_criteria = vec![(column, true)];
        assert_eq!(order(&sort_and_group(&s)), vec![2, 0]);
    }

    #[test]
    fn test_empty_rows_yield_one_empty_group() {
        let groups = sort_and_group(&snapshot(Vec::new()));
        assert_eq!(groups.len(), 1);
        assert!(groups[0].order.is_empty());
    }
}
