//! Helper columns backed by provider state instead of row data

use std::cmp::Ordering;

use rk_data::value::DataRow;

use super::EvalContext;
use crate::ranking::Group;

/// Checkbox column reflecting the provider selection
#[derive(Debug, Clone, Default)]
pub struct SelectionColumn {
    /// `Some(true)` keeps selected rows only, `Some(false)` unselected ones
    pub(crate) filter: Option<bool>,
}

impl SelectionColumn {
    pub fn is_selected(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> bool {
        ctx.selection.is_selected(row.index)
    }

    pub fn accepts(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> bool {
        self.filter.map_or(true, |wanted| self.is_selected(row, ctx) == wanted)
    }

    /// Selected rows first
    pub fn compare(&self, a: DataRow<'_>, b: DataRow<'_>, ctx: &EvalContext<'_>) -> Ordering {
        self.is_selected(b, ctx).cmp(&self.is_selected(a, ctx))
    }

    pub(crate) fn group(&self, row: DataRow<'_>, ctx: &EvalContext<'_>) -> Group {
        if self.is_selected(row, ctx) {
            Group::new("Selected", "#ff7f0e")
        } else {
            Group::new("Unselected", "#7f7f7f")
        }
    }
}

/// One-based position of a row within its group in the committed order
pub fn rank_of(row: DataRow<'_>, ctx: &EvalContext<'_>) -> Option<usize> {
    ctx.ranks?.rank(row.index).map(|r| r + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::{Group, OrderedGroup, RankIndex};
    use rk_core::SyncManager;
    use rk_data::NullConfig;
    use serde_json::json;

    #[test]
    fn test_selected_rows_sort_first() {
        let nulls = NullConfig::default();
        let mut sync = SyncManager::new(true);
        sync.select(1);
        let ctx = EvalContext::new(&nulls, sync.selection());
        let row = json!({});
        let column = SelectionColumn::default();
        assert_eq!(
            column.compare(DataRow::new(1, &row), DataRow::new(0, &row), &ctx),
            Ordering::Less
        );
        assert_eq!(column.group(DataRow::new(1, &row), &ctx).name, "Selected");
    }

    #[test]
    fn test_selection_filter() {
        let nulls = NullConfig::default();
        let mut sync = SyncManager::new(true);
        sync.select(0);
        let ctx = EvalContext::new(&nulls, sync.selection());
        let row = json!({});
        let column = SelectionColumn { filter: Some(true) };
        assert!(column.accepts(DataRow::new(0, &row), &ctx));
        assert!(!column.accepts(DataRow::new(1, &row), &ctx));
    }

    #[test]
    fn test_rank_is_one_based() {
        let nulls = NullConfig::default();
        let sync = SyncManager::new(true);
        let ranks = RankIndex::from_groups(&[OrderedGroup {
            group: Group::default_group(),
            order: vec![7, 3],
        }]);
        let ctx = EvalContext::new(&nulls, sync.selection()).with_ranks(&ranks);
        let row = json!({});
        assert_eq!(rank_of(DataRow::new(3, &row), &ctx), Some(2));
        assert_eq!(rank_of(DataRow::new(4, &row), &ctx), None);
    }
}
