use indexmap::IndexSet;

use crate::ids::RankingId;

/// Selection and aggregation state shared by all rankings of a provider
///
/// Owned exclusively by the provider; columns and rankings only read it
/// through snapshots.
#[derive(Debug, Clone, Default)]
pub struct SyncManager {
    /// Shared selection state
    selection: SelectionState,

    /// Collapsed groups
    aggregation: AggregationState,
}

/// Selected row indices, in insertion order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionState {
    rows: IndexSet<usize>,

    /// When false, selecting a row replaces the current selection
    multi: bool,
}

impl Default for SelectionState {
    fn default() -> Self {
        Self {
            rows: IndexSet::new(),
            multi: true,
        }
    }
}

impl SelectionState {
    pub fn new(multi: bool) -> Self {
        Self {
            rows: IndexSet::new(),
            multi,
        }
    }

    pub fn is_selected(&self, row: usize) -> bool {
        self.rows.contains(&row)
    }

    pub fn rows(&self) -> Vec<usize> {
        self.rows.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_multi(&self) -> bool {
        self.multi
    }
}

/// Collapsed flags per (ranking, group)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationState {
    collapsed: IndexSet<String>,
}

impl AggregationState {
    /// Composite key of a group within a ranking
    pub fn key(ranking: &RankingId, group: &str) -> String {
        format!("{}@{}", ranking, group)
    }

    pub fn is_collapsed(&self, ranking: &RankingId, group: &str) -> bool {
        self.collapsed.contains(&Self::key(ranking, group))
    }

    pub fn keys(&self) -> Vec<String> {
        self.collapsed.iter().cloned().collect()
    }
}

impl SyncManager {
    /// Create a new synchronization manager
    pub fn new(multi_selection: bool) -> Self {
        Self {
            selection: SelectionState::new(multi_selection),
            aggregation: AggregationState::default(),
        }
    }

    /// Get the current selection state
    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    /// Get the current aggregation state
    pub fn aggregation(&self) -> &AggregationState {
        &self.aggregation
    }

    /// Select a row; returns whether the selection changed
    pub fn select(&mut self, row: usize) -> bool {
        if self.selection.rows.contains(&row) {
            return false;
        }
        if !self.selection.multi {
            self.selection.rows.clear();
        }
        self.selection.rows.insert(row)
    }

    /// Deselect a row; returns whether the selection changed
    pub fn deselect(&mut self, row: usize) -> bool {
        self.selection.rows.shift_remove(&row)
    }

    /// Toggle a row; returns the new selected flag of that row
    pub fn toggle_selection(&mut self, row: usize) -> bool {
        if self.deselect(row) {
            false
        } else {
            self.select(row);
            true
        }
    }

    /// Replace the selection; returns whether it changed
    ///
    /// In single-selection mode only the last row is kept.
    pub fn set_selection(&mut self, rows: impl IntoIterator<Item = usize>) -> bool {
        let mut next: IndexSet<usize> = rows.into_iter().collect();
        if !self.selection.multi && next.len() > 1 {
            let last = next.pop();
            next.clear();
            next.extend(last);
        }
        if next == self.selection.rows {
            return false;
        }
        self.selection.rows = next;
        true
    }

    /// Clear the selection; returns whether it changed
    pub fn clear_selection(&mut self) -> bool {
        let changed = !self.selection.rows.is_empty();
        self.selection.rows.clear();
        changed
    }

    /// Set the collapsed flag of a group; returns whether it changed
    pub fn set_aggregated(&mut self, ranking: &RankingId, group: &str, collapsed: bool) -> bool {
        let key = AggregationState::key(ranking, group);
        if collapsed {
            self.aggregation.collapsed.insert(key)
        } else {
            self.aggregation.collapsed.shift_remove(&key)
        }
    }

    /// Drop all aggregation flags of a ranking
    pub fn forget_ranking(&mut self, ranking: &RankingId) {
        let prefix = format!("{}@", ranking);
        self.aggregation.collapsed.retain(|key| !key.starts_with(&prefix));
    }

    /// Restore aggregation keys from a dump
    pub fn restore_aggregations(&mut self, keys: impl IntoIterator<Item = String>) {
        self.aggregation.collapsed = keys.into_iter().collect();
    }
}
