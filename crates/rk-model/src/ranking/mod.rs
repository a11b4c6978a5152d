//! Rankings: ordered columns with sort and group criteria
//!
//! A ranking never sorts itself. The provider takes a [`SortSnapshot`],
//! computes the order (possibly deferred) and hands it back through
//! [`Ranking::commit`], which drops results of superseded requests.

pub mod group;
pub mod sort;

use std::sync::Arc;

use ahash::AHashMap;
use rk_core::{ColumnId, RankingId, SelectionState};
use rk_data::NullConfig;
use serde_json::Value;

pub use group::{Group, OrderedGroup, DEFAULT_GROUP, MISSING_GROUP};
pub use sort::{sort_and_group, SortSnapshot};

use crate::column::Column;
use crate::dump::{RankingDump, SortCriterionDump};
use crate::ModelError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortCriterion {
    pub column: ColumnId,
    pub asc: bool,
}

impl SortCriterion {
    pub fn new(column: impl Into<ColumnId>, asc: bool) -> Self {
        Self { column: column.into(), asc }
    }
}

/// Position of every visible row within its group
#[derive(Debug, Clone, Default)]
pub struct RankIndex {
    positions: AHashMap<usize, (usize, usize)>,
    groups: Vec<String>,
}

impl RankIndex {
    pub fn from_groups(groups: &[OrderedGroup]) -> Self {
        let mut positions = AHashMap::with_capacity(groups.iter().map(|g| g.order.len()).sum());
        for (g, group) in groups.iter().enumerate() {
            for (rank, &row) in group.order.iter().enumerate() {
                positions.insert(row, (rank, g));
            }
        }
        Self {
            positions,
            groups: groups.iter().map(|g| g.group.name.clone()).collect(),
        }
    }

    /// Zero-based rank of a row within its group
    pub fn rank(&self, row: usize) -> Option<usize> {
        self.positions.get(&row).map(|(rank, _)| *rank)
    }

    pub fn group_name(&self, row: usize) -> Option<&str> {
        let (_, g) = self.positions.get(&row)?;
        self.groups.get(*g).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Ranking {
    id: RankingId,
    columns: Vec<Column>,
    sort_criteria: Vec<SortCriterion>,
    group_criteria: Vec<ColumnId>,
    max_sort_criteria: usize,
    max_group_criteria: usize,
    /// Generation of the latest sort request
    generation: u64,
    /// Generation of the order currently committed
    committed: u64,
    groups: Vec<OrderedGroup>,
    index: RankIndex,
}

impl Ranking {
    pub fn new(id: RankingId, max_sort_criteria: usize, max_group_criteria: usize) -> Self {
        Self {
            id,
            columns: Vec::new(),
            sort_criteria: Vec::new(),
            group_criteria: Vec::new(),
            max_sort_criteria: max_sort_criteria.max(1),
            max_group_criteria: max_group_criteria.max(1),
            generation: 0,
            committed: 0,
            groups: Vec::new(),
            index: RankIndex::default(),
        }
    }

    pub fn id(&self) -> &RankingId {
        &self.id
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// All columns, composites expanded depth first
    pub fn flat_columns(&self) -> Vec<&Column> {
        self.columns.iter().flat_map(Column::flatten).collect()
    }

    pub fn find(&self, id: &ColumnId) -> Option<&Column> {
        self.columns.iter().find_map(|c| c.find(id))
    }

    pub fn find_mut(&mut self, id: &ColumnId) -> Option<&mut Column> {
        self.columns.iter_mut().find_map(|c| c.find_mut(id))
    }

    pub fn contains(&self, id: &ColumnId) -> bool {
        self.find(id).is_some()
    }

    pub fn push_column(&mut self, column: Column) -> Result<(), ModelError> {
        let end = self.columns.len();
        self.insert_column(end, column)
    }

    pub fn insert_column(&mut self, index: usize, column: Column) -> Result<(), ModelError> {
        if let Some(dup) = column.flatten().into_iter().find(|c| self.contains(c.id())) {
            return Err(ModelError::DuplicateColumn(dup.id().clone()));
        }
        let index = index.min(self.columns.len());
        self.columns.insert(index, column);
        Ok(())
    }

    /// Remove a column anywhere in the tree, together with every sort and
    /// group criterion referring to it or its descendants
    pub fn remove_column(&mut self, id: &ColumnId) -> Result<Column, ModelError> {
        let removed = if let Some(index) = self.columns.iter().position(|c| c.id() == id) {
            self.columns.remove(index)
        } else {
            let parent = self
                .find(id)
                .and_then(|c| c.parent().cloned())
                .ok_or_else(|| ModelError::UnknownColumn(id.clone()))?;
            let owner = self.find_mut(&parent).ok_or_else(|| ModelError::UnknownColumn(parent.clone()))?;
            owner.remove_child(id)?.0
        };
        let gone: Vec<&ColumnId> = removed.flatten().into_iter().map(Column::id).collect();
        self.sort_criteria.retain(|c| !gone.contains(&&c.column));
        self.group_criteria.retain(|c| !gone.contains(&c));
        Ok(removed)
    }

    /// Move a top-level column; returns whether the position changed
    pub fn move_column(&mut self, id: &ColumnId, index: usize) -> Result<bool, ModelError> {
        let from = self
            .columns
            .iter()
            .position(|c| c.id() == id)
            .ok_or_else(|| ModelError::UnknownColumn(id.clone()))?;
        let to = index.min(self.columns.len() - 1);
        if from == to {
            return Ok(false);
        }
        let column = self.columns.remove(from);
        self.columns.insert(to, column);
        Ok(true)
    }

    pub fn sort_criteria(&self) -> &[SortCriterion] {
        &self.sort_criteria
    }

    pub fn group_criteria(&self) -> &[ColumnId] {
        &self.group_criteria
    }

    pub fn max_sort_criteria(&self) -> usize {
        self.max_sort_criteria
    }

    pub fn max_group_criteria(&self) -> usize {
        self.max_group_criteria
    }

    /// Replace the sort criteria; returns whether they changed
    pub fn set_sort_criteria(&mut self, criteria: Vec<SortCriterion>) -> Result<bool, ModelError> {
        if criteria.len() > self.max_sort_criteria {
            return Err(ModelError::TooManyCriteria { max: self.max_sort_criteria });
        }
        for criterion in &criteria {
            let column = self
                .find(&criterion.column)
                .ok_or_else(|| ModelError::UnknownColumn(criterion.column.clone()))?;
            if !column.is_sortable() {
                return Err(ModelError::NotSortable(criterion.column.clone()));
            }
        }
        if criteria == self.sort_criteria {
            return Ok(false);
        }
        self.sort_criteria = criteria;
        Ok(true)
    }

    pub fn sort_by(&mut self, id: &ColumnId, asc: bool) -> Result<bool, ModelError> {
        self.set_sort_criteria(vec![SortCriterion::new(id.clone(), asc)])
    }

    /// Flip the direction when `id` is the primary criterion, otherwise sort
    /// by it (numbers descending, everything else ascending)
    pub fn toggle_sort(&mut self, id: &ColumnId) -> Result<bool, ModelError> {
        match self.sort_criteria.first() {
            Some(primary) if &primary.column == id => {
                let mut criteria = self.sort_criteria.clone();
                criteria[0].asc = !criteria[0].asc;
                self.set_sort_criteria(criteria)
            }
            _ => {
                let asc = !self.find(id).map_or(false, Column::is_numeric);
                self.sort_by(id, asc)
            }
        }
    }

    pub fn set_group_criteria(&mut self, criteria: Vec<ColumnId>) -> Result<bool, ModelError> {
        if criteria.len() > self.max_group_criteria {
            return Err(ModelError::TooManyCriteria { max: self.max_group_criteria });
        }
        for id in &criteria {
            let column = self.find(id).ok_or_else(|| ModelError::UnknownColumn(id.clone()))?;
            if !column.is_groupable() {
                return Err(ModelError::NotGroupable(id.clone()));
            }
        }
        if criteria == self.group_criteria {
            return Ok(false);
        }
        self.group_criteria = criteria;
        Ok(true)
    }

    pub fn group_by(&mut self, id: Option<&ColumnId>) -> Result<bool, ModelError> {
        self.set_group_criteria(id.into_iter().cloned().collect())
    }

    /// Issue a new sort request and capture what it needs
    pub fn snapshot(&mut self, rows: Arc<Vec<Value>>, selection: SelectionState, nulls: NullConfig) -> SortSnapshot {
        self.generation += 1;
        let resolve = |id: &ColumnId| self.find(id).cloned();
        SortSnapshot {
            ranking: self.id.clone(),
            generation: self.generation,
            rows,
            filters: self.columns.iter().filter(|c| c.is_filtered()).cloned().collect(),
            sort_criteria: self
                .sort_criteria
                .iter()
                .filter_map(|c| resolve(&c.column).map(|col| (col, c.asc)))
                .collect(),
            group_criteria: self.group_criteria.iter().filter_map(|id| resolve(id)).collect(),
            selection,
            nulls,
        }
    }

    /// Generation of the latest sort request
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn committed_generation(&self) -> u64 {
        self.committed
    }

    /// Whether a sort request is outstanding
    pub fn is_pending(&self) -> bool {
        self.committed < self.generation
    }

    /// Install the result of a sort request
    ///
    /// Returns false and keeps the current order when a newer request was
    /// issued after `generation`.
    pub fn commit(&mut self, generation: u64, groups: Vec<OrderedGroup>) -> bool {
        if generation != self.generation {
            tracing::debug!(ranking = %self.id, generation, latest = self.generation, "discarding stale order");
            return false;
        }
        self.index = RankIndex::from_groups(&groups);
        self.groups = groups;
        self.committed = generation;
        true
    }

    pub fn groups(&self) -> &[OrderedGroup] {
        &self.groups
    }

    /// Committed row order, groups concatenated
    pub fn order(&self) -> Vec<usize> {
        self.groups.iter().flat_map(|g| g.order.iter().copied()).collect()
    }

    pub fn rank_index(&self) -> &RankIndex {
        &self.index
    }

    /// Copy under a new id with fresh column ids; criteria follow the copy.
    /// The committed order is carried over only when `copy_order` is set.
    pub fn clone_as(&self, id: RankingId, next_id: &mut dyn FnMut() -> ColumnId, copy_order: bool) -> Ranking {
        let mut remap = Vec::new();
        let columns: Vec<Column> = self.columns.iter().map(|c| c.with_fresh_ids(next_id, &mut remap)).collect();
        let lookup = |old: &ColumnId| remap.iter().find(|(from, _)| from == old).map(|(_, to)| to.clone());
        let mut copy = Ranking::new(id, self.max_sort_criteria, self.max_group_criteria);
        copy.columns = columns;
        copy.sort_criteria = self
            .sort_criteria
            .iter()
            .filter_map(|c| lookup(&c.column).map(|column| SortCriterion { column, asc: c.asc }))
            .collect();
        copy.group_criteria = self.group_criteria.iter().filter_map(|c| lookup(c)).collect();
        if copy_order {
            copy.groups = self.groups.clone();
            copy.index = self.index.clone();
        }
        copy
    }

    pub fn dump(&self) -> RankingDump {
        RankingDump {
            id: self.id.clone(),
            columns: self.columns.iter().map(Column::dump).collect(),
            sort_criteria: self
                .sort_criteria
                .iter()
                .map(|c| SortCriterionDump {
                    column_id: c.column.clone(),
                    asc: c.asc,
                })
                .collect(),
            group_criteria: self.group_criteria.clone(),
        }
    }

    /// Apply dumped criteria, dropping those whose column did not survive
    pub fn restore_criteria(&mut self, dump: &RankingDump) {
        let sort: Vec<SortCriterion> = dump
            .sort_criteria
            .iter()
            .filter(|c| self.contains(&c.column_id))
            .take(self.max_sort_criteria)
            .map(|c| SortCriterion::new(c.column_id.clone(), c.asc))
            .collect();
        if let Err(e) = self.set_sort_criteria(sort) {
            tracing::warn!(ranking = %self.id, "skipping sort criteria: {}", e);
        }
        let group: Vec<ColumnId> = dump
            .group_criteria
            .iter()
            .filter(|id| self.contains(id))
            .take(self.max_group_criteria)
            .cloned()
            .collect();
        if let Err(e) = self.set_group_criteria(group) {
            tracing::warn!(ranking = %self.id, "skipping group criteria: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{CategoricalColumn, ColumnKind, NumberColumn, StackColumn};
    use rk_data::schema::ColumnDesc;
    use serde_json::json;

    fn number(id: &str, attr: &str) -> Column {
        let desc = ColumnDesc::new("number", attr).with_domain(0.0, 10.0);
        let kind = ColumnKind::Number(NumberColumn::from_desc(&desc).unwrap());
        Column::new(ColumnId::from(id), Arc::new(desc), kind)
    }

    fn categorical(id: &str) -> Column {
        let desc = ColumnDesc::new("categorical", "c").with_categories(["x", "y"]);
        let kind = ColumnKind::Categorical(CategoricalColumn::from_desc(&desc, false).unwrap());
        Column::new(ColumnId::from(id), Arc::new(desc), kind)
    }

    fn rows() -> Arc<Vec<Value>> {
        Arc::new(vec![json!({"a": 10}), json!({"a": 5}), json!({"a": 2}), json!({"a": 7})])
    }

    fn resort(ranking: &mut Ranking) {
        let snapshot = ranking.snapshot(rows(), SelectionState::default(), NullConfig::default());
        let groups = sort_and_group(&snapshot);
        assert!(ranking.commit(snapshot.generation, groups));
    }

    #[test]
    fn test_sort_by_commits_order() {
        let mut ranking = Ranking::new(RankingId::from("rank0"), 1, 1);
        ranking.push_column(number("col1", "a")).unwrap();
        ranking.sort_by(&ColumnId::from("col1"), true).unwrap();
        resort(&mut ranking);
        assert_eq!(ranking.order(), vec![2, 1, 3, 0]);
        assert_eq!(ranking.rank_index().rank(3), Some(2));

        assert!(ranking.toggle_sort(&ColumnId::from("col1")).unwrap());
        resort(&mut ranking);
        assert_eq!(ranking.order(), vec![0, 3, 1, 2]);
    }

    #[test]
    fn test_stale_commit_is_discarded() {
        let mut ranking = Ranking::new(RankingId::from("rank0"), 1, 1);
        ranking.push_column(number("col1", "a")).unwrap();
        ranking.sort_by(&ColumnId::from("col1"), true).unwrap();
        let first = ranking.snapshot(rows(), SelectionState::default(), NullConfig::default());
        let second = ranking.snapshot(rows(), SelectionState::default(), NullConfig::default());
        assert!(ranking.is_pending());

        assert!(ranking.commit(second.generation, sort_and_group(&second)));
        assert!(!ranking.commit(first.generation, Vec::new()));
        assert_eq!(ranking.order(), vec![2, 1, 3, 0]);
        assert!(!ranking.is_pending());
    }

    #[test]
    fn test_criteria_limits_and_membership() {
        let mut ranking = Ranking::new(RankingId::from("rank0"), 1, 1);
        ranking.push_column(number("col1", "a")).unwrap();
        ranking.push_column(number("col2", "b")).unwrap();
        let two = vec![SortCriterion::new("col1", true), SortCriterion::new("col2", true)];
        assert_eq!(ranking.set_sort_criteria(two), Err(ModelError::TooManyCriteria { max: 1 }));
        assert!(ranking.sort_by(&ColumnId::from("col9"), true).is_err());
        assert!(matches!(
            ranking.group_by(Some(&ColumnId::from("col1"))),
            Ok(true)
        ));
        assert!(ranking.sort_criteria().is_empty());
    }

    #[test]
    fn test_remove_column_strips_criteria() {
        let mut ranking = Ranking::new(RankingId::from("rank0"), 2, 1);
        ranking.push_column(number("col1", "a")).unwrap();
        ranking.push_column(categorical("col2")).unwrap();
        ranking.sort_by(&ColumnId::from("col1"), false).unwrap();
        ranking.group_by(Some(&ColumnId::from("col2"))).unwrap();

        ranking.remove_column(&ColumnId::from("col2")).unwrap();
        assert!(ranking.group_criteria().is_empty());
        ranking.remove_column(&ColumnId::from("col1")).unwrap();
        assert!(ranking.sort_criteria().is_empty());
        assert!(ranking.remove_column(&ColumnId::from("col1")).is_err());
    }

    #[test]
    fn test_remove_nested_child() {
        let mut ranking = Ranking::new(RankingId::from("rank0"), 1, 1);
        let mut stack = Column::new(
            ColumnId::from("col0"),
            Arc::new(ColumnDesc::virtual_of("stack")),
            ColumnKind::Stack(StackColumn::default()),
        );
        stack.push_child(number("col1", "a")).unwrap();
        stack.push_child(number("col2", "b")).unwrap();
        ranking.push_column(stack).unwrap();
        ranking.sort_by(&ColumnId::from("col2"), true).unwrap();
        assert_eq!(ranking.flat_columns().len(), 3);

        ranking.remove_column(&ColumnId::from("col2")).unwrap();
        assert_eq!(ranking.flat_columns().len(), 2);
        assert!(ranking.sort_criteria().is_empty());
        assert!(ranking.push_column(number("col1", "a")).is_err());
    }

    #[test]
    fn test_move_column() {
        let mut ranking = Ranking::new(RankingId::from("rank0"), 1, 1);
        ranking.push_column(number("col1", "a")).unwrap();
        ranking.push_column(number("col2", "b")).unwrap();
        assert!(ranking.move_column(&ColumnId::from("col2"), 0).unwrap());
        assert_eq!(ranking.columns()[0].id().as_str(), "col2");
        assert!(!ranking.move_column(&ColumnId::from("col2"), 0).unwrap());
    }

    #[test]
    fn test_clone_as_remaps_criteria() {
        let mut ranking = Ranking::new(RankingId::from("rank0"), 1, 1);
        ranking.push_column(number("col1", "a")).unwrap();
        ranking.sort_by(&ColumnId::from("col1"), true).unwrap();
        resort(&mut ranking);

        let mut next = 5;
        let copy = ranking.clone_as(
            RankingId::from("rank6"),
            &mut || {
                next += 1;
                ColumnId::from(format!("col{}", next))
            },
            true,
        );
        assert_eq!(copy.sort_criteria(), &[SortCriterion::new("col6", true)]);
        assert_eq!(copy.order(), ranking.order());
    }

    #[test]
    fn test_restore_criteria_drops_unknown_columns() {
        let mut ranking = Ranking::new(RankingId::from("rank0"), 1, 1);
        ranking.push_column(number("col1", "a")).unwrap();
        let mut dump = ranking.dump();
        dump.sort_criteria = vec![
            SortCriterionDump {
                column_id: ColumnId::from("col7"),
                asc: true,
            },
            SortCriterionDump {
                column_id: ColumnId::from("col1"),
                asc: false,
            },
        ];
        ranking.restore_criteria(&dump);
        assert_eq!(ranking.sort_criteria(), &[SortCriterion::new("col1", false)]);
    }
}
