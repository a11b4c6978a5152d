//! The data provider
//!
//! Owns the rows, the column descriptors, every ranking and the shared
//! selection/aggregation state. All mutations go through the provider so
//! that events are published and affected rankings are marked dirty.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use ahash::AHashSet;
use rk_core::{
    AggregationState, ColumnEvent, ColumnEventKind, ColumnId, EventBus, ProviderEvent, ProviderEventKind, RankingEvent,
    RankingEventKind, RankingId, SelectionState, SyncManager, UidGenerator,
};
use rk_data::schema::{CategoryDesc, ColumnDesc};
use rk_data::stats::SortMethod;
use rk_data::value::{self, DataRow};
use rk_data::{MappingFunction, SchemaDetector};
use rk_model::column::{DateGranularity, ReduceOp};
use rk_model::factory::VIRTUAL_TYPES;
use rk_model::{
    sort_and_group, CellValue, Column, ColumnFactory, ColumnFilter, ColumnKind, EvalContext, Fired, ModelError,
    OrderedGroup, Ranking, SortCriterion,
};
use serde_json::Value;

use crate::backend::{LocalSortBackend, SortBackend};
use crate::debounce::Debouncer;
use crate::settings::ProviderSettings;
use crate::stats::{ColumnStats, StatsCache};
use crate::{ProviderError, Result};

type SortFuture = Pin<Box<dyn Future<Output = Result<Vec<OrderedGroup>>> + Send>>;

/// A sort request in flight
///
/// Holds the generation it was issued for; resolving it does not touch the
/// provider, so several tickets may be outstanding at once.
pub struct SortTicket {
    ranking: RankingId,
    generation: u64,
    future: SortFuture,
}

impl SortTicket {
    pub fn ranking(&self) -> &RankingId {
        &self.ranking
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Run the sort to completion
    pub async fn resolve(self) -> Result<ResolvedSort> {
        let groups = self.future.await?;
        Ok(ResolvedSort {
            ranking: self.ranking,
            generation: self.generation,
            groups,
        })
    }
}

impl std::fmt::Debug for SortTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortTicket")
            .field("ranking", &self.ranking)
            .field("generation", &self.generation)
            .finish()
    }
}

/// A finished sort waiting to be committed
#[derive(Debug, Clone)]
pub struct ResolvedSort {
    pub ranking: RankingId,
    pub generation: u64,
    pub groups: Vec<OrderedGroup>,
}

pub struct DataProvider {
    pub(crate) rows: Arc<Vec<Value>>,
    pub(crate) descs: Vec<Arc<ColumnDesc>>,
    pub(crate) rankings: Vec<Ranking>,
    pub(crate) sync: SyncManager,
    pub(crate) uid: UidGenerator,
    pub(crate) events: Arc<EventBus>,
    pub(crate) settings: ProviderSettings,
    pub(crate) factory: ColumnFactory,
    pub(crate) backend: Arc<dyn SortBackend>,
    pub(crate) debouncer: Debouncer,
    pub(crate) stats: StatsCache,
}

impl std::fmt::Debug for DataProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataProvider")
            .field("rows", &self.rows.len())
            .field("descs", &self.descs.len())
            .field("rankings", &self.rankings.iter().map(Ranking::id).collect::<Vec<_>>())
            .field("uid", &self.uid.value())
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl DataProvider {
    /// Create a provider over `rows`
    ///
    /// Descriptors lacking a domain or categories get them from the data.
    pub fn new(rows: Vec<Value>, descs: Vec<ColumnDesc>, settings: ProviderSettings) -> Self {
        let descs = descs
            .into_iter()
            .map(|desc| Arc::new(prepare_desc(desc, &rows, &settings)))
            .collect();
        let events = Arc::new(EventBus::new());
        let stats = StatsCache::default();
        stats.attach(&events);

        Self {
            rows: Arc::new(rows),
            descs,
            rankings: Vec::new(),
            sync: SyncManager::new(settings.multi_selection),
            uid: UidGenerator::new(),
            events,
            debouncer: Debouncer::new(settings.debounce()),
            factory: ColumnFactory::default(),
            backend: Arc::new(LocalSortBackend),
            stats,
            settings,
        }
    }

    /// Create a provider with descriptors inferred from the rows
    pub fn from_rows(rows: Vec<Value>, settings: ProviderSettings) -> Self {
        let descs = SchemaDetector::new().with_nulls(settings.nulls.clone()).detect(&rows);
        Self::new(rows, descs, settings)
    }

    pub fn with_backend(mut self, backend: Arc<dyn SortBackend>) -> Self {
        tracing::debug!(backend = backend.name(), "using sort backend");
        self.backend = backend;
        self
    }

    pub fn with_factory(mut self, factory: ColumnFactory) -> Self {
        self.factory = factory;
        self
    }

    // Accessors

    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    pub fn descs(&self) -> &[Arc<ColumnDesc>] {
        &self.descs
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn selection(&self) -> &SelectionState {
        self.sync.selection()
    }

    pub fn aggregation(&self) -> &AggregationState {
        self.sync.aggregation()
    }

    /// Value of the next issued id
    pub fn uid(&self) -> u64 {
        self.uid.value()
    }

    pub fn rankings(&self) -> &[Ranking] {
        &self.rankings
    }

    pub fn ranking(&self, id: &RankingId) -> Result<&Ranking> {
        self.rankings
            .iter()
            .find(|r| r.id() == id)
            .ok_or_else(|| ProviderError::UnknownRanking(id.clone()))
    }

    pub fn column(&self, ranking: &RankingId, column: &ColumnId) -> Result<&Column> {
        self.ranking(ranking)?
            .find(column)
            .ok_or_else(|| ProviderError::UnknownColumn(column.clone()))
    }

    fn ranking_index(&self, id: &RankingId) -> Result<usize> {
        self.rankings
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| ProviderError::UnknownRanking(id.clone()))
    }

    /// Whether a ranking waits for a debounced re-sort
    pub fn is_dirty(&self, ranking: &RankingId) -> bool {
        self.debouncer.is_dirty(ranking)
    }

    // Descriptors and column creation

    /// Find the descriptor for a reference; virtual types resolve to a
    /// fresh descriptor of that type
    pub fn resolve_desc(&self, desc_ref: &str) -> Option<Arc<ColumnDesc>> {
        if let Some(desc) = self.descs.iter().find(|d| d.desc_ref() == desc_ref) {
            return Some(desc.clone());
        }
        let (kind, column) = ColumnDesc::parse_ref(desc_ref);
        if column.is_empty() && VIRTUAL_TYPES.contains(&kind) {
            return Some(Arc::new(ColumnDesc::virtual_of(kind)));
        }
        None
    }

    /// Create a column with a fresh id; `None` for an unknown type
    pub fn create_column(&mut self, desc: Arc<ColumnDesc>) -> Option<Column> {
        let id = self.uid.next_column_id();
        self.factory.create(id, desc)
    }

    /// Create a column from a descriptor reference such as `number@score`
    pub fn create_column_for(&mut self, desc_ref: &str) -> Result<Column> {
        let desc = self
            .resolve_desc(desc_ref)
            .ok_or_else(|| ProviderError::UnknownDescriptor(desc_ref.to_string()))?;
        self.create_column(desc)
            .ok_or_else(|| ProviderError::UnknownDescriptor(desc_ref.to_string()))
    }

    fn helper_column(&mut self, kind: &str) -> Option<Column> {
        self.create_column(Arc::new(ColumnDesc::virtual_of(kind)))
    }

    // Rankings

    fn new_ranking(&mut self) -> Ranking {
        let id = self.uid.next_ranking_id();
        Ranking::new(id, self.settings.max_sort_criteria, self.settings.max_group_criteria)
    }

    fn add_helper_columns(&mut self, ranking: &mut Ranking) -> Result<()> {
        let helpers = [
            (self.settings.aggregate_column, "aggregate"),
            (self.settings.auto_rank_column, "rank"),
            (self.settings.auto_selection_column, "selection"),
        ];
        for (enabled, kind) in helpers {
            if !enabled {
                continue;
            }
            if let Some(column) = self.helper_column(kind) {
                ranking.push_column(column)?;
            }
        }
        Ok(())
    }

    /// Add an empty ranking holding only the configured helper columns
    pub fn push_ranking(&mut self) -> Result<RankingId> {
        let mut ranking = self.new_ranking();
        self.add_helper_columns(&mut ranking)?;
        let id = ranking.id().clone();
        let end = self.rankings.len();
        self.insert_ranking(end, ranking)?;
        Ok(id)
    }

    /// Add a ranking with one column per descriptor
    pub fn push_default_ranking(&mut self) -> Result<RankingId> {
        let mut ranking = self.new_ranking();
        self.add_helper_columns(&mut ranking)?;
        for desc in self.descs.clone() {
            if let Some(column) = self.create_column(desc) {
                ranking.push_column(column)?;
            }
        }
        let id = ranking.id().clone();
        let end = self.rankings.len();
        self.insert_ranking(end, ranking)?;
        Ok(id)
    }

    pub fn insert_ranking(&mut self, index: usize, ranking: Ranking) -> Result<()> {
        if self.rankings.iter().any(|r| r.id() == ranking.id()) {
            return Err(ProviderError::DuplicateRanking(ranking.id().clone()));
        }
        let id = ranking.id().clone();
        let index = index.min(self.rankings.len());
        self.rankings.insert(index, ranking);
        tracing::info!(ranking = %id, "ranking added");
        self.events.publish(ProviderEvent {
            kind: ProviderEventKind::RankingAdded(id.clone()),
        });
        self.debouncer.mark(id);
        Ok(())
    }

    pub fn remove_ranking(&mut self, id: &RankingId) -> Result<Ranking> {
        let index = self.ranking_index(id)?;
        let ranking = self.rankings.remove(index);
        self.sync.forget_ranking(id);
        self.debouncer.forget(id);
        self.stats.invalidate_ranking(id);
        tracing::info!(ranking = %id, "ranking removed");
        self.events.publish(ProviderEvent {
            kind: ProviderEventKind::RankingRemoved(id.clone()),
        });
        Ok(ranking)
    }

    /// Copy a ranking under a fresh id with fresh column ids
    ///
    /// The copy is inserted right after its source. With `copy_order` the
    /// committed order is carried over; otherwise the copy starts dirty.
    pub fn clone_ranking(&mut self, source: &RankingId, copy_order: bool) -> Result<RankingId> {
        let index = self.ranking_index(source)?;
        let id = self.uid.next_ranking_id();
        let uid = &mut self.uid;
        let copy = self.rankings[index].clone_as(id.clone(), &mut || uid.next_column_id(), copy_order);
        self.insert_ranking(index + 1, copy)?;
        if copy_order {
            self.debouncer.forget(&id);
        }
        Ok(id)
    }

    // Columns

    /// Append a column to a ranking
    pub fn push_column(&mut self, ranking: &RankingId, column: Column) -> Result<()> {
        let end = self.ranking(ranking)?.columns().len();
        self.insert_column(ranking, end, column)
    }

    /// Create a column from a descriptor reference and append it
    pub fn push_desc(&mut self, ranking: &RankingId, desc_ref: &str) -> Result<ColumnId> {
        self.ranking_index(ranking)?;
        let column = self.create_column_for(desc_ref)?;
        let id = column.id().clone();
        self.push_column(ranking, column)?;
        Ok(id)
    }

    pub fn insert_column(&mut self, ranking: &RankingId, index: usize, column: Column) -> Result<()> {
        let r = self.ranking_index(ranking)?;
        let id = column.id().clone();
        let filtered = column.is_filtered();
        self.rankings[r].insert_column(index, column)?;
        self.events.publish(RankingEvent {
            ranking: ranking.clone(),
            kind: RankingEventKind::ColumnAdded(id),
        });
        if filtered {
            self.debouncer.mark(ranking.clone());
        }
        Ok(())
    }

    /// Remove a column anywhere in the ranking, composites' children
    /// included; criteria referring to it are dropped
    pub fn remove_column(&mut self, ranking: &RankingId, column: &ColumnId) -> Result<Column> {
        let r = self.ranking_index(ranking)?;
        let before = &self.rankings[r];
        let ancestors = ancestors_of(before, column);
        let sort_before = before.sort_criteria().len();
        let group_before = before.group_criteria().len();

        let removed = self.rankings[r].remove_column(column)?;
        let after = &self.rankings[r];
        let sort_changed = after.sort_criteria().len() != sort_before;
        let group_changed = after.group_criteria().len() != group_before;

        self.events.publish(RankingEvent {
            ranking: ranking.clone(),
            kind: RankingEventKind::ColumnRemoved(column.clone()),
        });
        if sort_changed {
            self.publish_ranking(ranking, RankingEventKind::SortCriteriaChanged);
        }
        if group_changed {
            self.publish_ranking(ranking, RankingEventKind::GroupCriteriaChanged);
        }
        if let Some((parent, rest)) = ancestors.split_first() {
            self.publish_column(ranking, parent, ColumnEventKind::Children);
            self.publish_column(ranking, parent, ColumnEventKind::DirtyValues);
            for id in rest {
                self.publish_column(ranking, id, ColumnEventKind::DirtyValues);
            }
        }
        if sort_changed || group_changed || removed.is_filtered() || !ancestors.is_empty() {
            self.debouncer.mark(ranking.clone());
        }
        Ok(removed)
    }

    /// Move a top-level column; returns whether its position changed
    pub fn move_column(&mut self, ranking: &RankingId, column: &ColumnId, index: usize) -> Result<bool> {
        let r = self.ranking_index(ranking)?;
        let moved = self.rankings[r].move_column(column, index)?;
        if moved {
            self.publish_ranking(ranking, RankingEventKind::ColumnMoved(column.clone()));
        }
        Ok(moved)
    }

    /// Append a child to a composite column
    pub fn push_child(&mut self, ranking: &RankingId, parent: &ColumnId, child: Column) -> Result<Fired> {
        let r = self.ranking_index(ranking)?;
        if let Some(dup) = child.flatten().into_iter().find(|c| self.rankings[r].contains(c.id())) {
            return Err(ModelError::DuplicateColumn(dup.id().clone()).into());
        }
        self.update_column(ranking, parent, |column| column.push_child(child))
    }

    /// Apply a column setter and publish what it fired
    ///
    /// When the setter dirtied values, every ancestor composite is dirtied
    /// too and the ranking is scheduled for a re-sort.
    pub fn update_column<F>(&mut self, ranking: &RankingId, column: &ColumnId, f: F) -> Result<Fired>
    where
        F: FnOnce(&mut Column) -> std::result::Result<Fired, ModelError>,
    {
        let r = self.ranking_index(ranking)?;
        let target = self.rankings[r]
            .find_mut(column)
            .ok_or_else(|| ProviderError::UnknownColumn(column.clone()))?;
        let fired = f(target)?;
        let ancestors = ancestors_of(&self.rankings[r], column);

        for kind in &fired {
            self.publish_column(ranking, column, *kind);
        }
        if fired.iter().any(ColumnEventKind::dirties_order) {
            for id in &ancestors {
                self.publish_column(ranking, id, ColumnEventKind::DirtyValues);
            }
            self.debouncer.mark(ranking.clone());
        }
        Ok(fired)
    }

    pub fn set_filter(&mut self, ranking: &RankingId, column: &ColumnId, filter: ColumnFilter) -> Result<Fired> {
        self.update_column(ranking, column, |c| c.set_filter(filter))
    }

    pub fn clear_filter(&mut self, ranking: &RankingId, column: &ColumnId) -> Result<Fired> {
        self.update_column(ranking, column, |c| Ok(c.clear_filter()))
    }

    pub fn set_mapping(&mut self, ranking: &RankingId, column: &ColumnId, mapping: MappingFunction) -> Result<Fired> {
        self.update_column(ranking, column, |c| c.set_mapping(mapping))
    }

    pub fn set_domain(&mut self, ranking: &RankingId, column: &ColumnId, min: f64, max: f64) -> Result<Fired> {
        self.update_column(ranking, column, |c| c.set_domain(min, max))
    }

    pub fn set_sort_method(&mut self, ranking: &RankingId, column: &ColumnId, method: SortMethod) -> Result<Fired> {
        self.update_column(ranking, column, |c| c.set_sort_method(method))
    }

    pub fn set_weights(&mut self, ranking: &RankingId, column: &ColumnId, weights: &[f64]) -> Result<Fired> {
        self.update_column(ranking, column, |c| c.set_weights(weights))
    }

    pub fn set_width(&mut self, ranking: &RankingId, column: &ColumnId, width: f64) -> Result<Fired> {
        self.update_column(ranking, column, |c| c.set_width(width))
    }

    pub fn set_label(&mut self, ranking: &RankingId, column: &ColumnId, label: &str) -> Result<Fired> {
        self.update_column(ranking, column, |c| Ok(c.set_label(label)))
    }

    pub fn set_hidden(&mut self, ranking: &RankingId, column: &ColumnId, hidden: bool) -> Result<Fired> {
        self.update_column(ranking, column, |c| Ok(c.set_hidden(hidden)))
    }

    pub fn set_compressed(&mut self, ranking: &RankingId, column: &ColumnId, compressed: bool) -> Result<Fired> {
        self.update_column(ranking, column, |c| Ok(c.set_compressed(compressed)))
    }

    pub fn set_renderer(&mut self, ranking: &RankingId, column: &ColumnId, renderer: &str) -> Result<Fired> {
        self.update_column(ranking, column, |c| Ok(c.set_renderer(renderer)))
    }

    pub fn set_group_threshold(&mut self, ranking: &RankingId, column: &ColumnId, threshold: f64) -> Result<Fired> {
        self.update_column(ranking, column, |c| c.set_group_threshold(threshold))
    }

    pub fn set_date_grouper(
        &mut self,
        ranking: &RankingId,
        column: &ColumnId,
        granularity: DateGranularity,
    ) -> Result<Fired> {
        self.update_column(ranking, column, |c| c.set_date_grouper(granularity))
    }

    pub fn set_reduce(&mut self, ranking: &RankingId, column: &ColumnId, op: ReduceOp) -> Result<Fired> {
        self.update_column(ranking, column, |c| c.set_reduce(op))
    }

    pub fn set_script(&mut self, ranking: &RankingId, column: &ColumnId, code: &str) -> Result<Fired> {
        self.update_column(ranking, column, |c| c.set_script(code))
    }

    // Sort and group criteria

    fn criteria_changed(&mut self, ranking: &RankingId, kind: RankingEventKind, changed: bool) -> bool {
        if changed {
            self.publish_ranking(ranking, kind);
            self.debouncer.mark(ranking.clone());
        }
        changed
    }

    pub fn set_sort_criteria(&mut self, ranking: &RankingId, criteria: Vec<SortCriterion>) -> Result<bool> {
        let r = self.ranking_index(ranking)?;
        let changed = self.rankings[r].set_sort_criteria(criteria)?;
        Ok(self.criteria_changed(ranking, RankingEventKind::SortCriteriaChanged, changed))
    }

    pub fn sort_by(&mut self, ranking: &RankingId, column: &ColumnId, asc: bool) -> Result<bool> {
        self.set_sort_criteria(ranking, vec![SortCriterion::new(column.clone(), asc)])
    }

    /// Sort by a column, or flip the direction if it already is the
    /// primary criterion
    pub fn toggle_sort(&mut self, ranking: &RankingId, column: &ColumnId) -> Result<bool> {
        let r = self.ranking_index(ranking)?;
        let changed = self.rankings[r].toggle_sort(column)?;
        Ok(self.criteria_changed(ranking, RankingEventKind::SortCriteriaChanged, changed))
    }

    pub fn set_group_criteria(&mut self, ranking: &RankingId, criteria: Vec<ColumnId>) -> Result<bool> {
        let r = self.ranking_index(ranking)?;
        let changed = self.rankings[r].set_group_criteria(criteria)?;
        Ok(self.criteria_changed(ranking, RankingEventKind::GroupCriteriaChanged, changed))
    }

    /// Group by a single column, or ungroup with `None`
    pub fn group_by(&mut self, ranking: &RankingId, column: Option<&ColumnId>) -> Result<bool> {
        self.set_group_criteria(ranking, column.into_iter().cloned().collect())
    }

    // Selection and aggregation

    fn selection_changed(&mut self) {
        let selected = self.sync.selection().rows();
        tracing::debug!(selected = selected.len(), "selection changed");
        self.events.publish(ProviderEvent {
            kind: ProviderEventKind::SelectionChanged { selected },
        });
        let dependent: Vec<RankingId> = self
            .rankings
            .iter()
            .filter(|r| depends_on_selection(r))
            .map(|r| r.id().clone())
            .collect();
        for id in dependent {
            self.debouncer.mark(id);
        }
    }

    fn in_bounds(&self, row: usize) -> bool {
        if row < self.rows.len() {
            return true;
        }
        tracing::warn!(row, rows = self.rows.len(), "ignoring selection of unknown row");
        false
    }

    /// Select a row; returns whether the selection changed
    pub fn select(&mut self, row: usize) -> bool {
        if !self.in_bounds(row) || !self.sync.select(row) {
            return false;
        }
        self.selection_changed();
        true
    }

    /// Deselect a row; returns whether the selection changed
    pub fn deselect(&mut self, row: usize) -> bool {
        if !self.sync.deselect(row) {
            return false;
        }
        self.selection_changed();
        true
    }

    /// Toggle a row; returns its new selected flag
    pub fn toggle_selection(&mut self, row: usize) -> bool {
        if !self.in_bounds(row) {
            return false;
        }
        let selected = self.sync.toggle_selection(row);
        self.selection_changed();
        selected
    }

    /// Replace the selection; rows out of range are dropped
    pub fn set_selection(&mut self, rows: impl IntoIterator<Item = usize>) -> bool {
        let count = self.rows.len();
        if !self.sync.set_selection(rows.into_iter().filter(|&row| row < count)) {
            return false;
        }
        self.selection_changed();
        true
    }

    pub fn clear_selection(&mut self) -> bool {
        if !self.sync.clear_selection() {
            return false;
        }
        self.selection_changed();
        true
    }

    /// Collapse or expand a group of a ranking; returns whether it changed
    pub fn set_aggregated(&mut self, ranking: &RankingId, group: &str, collapsed: bool) -> Result<bool> {
        self.ranking_index(ranking)?;
        if !self.sync.set_aggregated(ranking, group, collapsed) {
            return Ok(false);
        }
        self.events.publish(ProviderEvent {
            kind: ProviderEventKind::AggregationChanged {
                ranking: ranking.clone(),
                group: group.to_string(),
                collapsed,
            },
        });
        Ok(true)
    }

    pub fn is_aggregated(&self, ranking: &RankingId, group: &str) -> bool {
        self.sync.aggregation().is_collapsed(ranking, group)
    }

    // Sorting

    /// Schedule a debounced re-sort of a ranking
    pub fn mark_dirty(&mut self, ranking: &RankingId) -> Result<()> {
        self.ranking_index(ranking)?;
        self.debouncer.mark(ranking.clone());
        Ok(())
    }

    /// Issue a sort request through the configured backend
    ///
    /// Issuing supersedes every earlier request of the same ranking: their
    /// results will be discarded on commit.
    pub fn request_sort(&mut self, ranking: &RankingId) -> Result<SortTicket> {
        let r = self.ranking_index(ranking)?;
        let snapshot = self.rankings[r].snapshot(
            self.rows.clone(),
            self.sync.selection().clone(),
            self.settings.nulls.clone(),
        );
        let generation = snapshot.generation;
        tracing::debug!(ranking = %ranking, generation, backend = self.backend.name(), "sort requested");

        let backend = self.backend.clone();
        let future: SortFuture = Box::pin(async move { backend.sort(snapshot).await });
        Ok(SortTicket {
            ranking: ranking.clone(),
            generation,
            future,
        })
    }

    /// Install a finished sort; returns false when it was superseded or
    /// its ranking is gone
    pub fn commit(&mut self, resolved: ResolvedSort) -> bool {
        let ResolvedSort {
            ranking,
            generation,
            groups,
        } = resolved;
        let Some(r) = self.rankings.iter().position(|r| r.id() == &ranking) else {
            tracing::debug!(ranking = %ranking, generation, "dropping order of removed ranking");
            return false;
        };
        let rows = groups.iter().map(|g| g.order.len()).sum();
        if !self.rankings[r].commit(generation, groups) {
            self.publish_ranking(&ranking, RankingEventKind::StaleOrderDiscarded { generation });
            return false;
        }
        tracing::debug!(ranking = %ranking, generation, rows, "order committed");
        self.publish_ranking(&ranking, RankingEventKind::OrderChanged { generation, rows });
        true
    }

    /// Sort a ranking through the backend and commit the result
    pub async fn resort(&mut self, ranking: &RankingId) -> Result<bool> {
        let ticket = self.request_sort(ranking)?;
        let resolved = ticket.resolve().await?;
        Ok(self.commit(resolved))
    }

    /// Sort a ranking on the calling thread, bypassing the backend
    pub fn resort_now(&mut self, ranking: &RankingId) -> Result<bool> {
        let r = self.ranking_index(ranking)?;
        let snapshot = self.rankings[r].snapshot(
            self.rows.clone(),
            self.sync.selection().clone(),
            self.settings.nulls.clone(),
        );
        let groups = sort_and_group(&snapshot);
        self.debouncer.forget(ranking);
        Ok(self.commit(ResolvedSort {
            ranking: ranking.clone(),
            generation: snapshot.generation,
            groups,
        }))
    }

    /// Wait for the debounce window to pass, then re-sort every dirty
    /// ranking once; returns the re-sorted rankings
    pub async fn settle(&mut self) -> Result<Vec<RankingId>> {
        let dirty = self.debouncer.wait().await;
        let mut sorted = Vec::with_capacity(dirty.len());
        for id in dirty {
            if self.ranking_index(&id).is_err() {
                continue;
            }
            if self.resort(&id).await? {
                sorted.push(id);
            }
        }
        Ok(sorted)
    }

    /// Re-sort every ranking immediately
    pub async fn resort_all(&mut self) -> Result<()> {
        let ids: Vec<RankingId> = self.rankings.iter().map(|r| r.id().clone()).collect();
        self.debouncer.drain();
        for id in ids {
            self.resort(&id).await?;
        }
        Ok(())
    }

    // Reading

    /// Evaluation context of a ranking
    pub fn context<'a>(&'a self, ranking: &'a Ranking) -> EvalContext<'a> {
        EvalContext::new(&self.settings.nulls, self.sync.selection())
            .with_ranks(ranking.rank_index())
            .with_aggregation(ranking.id(), self.sync.aggregation())
    }

    /// Value of a cell; rows out of range are missing
    pub fn value(&self, ranking: &RankingId, column: &ColumnId, row: usize) -> Result<CellValue> {
        let r = self.ranking(ranking)?;
        let c = r.find(column).ok_or_else(|| ProviderError::UnknownColumn(column.clone()))?;
        Ok(match self.rows.get(row) {
            Some(data) => c.value(DataRow::new(row, data), &self.context(r)),
            None => CellValue::Missing,
        })
    }

    /// Display label of a cell
    pub fn label(&self, ranking: &RankingId, column: &ColumnId, row: usize) -> Result<String> {
        let r = self.ranking(ranking)?;
        let c = r.find(column).ok_or_else(|| ProviderError::UnknownColumn(column.clone()))?;
        Ok(match self.rows.get(row) {
            Some(data) => c.label_for(DataRow::new(row, data), &self.context(r)),
            None => String::new(),
        })
    }

    /// Statistics of a column over the committed order of its ranking
    ///
    /// Cached until the column's values or the ranking's order change.
    pub fn stats(&self, ranking: &RankingId, column: &ColumnId) -> Result<Arc<ColumnStats>> {
        if let Some(stats) = self.stats.get(ranking, column) {
            return Ok(stats);
        }
        let order = self.ranking(ranking)?.order();
        let stats = Arc::new(self.stats_for_rows(ranking, column, &order)?);
        self.stats.put(ranking.clone(), column.clone(), stats.clone());
        Ok(stats)
    }

    /// Statistics of a column over an arbitrary row set; not cached
    pub fn stats_for_rows(&self, ranking: &RankingId, column: &ColumnId, rows: &[usize]) -> Result<ColumnStats> {
        let r = self.ranking(ranking)?;
        let c = r.find(column).ok_or_else(|| ProviderError::UnknownColumn(column.clone()))?;
        ColumnStats::compute(c, &self.rows, rows, &self.context(r)).ok_or_else(|| ProviderError::NoStatistics(column.clone()))
    }

    /// Raw values of every row, for editing a column's mapping
    pub fn mapping_sample(&self, ranking: &RankingId, column: &ColumnId) -> Result<Vec<f64>> {
        let r = self.ranking(ranking)?;
        let c = r.find(column).ok_or_else(|| ProviderError::UnknownColumn(column.clone()))?;
        if c.mapping().is_none() {
            return Err(ModelError::Unsupported(column.clone(), "mapping").into());
        }
        let ctx = self.context(r);
        Ok(self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| c.raw_number(DataRow::new(i, row), &ctx))
            .collect())
    }

    // Events

    fn publish_column(&self, ranking: &RankingId, column: &ColumnId, kind: ColumnEventKind) {
        self.events.publish(ColumnEvent {
            ranking: ranking.clone(),
            column: column.clone(),
            kind,
        });
    }

    fn publish_ranking(&self, ranking: &RankingId, kind: RankingEventKind) {
        self.events.publish(RankingEvent {
            ranking: ranking.clone(),
            kind,
        });
    }
}

/// Composites enclosing a column, innermost first
fn ancestors_of(ranking: &Ranking, column: &ColumnId) -> Vec<ColumnId> {
    let mut out = Vec::new();
    let mut current = ranking.find(column).and_then(|c| c.parent().cloned());
    while let Some(id) = current {
        current = ranking.find(&id).and_then(|c| c.parent().cloned());
        out.push(id);
    }
    out
}

/// Whether the order of a ranking reads the selection
fn depends_on_selection(ranking: &Ranking) -> bool {
    let is_selection = |id: &ColumnId| matches!(ranking.find(id).map(Column::kind), Some(ColumnKind::Selection(_)));
    ranking.sort_criteria().iter().any(|c| is_selection(&c.column))
        || ranking.group_criteria().iter().any(is_selection)
        || ranking
            .flat_columns()
            .into_iter()
            .any(|c| matches!(c.kind(), ColumnKind::Selection(_)) && c.is_filtered())
}

/// Fill in what a descriptor leaves to the data
fn prepare_desc(mut desc: ColumnDesc, rows: &[Value], settings: &ProviderSettings) -> ColumnDesc {
    if desc.width.is_none() {
        desc.width = Some(settings.default_width);
    }
    if desc.column.is_empty() {
        return desc;
    }
    let nulls = &settings.nulls;
    let cells = || rows.iter().map(|row| value::resolve(row, &desc.column));

    match desc.kind.as_str() {
        "number" | "boxplot" | "numbers" if desc.domain.is_none() && desc.map.is_none() => {
            let (min, max) = cells()
                .flat_map(|cell| match cell {
                    Some(Value::Array(_)) | Some(Value::Object(_)) => value::as_numbers(cell, nulls),
                    _ => vec![value::as_number(cell, nulls)],
                })
                .filter(|v| !v.is_nan())
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
            if min <= max {
                let (min, max) = if min < max { (min, max) } else { (min - 0.5, max + 0.5) };
                desc.domain = Some([min, max]);
            }
        }
        "categorical" | "ordinal" | "categoricals" if desc.categories.is_none() => {
            let mut seen = AHashSet::new();
            let mut names: Vec<String> = cells()
                .flat_map(|cell| match cell {
                    Some(Value::Array(_)) => value::as_texts(cell, nulls),
                    _ => vec![value::as_text(cell, nulls)],
                })
                .flatten()
                .filter(|name| seen.insert(name.clone()))
                .collect();
            if !names.is_empty() {
                names.sort();
                desc.categories = Some(names.into_iter().map(CategoryDesc::Name).collect());
            }
        }
        _ => {}
    }
    desc
}
