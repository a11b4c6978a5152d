//! Session dump and restore
//!
//! A dump carries the mutable state of every ranking plus the selection,
//! the collapsed groups and the id counter. Restoring degrades gracefully:
//! columns whose descriptor or type cannot be resolved are skipped with a
//! warning instead of failing the whole session.

use std::path::Path;

use ahash::AHashSet;
use rk_core::{ColumnId, ProviderEvent, ProviderEventKind, RankingId, UidGenerator};
use rk_model::{ColumnKind, ProviderDump, Ranking, RankingDump};

use crate::provider::DataProvider;
use crate::Result;

impl DataProvider {
    /// Snapshot of the session state
    pub fn dump(&self) -> ProviderDump {
        ProviderDump {
            uid: self.uid.value(),
            selection: self.sync.selection().rows(),
            aggregations: self.sync.aggregation().keys(),
            rankings: self.rankings.iter().map(Ranking::dump).collect(),
        }
    }

    pub fn dump_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.dump())?)
    }

    pub fn save_dump(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.dump_json()?)?;
        Ok(())
    }

    /// Replace every ranking and the shared state with a dump
    ///
    /// Restored rankings are dirty; their order is computed by the next
    /// `settle` or re-sort.
    pub fn restore(&mut self, dump: &ProviderDump) -> Result<()> {
        let existing: Vec<RankingId> = self.rankings.iter().map(|r| r.id().clone()).collect();
        for id in existing {
            self.remove_ranking(&id)?;
        }

        let floor = dump
            .rankings
            .iter()
            .filter_map(RankingDump::max_id_suffix)
            .max()
            .map_or(0, |max| max + 1);
        // every previous ranking is gone, so the counter restarts from the dump
        self.uid = UidGenerator::starting_at(dump.uid.max(floor));

        for ranking_dump in &dump.rankings {
            if self.rankings.iter().any(|r| r.id() == &ranking_dump.id) {
                tracing::warn!(ranking = %ranking_dump.id, "skipping duplicate ranking");
                continue;
            }
            let ranking = self.restore_ranking(ranking_dump);
            let end = self.rankings.len();
            if let Err(e) = self.insert_ranking(end, ranking) {
                tracing::warn!(ranking = %ranking_dump.id, "skipping ranking: {}", e);
            }
        }

        let rows = self.rows.len();
        self.sync
            .set_selection(dump.selection.iter().copied().filter(|&row| row < rows));
        let known: Vec<&RankingId> = self.rankings.iter().map(Ranking::id).collect();
        let aggregations: Vec<String> = dump
            .aggregations
            .iter()
            .filter(|key| {
                key.split_once('@')
                    .map_or(false, |(ranking, _)| known.iter().any(|id| id.as_str() == ranking))
            })
            .cloned()
            .collect();
        self.sync.restore_aggregations(aggregations);
        self.stats.clear();

        tracing::info!(rankings = self.rankings.len(), uid = self.uid.value(), "session restored");
        self.events.publish(ProviderEvent {
            kind: ProviderEventKind::Restored,
        });
        Ok(())
    }

    fn restore_ranking(&mut self, dump: &RankingDump) -> Ranking {
        let mut ranking = Ranking::new(
            dump.id.clone(),
            self.settings.max_sort_criteria,
            self.settings.max_group_criteria,
        );
        let mut taken: AHashSet<ColumnId> = self
            .rankings
            .iter()
            .flat_map(|r| r.flat_columns().into_iter().map(|c| c.id().clone()))
            .collect();
        for column_dump in &dump.columns {
            let resolve = |desc_ref: &str| self.resolve_desc(desc_ref);
            let Some(column) = self.factory.restore(column_dump, &resolve) else {
                tracing::warn!(ranking = %dump.id, column = %column_dump.id, desc = %column_dump.desc, "skipping column");
                continue;
            };
            let ids: Vec<ColumnId> = column.flatten().into_iter().map(|c| c.id().clone()).collect();
            if let Some(id) = ids.iter().find(|id| taken.contains(*id)) {
                tracing::warn!(ranking = %dump.id, column = %id, "skipping column with an id already in use");
                continue;
            }
            taken.extend(ids);
            if let Err(e) = ranking.push_column(column) {
                tracing::warn!(ranking = %dump.id, "skipping column {}: {}", column_dump.id, e);
            }
        }

        let has_rank = ranking.columns().iter().any(|c| matches!(c.kind(), ColumnKind::Rank));
        if !has_rank {
            if let Ok(rank) = self.create_column_for("rank") {
                tracing::debug!(ranking = %dump.id, column = %rank.id(), "inserting missing rank column");
                if let Err(e) = ranking.insert_column(0, rank) {
                    tracing::warn!(ranking = %dump.id, "cannot insert rank column: {}", e);
                }
            }
        }

        ranking.restore_criteria(dump);
        ranking
    }

    pub fn restore_json(&mut self, text: &str) -> Result<()> {
        let dump: ProviderDump = serde_json::from_str(text)?;
        self.restore(&dump)
    }

    pub fn load_dump(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        self.restore_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use crate::{DataProvider, ProviderSettings};
    use rk_data::schema::ColumnDesc;
    use serde_json::json;

    fn provider() -> DataProvider {
        let rows = vec![json!({"v": 1}), json!({"v": 2})];
        DataProvider::new(rows, vec![ColumnDesc::new("number", "v")], ProviderSettings::default())
    }

    #[test]
    fn test_uid_never_falls_below_restored_ids() {
        let mut source = provider();
        source.push_default_ranking().unwrap();
        let mut dump = source.dump();
        dump.uid = 0;

        let mut target = provider();
        target.restore(&dump).unwrap();
        assert_eq!(target.uid(), 3);
        let id = target.push_ranking().unwrap();
        assert_eq!(id.as_str(), "rank3");
    }

    #[test]
    fn test_selection_out_of_range_is_dropped() {
        let mut source = provider();
        source.push_default_ranking().unwrap();
        source.set_selection([1]);
        let mut dump = source.dump();
        dump.selection.push(9);

        let mut target = provider();
        target.restore(&dump).unwrap();
        assert_eq!(target.selection().rows(), vec![1]);
    }

    #[test]
    fn test_aggregations_of_unknown_rankings_are_dropped() {
        let mut source = provider();
        let id = source.push_default_ranking().unwrap();
        source.set_aggregated(&id, "Default", true).unwrap();
        let mut dump = source.dump();
        dump.aggregations.push("rank9@Default".to_string());

        let mut target = provider();
        target.restore(&dump).unwrap();
        assert!(target.is_aggregated(&id, "Default"));
        assert_eq!(target.aggregation().keys().len(), 1);
    }
}
