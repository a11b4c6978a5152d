//! Sort backends
//!
//! A backend turns a [`SortSnapshot`] into ordered groups. It may finish on
//! the first poll (local), on a blocking worker thread, or after an
//! arbitrary delay standing in for an out-of-process computation. The
//! provider treats all of them the same way.

use std::time::Duration;

use async_trait::async_trait;
use rk_model::{sort_and_group, OrderedGroup, SortSnapshot};

use crate::Result;

#[async_trait]
pub trait SortBackend: Send + Sync {
    /// Order the rows described by the snapshot
    async fn sort(&self, snapshot: SortSnapshot) -> Result<Vec<OrderedGroup>>;

    /// Backend name, used in logs
    fn name(&self) -> &str;
}

/// Sorts inline; the future is ready on its first poll
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSortBackend;

#[async_trait]
impl SortBackend for LocalSortBackend {
    async fn sort(&self, snapshot: SortSnapshot) -> Result<Vec<OrderedGroup>> {
        Ok(sort_and_group(&snapshot))
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// Sorts on tokio's blocking pool, keeping large tables off the control
/// thread
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockingSortBackend;

#[async_trait]
impl SortBackend for BlockingSortBackend {
    async fn sort(&self, snapshot: SortSnapshot) -> Result<Vec<OrderedGroup>> {
        let groups = tokio::task::spawn_blocking(move || sort_and_group(&snapshot)).await?;
        Ok(groups)
    }

    fn name(&self) -> &str {
        "blocking"
    }
}

/// Sorts after a fixed delay, like a remote service would
#[derive(Debug, Clone, Copy)]
pub struct DelayedSortBackend {
    delay: Duration,
}

impl DelayedSortBackend {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl SortBackend for DelayedSortBackend {
    async fn sort(&self, snapshot: SortSnapshot) -> Result<Vec<OrderedGroup>> {
        tokio::time::sleep(self.delay).await;
        Ok(sort_and_group(&snapshot))
    }

    fn name(&self) -> &str {
        "delayed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rk_core::{RankingId, SelectionState};
    use rk_data::NullConfig;
    use serde_json::json;
    use std::sync::Arc;

    fn snapshot() -> SortSnapshot {
        SortSnapshot {
            ranking: RankingId::from("rank0"),
            generation: 1,
            rows: Arc::new(vec![json!({}), json!({})]),
            filters: Vec::new(),
            sort_criteria: Vec::new(),
            group_criteria: Vec::new(),
            selection: SelectionState::default(),
            nulls: NullConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_backends_agree() {
        let local = LocalSortBackend.sort(snapshot()).await.unwrap();
        let blocking = BlockingSortBackend.sort(snapshot()).await.unwrap();
        assert_eq!(local, blocking);
        assert_eq!(local[0].order, vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_backend_waits() {
        let backend = DelayedSortBackend::new(Duration::from_millis(200));
        let start = tokio::time::Instant::now();
        backend.sort(snapshot()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
