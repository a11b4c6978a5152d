use std::time::Duration;

use indexmap::IndexSet;
use rk_core::RankingId;
use tokio::time::Instant;

/// Trailing-edge debouncer over dirty rankings
///
/// Every `mark` restarts the quiet window; `wait` sleeps until the window
/// has passed without new marks and hands out the dirty rankings once.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
    dirty: IndexSet<RankingId>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
            dirty: IndexSet::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn mark(&mut self, ranking: RankingId) {
        self.dirty.insert(ranking);
        self.deadline = Some(Instant::now() + self.delay);
    }

    pub fn is_dirty(&self, ranking: &RankingId) -> bool {
        self.dirty.contains(ranking)
    }

    pub fn is_idle(&self) -> bool {
        self.dirty.is_empty()
    }

    /// Drop a ranking, e.g. because it was removed
    pub fn forget(&mut self, ranking: &RankingId) {
        self.dirty.shift_remove(ranking);
        if self.dirty.is_empty() {
            self.deadline = None;
        }
    }

    /// Take the dirty rankings without waiting
    pub fn drain(&mut self) -> Vec<RankingId> {
        self.deadline = None;
        self.dirty.drain(..).collect()
    }

    /// Wait for the quiet window to pass, then take the dirty rankings
    pub async fn wait(&mut self) -> Vec<RankingId> {
        if let Some(deadline) = self.deadline {
            tokio::time::sleep_until(deadline).await;
        }
        self.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_marks_coalesce() {
        let mut debouncer = Debouncer::new(Duration::from_millis(50));
        let start = Instant::now();
        debouncer.mark(RankingId::from("rank0"));
        tokio::time::advance(Duration::from_millis(30)).await;
        debouncer.mark(RankingId::from("rank0"));
        debouncer.mark(RankingId::from("rank1"));

        let dirty = debouncer.wait().await;
        assert_eq!(dirty, vec![RankingId::from("rank0"), RankingId::from("rank1")]);
        // the window restarted with the second mark
        assert!(start.elapsed() >= Duration::from_millis(80));
        assert!(debouncer.is_idle());
        assert!(debouncer.wait().await.is_empty());
    }

    #[test]
    fn test_forget() {
        let mut debouncer = Debouncer::new(Duration::from_millis(10));
        debouncer.mark(RankingId::from("rank0"));
        debouncer.forget(&RankingId::from("rank0"));
        assert!(debouncer.is_idle());
    }
}
