//! Durable counter store seam
//!
//! The relational side of the pipeline: the authoritative record that owns
//! the mirrored view-count field. The sync worker only needs to know whether
//! a record still exists and to write a batch of counters atomically.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use viewsync_common::{EntityId, Error, Result};

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Whether a durable record owns the counter for `id`
    async fn owner_exists(&self, id: EntityId) -> Result<bool>;

    /// Write all counters in one all-or-nothing operation.
    ///
    /// Each record ends up with `max(durable, value)` so a cache that
    /// restarted below the synced count cannot regress it. A missing record
    /// aborts the whole batch with [`Error::NotFound`]. Returns the number
    /// of records written.
    async fn batch_update_counters(&self, updates: &[(EntityId, u64)]) -> Result<usize>;
}

/// Durable store kept in memory, for tests and local experiments.
///
/// Commits can be made to fail or to stall so callers can exercise their
/// error and timeout paths.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    rows: Mutex<BTreeMap<EntityId, u64>>,
    fail_commits: AtomicBool,
    commit_delay: Mutex<Option<Duration>>,
}

impl InMemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or overwrite) the record for `id`
    pub fn insert(&self, id: EntityId, views: u64) {
        self.rows.lock().insert(id, views);
    }

    pub fn delete(&self, id: EntityId) {
        self.rows.lock().remove(&id);
    }

    /// Durable view count of `id`
    #[must_use]
    pub fn views(&self, id: EntityId) -> Option<u64> {
        self.rows.lock().get(&id).copied()
    }

    /// Make every subsequent commit fail until reset
    pub fn set_failing(&self, failing: bool) {
        self.fail_commits.store(failing, Ordering::SeqCst);
    }

    /// Stall every subsequent commit by `delay` before applying it
    pub fn set_commit_delay(&self, delay: Option<Duration>) {
        *self.commit_delay.lock() = delay;
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn owner_exists(&self, id: EntityId) -> Result<bool> {
        Ok(self.rows.lock().contains_key(&id))
    }

    async fn batch_update_counters(&self, updates: &[(EntityId, u64)]) -> Result<usize> {
        let delay = *self.commit_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(Error::store("commit rejected"));
        }

        let mut rows = self.rows.lock();
        if let Some((missing, _)) = updates.iter().find(|(id, _)| !rows.contains_key(id)) {
            return Err(Error::NotFound(*missing));
        }
        for (id, value) in updates {
            if let Some(views) = rows.get_mut(id) {
                *views = (*views).max(*value);
            }
        }
        Ok(updates.len())
    }
}
