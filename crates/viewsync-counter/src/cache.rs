//! Counter cache
//!
//! Holds the live view count per entity. Counts only ever go up; the cache
//! is volatile, so a restart (or idle expiry) loses entries that have not
//! been synced yet. Callers must treat every operation as best-effort: an
//! increment issued while the cache is unreachable is dropped.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use viewsync_common::{EntityId, Result};

/// Fast, possibly volatile `EntityId -> u64` counter store
#[async_trait]
pub trait CounterCache: Send + Sync {
    /// Atomically add 1 and return the post-increment value
    async fn increment(&self, id: EntityId) -> Result<u64>;

    /// Current value, or `None` when the cache holds no entry for `id`
    async fn peek(&self, id: EntityId) -> Result<Option<u64>>;

    /// Set the entry to `value` only if none exists
    async fn seed(&self, id: EntityId, value: u64) -> Result<()>;

    /// Current value; unknown ids read as 0
    async fn read(&self, id: EntityId) -> Result<u64> {
        Ok(self.peek(id).await?.unwrap_or(0))
    }

    /// Drop entries past their lifetime, returning how many were removed
    async fn purge_expired(&self) -> usize {
        0
    }
}

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    value: u64,
    touched: Instant,
}

/// In-process counter cache backed by a sharded concurrent map.
///
/// Increments take the shard write lock for the key, so concurrent callers
/// on the same id never lose updates.
pub struct MemoryCounterCache {
    entries: DashMap<EntityId, CounterEntry>,
    /// Entries untouched for longer than this read as unknown
    idle_ttl: Option<Duration>,
}

impl MemoryCounterCache {
    /// Create a cache whose entries never expire
    #[must_use]
    pub fn new() -> Self {
        Self::with_idle_ttl(None)
    }

    /// Create a cache that forgets entries idle for longer than `idle_ttl`
    #[must_use]
    pub fn with_idle_ttl(idle_ttl: Option<Duration>) -> Self {
        match idle_ttl {
            Some(ttl) => info!("Counter cache initialized with idle TTL {:?}", ttl),
            None => info!("Counter cache initialized without expiry"),
        }
        Self {
            entries: DashMap::new(),
            idle_ttl,
        }
    }

    /// Number of entries currently held, expired or not
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every entry, as a cache restart would
    pub fn clear(&self) {
        self.entries.clear();
    }

    fn is_expired(&self, entry: &CounterEntry, now: Instant) -> bool {
        self.idle_ttl
            .is_some_and(|ttl| now.saturating_duration_since(entry.touched) > ttl)
    }
}

impl Default for MemoryCounterCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterCache for MemoryCounterCache {
    async fn increment(&self, id: EntityId) -> Result<u64> {
        let now = Instant::now();
        let mut entry = self.entries.entry(id).or_insert(CounterEntry {
            value: 0,
            touched: now,
        });
        if self.is_expired(&entry, now) {
            entry.value = 0;
        }
        entry.value = entry.value.saturating_add(1);
        entry.touched = now;
        Ok(entry.value)
    }

    async fn peek(&self, id: EntityId) -> Result<Option<u64>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(&id)
            .and_then(|entry| (!self.is_expired(&entry, now)).then_some(entry.value)))
    }

    async fn seed(&self, id: EntityId, value: u64) -> Result<()> {
        let now = Instant::now();
        let fresh = CounterEntry {
            value,
            touched: now,
        };
        match self.entries.entry(id) {
            Entry::Occupied(mut occupied) => {
                if self.is_expired(occupied.get(), now) {
                    occupied.insert(fresh);
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
            }
        }
        Ok(())
    }

    async fn purge_expired(&self) -> usize {
        if self.idle_ttl.is_none() {
            return 0;
        }
        let now = Instant::now();
        let mut purged = 0usize;
        self.entries.retain(|_, entry| {
            let keep = !self.is_expired(entry, now);
            if !keep {
                purged += 1;
            }
            keep
        });
        if purged > 0 {
            debug!("Purged {} expired counter entries", purged);
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_increment_returns_post_increment_value() {
        let cache = MemoryCounterCache::new();
        let id = EntityId::new(42);

        assert_eq!(cache.increment(id).await.unwrap(), 1);
        assert_eq!(cache.increment(id).await.unwrap(), 2);
        assert_eq!(cache.increment(id).await.unwrap(), 3);
        assert_eq!(cache.read(id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_unknown_id_reads_zero() {
        let cache = MemoryCounterCache::new();
        let id = EntityId::new(1);

        assert_eq!(cache.read(id).await.unwrap(), 0);
        assert_eq!(cache.peek(id).await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_lose_nothing() {
        let cache = Arc::new(MemoryCounterCache::new());
        let id = EntityId::new(7);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                for _ in 0..500 {
                    cache.increment(id).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.read(id).await.unwrap(), 4000);
    }

    #[tokio::test]
    async fn test_seed_only_fills_missing_entries() {
        let cache = MemoryCounterCache::new();
        let id = EntityId::new(3);

        cache.seed(id, 10).await.unwrap();
        assert_eq!(cache.peek(id).await.unwrap(), Some(10));

        cache.increment(id).await.unwrap();
        cache.seed(id, 2).await.unwrap();
        assert_eq!(cache.read(id).await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_clear_forgets_entries() {
        let cache = MemoryCounterCache::new();
        cache.increment(EntityId::new(1)).await.unwrap();
        cache.increment(EntityId::new(2)).await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert_eq!(cache.peek(EntityId::new(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_idle_entries_expire() {
        let cache = MemoryCounterCache::with_idle_ttl(Some(Duration::from_millis(20)));
        let stale = EntityId::new(1);
        let fresh = EntityId::new(2);

        cache.increment(stale).await.unwrap();
        cache.increment(stale).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.increment(fresh).await.unwrap();

        assert_eq!(cache.peek(stale).await.unwrap(), None);
        assert_eq!(cache.peek(fresh).await.unwrap(), Some(1));
        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len(), 1);

        // An expired entry restarts from zero rather than resuming.
        assert_eq!(cache.increment(stale).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_without_ttl_is_noop() {
        let cache = MemoryCounterCache::new();
        cache.increment(EntityId::new(1)).await.unwrap();
        assert_eq!(cache.purge_expired().await, 0);
        assert_eq!(cache.len(), 1);
    }
}
