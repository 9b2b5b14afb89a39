//! Read-path integration
//!
//! Called from the content-read handler once the entity has been resolved.
//! Bumps the live counter and marks the entity pending. Nothing here can
//! fail the read: a cache fault falls back to the durable count, and a
//! failed mark only means the increment waits for the next mark of the same
//! entity before it is synced.

use std::sync::Arc;
use tracing::warn;
use viewsync_common::{EntityId, ViewCount, unix_millis};

use crate::cache::CounterCache;
use crate::metrics::sync_metrics;
use crate::pending::PendingIndex;

#[derive(Clone)]
pub struct ViewRecorder {
    cache: Arc<dyn CounterCache>,
    index: Arc<dyn PendingIndex>,
}

impl ViewRecorder {
    pub fn new(cache: Arc<dyn CounterCache>, index: Arc<dyn PendingIndex>) -> Self {
        Self { cache, index }
    }

    /// Record one read of `id` whose durable record currently holds
    /// `durable_views`.
    ///
    /// The returned count is the value produced by this call's own
    /// increment, so concurrent reads never observe each other's bumps
    /// through it.
    pub async fn record_view(&self, id: EntityId, durable_views: u64) -> ViewCount {
        // A cold cache resumes from the synced count instead of zero.
        if let Err(e) = self.cache.seed(id, durable_views).await {
            warn!(
                entity = %id,
                error = %e,
                "Counter cache unavailable, serving durable view count"
            );
            sync_metrics().record_cache_failure();
            return ViewCount::durable(durable_views);
        }

        let views = match self.cache.increment(id).await {
            Ok(views) => views,
            Err(e) => {
                warn!(
                    entity = %id,
                    error = %e,
                    "View increment dropped, serving durable view count"
                );
                sync_metrics().record_cache_failure();
                return ViewCount::durable(durable_views);
            }
        };

        if let Err(e) = self.index.mark_pending(id, unix_millis()).await {
            warn!(
                entity = %id,
                error = %e,
                "Failed to mark entity pending; increment waits for the next mark"
            );
            sync_metrics().record_index_failure();
        }

        sync_metrics().record_view();
        ViewCount::live(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCounterCache;
    use crate::pending::{MemoryPendingIndex, PendingMarker, PendingSnapshot};
    use async_trait::async_trait;
    use viewsync_common::{Error, Result};

    struct DownCache;

    #[async_trait]
    impl CounterCache for DownCache {
        async fn increment(&self, _id: EntityId) -> Result<u64> {
            Err(Error::cache("connection refused"))
        }

        async fn peek(&self, _id: EntityId) -> Result<Option<u64>> {
            Err(Error::cache("connection refused"))
        }

        async fn seed(&self, _id: EntityId, _value: u64) -> Result<()> {
            Err(Error::cache("connection refused"))
        }
    }

    struct DownIndex;

    #[async_trait]
    impl PendingIndex for DownIndex {
        async fn mark_pending(&self, _id: EntityId, _touched_at: i64) -> Result<()> {
            Err(Error::index("read-only"))
        }

        async fn snapshot(&self) -> Result<PendingSnapshot> {
            Err(Error::index("read-only"))
        }

        async fn remove(&self, _markers: &[PendingMarker]) -> Result<usize> {
            Err(Error::index("read-only"))
        }

        async fn score(&self, _id: EntityId) -> Result<Option<i64>> {
            Err(Error::index("read-only"))
        }

        async fn len(&self) -> Result<usize> {
            Err(Error::index("read-only"))
        }
    }

    #[tokio::test]
    async fn test_record_view_bumps_and_marks() {
        let cache = Arc::new(MemoryCounterCache::new());
        let index = Arc::new(MemoryPendingIndex::new());
        let recorder = ViewRecorder::new(cache.clone(), index.clone());
        let id = EntityId::new(42);

        for expected in 1..=3 {
            assert_eq!(recorder.record_view(id, 0).await, ViewCount::live(expected));
        }

        assert_eq!(cache.read(id).await.unwrap(), 3);
        assert_eq!(index.len().await.unwrap(), 1);
        assert!(index.score(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_record_view_resumes_from_durable_count() {
        let cache = Arc::new(MemoryCounterCache::new());
        let index = Arc::new(MemoryPendingIndex::new());
        let recorder = ViewRecorder::new(cache, index);

        assert_eq!(
            recorder.record_view(EntityId::new(8), 120).await,
            ViewCount::live(121)
        );
    }

    #[tokio::test]
    async fn test_cache_outage_serves_durable_count() {
        let index = Arc::new(MemoryPendingIndex::new());
        let recorder = ViewRecorder::new(Arc::new(DownCache), index.clone());

        let count = recorder.record_view(EntityId::new(3), 17).await;

        assert_eq!(count, ViewCount::durable(17));
        assert_eq!(index.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_index_outage_keeps_live_count() {
        let cache = Arc::new(MemoryCounterCache::new());
        let recorder = ViewRecorder::new(cache.clone(), Arc::new(DownIndex));
        let id = EntityId::new(4);

        assert_eq!(recorder.record_view(id, 0).await, ViewCount::live(1));
        assert_eq!(recorder.record_view(id, 0).await, ViewCount::live(2));
        assert_eq!(cache.read(id).await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reads_return_distinct_values() {
        let cache = Arc::new(MemoryCounterCache::new());
        let index = Arc::new(MemoryPendingIndex::new());
        let recorder = ViewRecorder::new(cache.clone(), index.clone());
        let id = EntityId::new(11);

        let mut handles = Vec::new();
        for _ in 0..50 {
            let recorder = recorder.clone();
            handles.push(tokio::spawn(async move { recorder.record_view(id, 0).await }));
        }
        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap().views);
        }
        seen.sort_unstable();

        assert_eq!(seen, (1..=50).collect::<Vec<u64>>());
        assert_eq!(index.len().await.unwrap(), 1);
    }
}
