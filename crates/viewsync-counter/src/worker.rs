//! Background sync worker: periodically drains the pending index and writes
//! the live counters into the durable store as one batch.
//!
//! A cycle moves `Idle -> Draining -> Flushing -> Idle`. Only one cycle runs
//! at a time; a trigger that finds a cycle in progress returns
//! [`CycleOutcome::Skipped`] instead of queueing. Markers are removed only
//! after the batch committed, and only the marker instances the cycle's own
//! snapshot contained, so anything re-marked mid-cycle stays pending.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use viewsync_common::config::SyncConfig;
use viewsync_common::{EntityId, Error};

use crate::cache::CounterCache;
use crate::metrics::sync_metrics;
use crate::pending::{PendingIndex, PendingSnapshot};
use crate::store::CounterStore;

/// Worker state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SyncState {
    Idle = 0,
    Draining = 1,
    Flushing = 2,
}

impl From<u8> for SyncState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Draining,
            2 => Self::Flushing,
            _ => Self::Idle,
        }
    }
}

/// What one call to [`SyncWorker::run_cycle`] did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Another cycle was still running
    Skipped,
    /// Nothing was pending
    Empty,
    /// The batch committed and the snapshot was removed from the index
    Flushed {
        written: usize,
        dropped: usize,
        removed: usize,
    },
    /// The cycle aborted; every snapshotted marker is still pending
    Failed { pending: usize, reason: String },
}

/// Sync worker tuning
#[derive(Debug, Clone)]
pub struct SyncWorkerConfig {
    /// Upper bound on the flushing phase: owner lookups plus the batch commit
    pub commit_timeout: Duration,
    /// Consecutive failed cycles before escalating (0 = never)
    pub alert_after_failures: u32,
}

impl Default for SyncWorkerConfig {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncWorkerConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            commit_timeout: config.commit_timeout(),
            alert_after_failures: config.alert_after_failures,
        }
    }
}

/// Returns the worker to `Idle` however the cycle ends, including when the
/// cycle future is dropped mid-flush.
struct CycleGuard<'a> {
    state: &'a AtomicU8,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.state.store(SyncState::Idle as u8, Ordering::Release);
    }
}

pub struct SyncWorker {
    cache: Arc<dyn CounterCache>,
    index: Arc<dyn PendingIndex>,
    store: Arc<dyn CounterStore>,
    config: SyncWorkerConfig,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
}

impl SyncWorker {
    pub fn new(
        cache: Arc<dyn CounterCache>,
        index: Arc<dyn PendingIndex>,
        store: Arc<dyn CounterStore>,
        config: SyncWorkerConfig,
    ) -> Self {
        Self {
            cache,
            index,
            store,
            config,
            state: AtomicU8::new(SyncState::Idle as u8),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn state(&self) -> SyncState {
        SyncState::from(self.state.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Run one sync cycle, or skip it if a cycle is already in progress
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(_guard) = self.try_begin() else {
            debug!("Sync cycle already in progress, skipping");
            sync_metrics().record_skipped_cycle();
            return CycleOutcome::Skipped;
        };

        let start = Instant::now();
        let outcome = self.drain_and_flush().await;
        self.record_outcome(&outcome, start.elapsed());

        let purged = self.cache.purge_expired().await;
        if purged > 0 {
            debug!("Sync cycle purged {} expired counters", purged);
        }

        outcome
    }

    fn try_begin(&self) -> Option<CycleGuard<'_>> {
        self.state
            .compare_exchange(
                SyncState::Idle as u8,
                SyncState::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| CycleGuard { state: &self.state })
    }

    async fn drain_and_flush(&self) -> CycleOutcome {
        // Draining
        let snapshot = match self.index.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Sync cycle aborted, pending index unavailable: {}", e);
                return CycleOutcome::Failed {
                    pending: 0,
                    reason: e.to_string(),
                };
            }
        };
        if snapshot.is_empty() {
            debug!("No pending counters to sync");
            return CycleOutcome::Empty;
        }

        // Flushing: owner lookups and the commit share one deadline
        self.state.store(SyncState::Flushing as u8, Ordering::Release);
        let flush = self.collect_and_commit(&snapshot);
        let flushed = tokio::time::timeout(self.config.commit_timeout, flush).await;
        let (written, dropped) = match flushed {
            Ok(Ok(flushed)) => flushed,
            Ok(Err(e)) => {
                warn!(
                    "Sync of {} pending counters failed, retrying next cycle: {}",
                    snapshot.len(),
                    e
                );
                return Self::failed(&snapshot, &e);
            }
            Err(_) => {
                let e = Error::Timeout {
                    elapsed_ms: u64::try_from(self.config.commit_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                };
                warn!(
                    "Sync of {} pending counters timed out, retrying next cycle",
                    snapshot.len()
                );
                return Self::failed(&snapshot, &e);
            }
        };

        let removed = match self.index.remove(snapshot.markers()).await {
            Ok(removed) => removed,
            Err(e) => {
                // The values are durable already; the next cycle rewrites them.
                warn!(
                    "Committed {} counters but could not clear pending markers: {}",
                    written, e
                );
                0
            }
        };

        info!(
            "Synced {} counters ({} dropped, {} markers cleared)",
            written, dropped, removed
        );
        CycleOutcome::Flushed {
            written,
            dropped,
            removed,
        }
    }

    /// Returns `(written, dropped)`
    async fn collect_and_commit(
        &self,
        snapshot: &PendingSnapshot,
    ) -> viewsync_common::Result<(usize, usize)> {
        let (batch, dropped) = self.collect_batch(snapshot).await?;
        if batch.is_empty() {
            return Ok((0, dropped));
        }
        let written = self.store.batch_update_counters(&batch).await?;
        Ok((written, dropped))
    }

    /// Read the live value of every snapshotted id.
    ///
    /// Ids without a cache entry or without a durable owner have nothing to
    /// sync; they are counted as dropped and still cleared with the snapshot.
    async fn collect_batch(
        &self,
        snapshot: &PendingSnapshot,
    ) -> viewsync_common::Result<(Vec<(EntityId, u64)>, usize)> {
        let mut batch = Vec::with_capacity(snapshot.len());
        let mut dropped = 0;

        for id in snapshot.ids() {
            let Some(views) = self.cache.peek(id).await? else {
                debug!("No cached counter for {}, dropping marker", id);
                dropped += 1;
                continue;
            };
            if !self.store.owner_exists(id).await? {
                debug!("Entity {} no longer exists, dropping marker", id);
                dropped += 1;
                continue;
            }
            batch.push((id, views));
        }

        Ok((batch, dropped))
    }

    fn failed(snapshot: &PendingSnapshot, error: &Error) -> CycleOutcome {
        CycleOutcome::Failed {
            pending: snapshot.len(),
            reason: error.to_string(),
        }
    }

    fn record_outcome(&self, outcome: &CycleOutcome, elapsed: Duration) {
        let metrics = sync_metrics();
        match outcome {
            CycleOutcome::Skipped => {}
            CycleOutcome::Failed { .. } => {
                metrics.record_failed_cycle(elapsed);
                let streak = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                metrics.set_consecutive_failures(streak);
                let threshold = self.config.alert_after_failures;
                if threshold > 0 && streak == threshold {
                    error!(
                        "Sync worker failed {} consecutive cycles; durable view counts are not advancing",
                        streak
                    );
                    metrics.record_escalation();
                }
            }
            CycleOutcome::Empty => {
                metrics.record_empty_cycle(elapsed);
                self.reset_failures();
            }
            CycleOutcome::Flushed {
                written, dropped, ..
            } => {
                metrics.record_flushed_cycle(*written, *dropped, elapsed);
                self.reset_failures();
            }
        }
    }

    fn reset_failures(&self) {
        let streak = self.consecutive_failures.swap(0, Ordering::Relaxed);
        if streak > 0 {
            info!("Sync worker recovered after {} failed cycles", streak);
        }
        sync_metrics().set_consecutive_failures(0);
    }
}

/// Long-running background task: run a sync cycle every `interval` until
/// `shutdown` flips to true.
pub async fn sync_loop(
    worker: Arc<SyncWorker>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; start counting from now.
    ticker.tick().await;

    info!("Sync worker started, interval {:?}", interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let outcome = worker.run_cycle().await;
                debug!(?outcome, "Sync cycle finished");
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("Sync worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCounterCache;
    use crate::pending::{MemoryPendingIndex, PendingMarker};
    use crate::recorder::ViewRecorder;
    use crate::store::InMemoryCounterStore;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use viewsync_common::Result;

    struct Harness {
        cache: Arc<MemoryCounterCache>,
        index: Arc<MemoryPendingIndex>,
        store: Arc<InMemoryCounterStore>,
        recorder: ViewRecorder,
        worker: Arc<SyncWorker>,
    }

    fn harness() -> Harness {
        harness_with(SyncWorkerConfig::default())
    }

    fn harness_with(config: SyncWorkerConfig) -> Harness {
        let cache = Arc::new(MemoryCounterCache::new());
        let index = Arc::new(MemoryPendingIndex::new());
        let store = Arc::new(InMemoryCounterStore::new());
        let recorder = ViewRecorder::new(cache.clone(), index.clone());
        let worker = Arc::new(SyncWorker::new(
            cache.clone(),
            index.clone(),
            store.clone(),
            config,
        ));
        Harness {
            cache,
            index,
            store,
            recorder,
            worker,
        }
    }

    async fn pending_ids(index: &MemoryPendingIndex) -> BTreeSet<EntityId> {
        index.snapshot().await.unwrap().ids().collect()
    }

    #[tokio::test]
    async fn test_empty_index_is_empty_cycle() {
        let h = harness();
        assert_eq!(h.worker.run_cycle().await, CycleOutcome::Empty);
        assert_eq!(h.worker.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_three_views_sync_to_durable() {
        let h = harness();
        let id = EntityId::new(42);
        h.store.insert(id, 0);

        for _ in 0..3 {
            h.recorder.record_view(id, 0).await;
        }
        assert_eq!(h.cache.read(id).await.unwrap(), 3);

        let outcome = h.worker.run_cycle().await;

        assert_eq!(
            outcome,
            CycleOutcome::Flushed {
                written: 1,
                dropped: 0,
                removed: 1
            }
        );
        assert_eq!(h.store.views(id), Some(3));
        assert!(!pending_ids(&h.index).await.contains(&id));
        assert_eq!(h.worker.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_pending_set() {
        let h = harness();
        let id = EntityId::new(7);
        h.store.insert(id, 0);
        h.recorder.record_view(id, 0).await;

        let before = h.index.snapshot().await.unwrap();
        h.store.set_failing(true);
        let outcome = h.worker.run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Failed { pending: 1, .. }));
        assert_eq!(h.index.snapshot().await.unwrap(), before);
        assert_eq!(h.store.views(id), Some(0));
        assert_eq!(h.worker.consecutive_failures(), 1);

        // The next healthy cycle picks the marker up again.
        h.store.set_failing(false);
        assert!(matches!(
            h.worker.run_cycle().await,
            CycleOutcome::Flushed { written: 1, .. }
        ));
        assert_eq!(h.store.views(id), Some(1));
        assert_eq!(h.worker.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_unknown_cache_entry_is_dropped_without_write() {
        let h = harness();
        let id = EntityId::new(13);
        h.store.insert(id, 9);
        h.recorder.record_view(id, 9).await;

        // Cache restart: the marker survives but the counter does not.
        h.cache.clear();
        let outcome = h.worker.run_cycle().await;

        assert_eq!(
            outcome,
            CycleOutcome::Flushed {
                written: 0,
                dropped: 1,
                removed: 1
            }
        );
        assert_eq!(h.store.views(id), Some(9));
        assert_eq!(h.index.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_deleted_owner_is_dropped() {
        let h = harness();
        let kept = EntityId::new(1);
        let deleted = EntityId::new(2);
        h.store.insert(kept, 0);
        h.store.insert(deleted, 0);
        h.recorder.record_view(kept, 0).await;
        h.recorder.record_view(deleted, 0).await;
        h.store.delete(deleted);

        let outcome = h.worker.run_cycle().await;

        assert_eq!(
            outcome,
            CycleOutcome::Flushed {
                written: 1,
                dropped: 1,
                removed: 2
            }
        );
        assert_eq!(h.store.views(kept), Some(1));
    }

    #[tokio::test]
    async fn test_durable_count_is_never_regressed() {
        let h = harness();
        let id = EntityId::new(21);
        h.store.insert(id, 500);

        // A cache that lost its state and was not seeded from durable.
        h.cache.increment(id).await.unwrap();
        h.index.mark_pending(id, 1).await.unwrap();
        h.worker.run_cycle().await;

        assert_eq!(h.store.views(id), Some(500));
    }

    #[tokio::test]
    async fn test_markers_added_during_cycle_survive() {
        let h = harness();
        for id in [1, 2] {
            h.store.insert(EntityId::new(id), 0);
            h.recorder.record_view(EntityId::new(id), 0).await;
        }
        h.store.insert(EntityId::new(3), 0);

        struct MarkDuringCommit {
            inner: Arc<InMemoryCounterStore>,
            recorder: ViewRecorder,
        }

        #[async_trait]
        impl CounterStore for MarkDuringCommit {
            async fn owner_exists(&self, id: EntityId) -> Result<bool> {
                self.inner.owner_exists(id).await
            }

            async fn batch_update_counters(&self, updates: &[(EntityId, u64)]) -> Result<usize> {
                // New and re-marked entities arrive while the batch commits.
                self.recorder.record_view(EntityId::new(3), 0).await;
                self.recorder.record_view(EntityId::new(2), 0).await;
                self.inner.batch_update_counters(updates).await
            }
        }

        let worker = SyncWorker::new(
            h.cache.clone(),
            h.index.clone(),
            Arc::new(MarkDuringCommit {
                inner: h.store.clone(),
                recorder: h.recorder.clone(),
            }),
            SyncWorkerConfig::default(),
        );

        let pre = pending_ids(&h.index).await;
        worker.run_cycle().await;

        // post = (pre \ snapshot) ∪ added-during-cycle; the snapshot covered all of pre
        let added: BTreeSet<EntityId> = [EntityId::new(2), EntityId::new(3)].into();
        assert_eq!(pre, BTreeSet::from([EntityId::new(1), EntityId::new(2)]));
        assert_eq!(pending_ids(&h.index).await, added);
        assert_eq!(h.store.views(EntityId::new(1)), Some(1));
    }

    #[tokio::test]
    async fn test_remark_during_flush_stays_pending() {
        let h = harness();
        let id = EntityId::new(5);
        h.store.insert(id, 0);
        h.recorder.record_view(id, 0).await;

        struct ReadDuringCommit {
            inner: Arc<InMemoryCounterStore>,
            recorder: ViewRecorder,
        }

        #[async_trait]
        impl CounterStore for ReadDuringCommit {
            async fn owner_exists(&self, id: EntityId) -> Result<bool> {
                self.inner.owner_exists(id).await
            }

            async fn batch_update_counters(&self, updates: &[(EntityId, u64)]) -> Result<usize> {
                self.recorder.record_view(EntityId::new(5), 0).await;
                self.inner.batch_update_counters(updates).await
            }
        }

        let worker = SyncWorker::new(
            h.cache.clone(),
            h.index.clone(),
            Arc::new(ReadDuringCommit {
                inner: h.store.clone(),
                recorder: h.recorder.clone(),
            }),
            SyncWorkerConfig::default(),
        );

        let outcome = worker.run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Flushed { removed: 0, .. }));
        assert!(pending_ids(&h.index).await.contains(&id));
        assert_eq!(h.store.views(id), Some(1));
        assert_eq!(h.cache.read(id).await.unwrap(), 2);

        // The late increment reaches the durable record on the next cycle.
        h.worker.run_cycle().await;
        assert_eq!(h.store.views(id), Some(2));
        assert_eq!(h.index.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_overlapping_cycle_is_skipped() {
        let h = harness();
        let id = EntityId::new(1);
        h.store.insert(id, 0);
        h.recorder.record_view(id, 0).await;
        h.store.set_commit_delay(Some(Duration::from_millis(200)));

        let worker = h.worker.clone();
        let first = tokio::spawn(async move { worker.run_cycle().await });
        // Let the first cycle reach the stalled commit.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.worker.state(), SyncState::Flushing);

        assert_eq!(h.worker.run_cycle().await, CycleOutcome::Skipped);
        assert!(matches!(
            first.await.unwrap(),
            CycleOutcome::Flushed { written: 1, .. }
        ));
        assert_eq!(h.worker.state(), SyncState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_timeout_aborts_cycle() {
        let h = harness_with(SyncWorkerConfig {
            commit_timeout: Duration::from_secs(1),
            alert_after_failures: 0,
        });
        let id = EntityId::new(99);
        h.store.insert(id, 0);
        h.recorder.record_view(id, 0).await;
        h.store.set_commit_delay(Some(Duration::from_secs(10)));

        let outcome = h.worker.run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Failed { pending: 1, .. }));
        assert_eq!(h.store.views(id), Some(0));
        assert_eq!(h.index.len().await.unwrap(), 1);
        assert_eq!(h.worker.state(), SyncState::Idle);

        h.store.set_commit_delay(None);
        assert!(matches!(
            h.worker.run_cycle().await,
            CycleOutcome::Flushed { written: 1, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_owner_lookup_times_out() {
        struct StalledLookups(Arc<InMemoryCounterStore>);

        #[async_trait]
        impl CounterStore for StalledLookups {
            async fn owner_exists(&self, _id: EntityId) -> Result<bool> {
                std::future::pending().await
            }

            async fn batch_update_counters(&self, updates: &[(EntityId, u64)]) -> Result<usize> {
                self.0.batch_update_counters(updates).await
            }
        }

        let h = harness();
        let id = EntityId::new(31);
        h.store.insert(id, 0);
        h.recorder.record_view(id, 0).await;
        let worker = SyncWorker::new(
            h.cache.clone(),
            h.index.clone(),
            Arc::new(StalledLookups(h.store.clone())),
            SyncWorkerConfig {
                commit_timeout: Duration::from_secs(1),
                alert_after_failures: 0,
            },
        );

        let outcome = tokio::time::timeout(Duration::from_secs(3600), worker.run_cycle())
            .await
            .expect("cycle must end within its deadline");

        assert!(matches!(
            outcome,
            CycleOutcome::Failed { pending: 1, ref reason } if reason.contains("timed out")
        ));
        assert_eq!(worker.state(), SyncState::Idle);
        assert_eq!(h.index.len().await.unwrap(), 1);
        assert_eq!(h.store.views(id), Some(0));

        // The next trigger runs a fresh cycle instead of being skipped.
        assert!(matches!(
            worker.run_cycle().await,
            CycleOutcome::Failed { pending: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_cache_outage_aborts_without_removal() {
        struct DownCache;

        #[async_trait]
        impl CounterCache for DownCache {
            async fn increment(&self, _id: EntityId) -> Result<u64> {
                Err(Error::cache("down"))
            }

            async fn peek(&self, _id: EntityId) -> Result<Option<u64>> {
                Err(Error::cache("down"))
            }

            async fn seed(&self, _id: EntityId, _value: u64) -> Result<()> {
                Err(Error::cache("down"))
            }
        }

        let index = Arc::new(MemoryPendingIndex::new());
        let store = Arc::new(InMemoryCounterStore::new());
        index.mark_pending(EntityId::new(1), 10).await.unwrap();
        store.insert(EntityId::new(1), 0);
        let worker = SyncWorker::new(
            Arc::new(DownCache),
            index.clone(),
            store,
            SyncWorkerConfig::default(),
        );

        assert!(matches!(
            worker.run_cycle().await,
            CycleOutcome::Failed { pending: 1, .. }
        ));
        assert_eq!(index.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failure_streak_resets_after_success() {
        let h = harness_with(SyncWorkerConfig {
            commit_timeout: Duration::from_secs(5),
            alert_after_failures: 2,
        });
        let id = EntityId::new(8);
        h.store.insert(id, 0);
        h.recorder.record_view(id, 0).await;
        h.store.set_failing(true);

        for expected in 1..=3 {
            h.worker.run_cycle().await;
            assert_eq!(h.worker.consecutive_failures(), expected);
        }

        h.store.set_failing(false);
        h.worker.run_cycle().await;
        assert_eq!(h.worker.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_remove_failure_after_commit_is_tolerated() {
        struct StickyIndex(MemoryPendingIndex);

        #[async_trait]
        impl PendingIndex for StickyIndex {
            async fn mark_pending(&self, id: EntityId, touched_at: i64) -> Result<()> {
                self.0.mark_pending(id, touched_at).await
            }

            async fn snapshot(&self) -> Result<PendingSnapshot> {
                self.0.snapshot().await
            }

            async fn remove(&self, _markers: &[PendingMarker]) -> Result<usize> {
                Err(Error::index("read-only replica"))
            }

            async fn score(&self, id: EntityId) -> Result<Option<i64>> {
                self.0.score(id).await
            }

            async fn len(&self) -> Result<usize> {
                self.0.len().await
            }
        }

        let cache = Arc::new(MemoryCounterCache::new());
        let index = Arc::new(StickyIndex(MemoryPendingIndex::new()));
        let store = Arc::new(InMemoryCounterStore::new());
        let id = EntityId::new(4);
        store.insert(id, 0);
        ViewRecorder::new(cache.clone(), index.clone())
            .record_view(id, 0)
            .await;

        let worker = SyncWorker::new(
            cache,
            index.clone(),
            store.clone(),
            SyncWorkerConfig::default(),
        );

        assert_eq!(
            worker.run_cycle().await,
            CycleOutcome::Flushed {
                written: 1,
                dropped: 0,
                removed: 0
            }
        );
        assert_eq!(store.views(id), Some(1));
        assert_eq!(index.len().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_loop_runs_on_interval_until_shutdown() {
        let h = harness();
        let id = EntityId::new(42);
        h.store.insert(id, 0);
        for _ in 0..3 {
            h.recorder.record_view(id, 0).await;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(sync_loop(
            h.worker.clone(),
            Duration::from_secs(60),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.store.views(id), Some(0));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(h.store.views(id), Some(3));

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
