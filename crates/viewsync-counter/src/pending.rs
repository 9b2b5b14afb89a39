//! Pending-sync index
//!
//! The set of entities whose durable view count may be stale. Marking is an
//! idempotent upsert: a re-mark refreshes the score and stamps a new
//! revision but never creates a second entry.
//!
//! Removal works on marker *instances*. The worker removes exactly the
//! markers it saw in its snapshot; an entity re-marked while the cycle was
//! flushing carries a newer revision, is not part of that snapshot, and
//! therefore stays pending for the next cycle. The score (unix millis of the
//! last mark) is informational and plays no part in removal.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use viewsync_common::{EntityId, Result};

/// One pending entity as observed at snapshot time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMarker {
    pub id: EntityId,
    /// Latest unix millis any mark carried
    pub touched_at: i64,
    /// Token identifying this marker instance; bumped on every mark
    pub revision: u64,
}

/// Point-in-time enumeration of the pending index, ordered by id.
///
/// One snapshot is the unit of work for one sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingSnapshot {
    markers: Vec<PendingMarker>,
}

impl PendingSnapshot {
    #[must_use]
    pub fn new(mut markers: Vec<PendingMarker>) -> Self {
        markers.sort_by_key(|m| m.id);
        Self { markers }
    }

    /// Ordered entity ids in this snapshot
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.markers.iter().map(|m| m.id)
    }

    #[must_use]
    pub fn markers(&self) -> &[PendingMarker] {
        &self.markers
    }

    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.markers.binary_search_by_key(&id, |m| m.id).is_ok()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

/// Ordered set of entity ids awaiting durable write-back
#[async_trait]
pub trait PendingIndex: Send + Sync {
    /// Upsert `id` with score `touched_at`.
    ///
    /// A mark carrying an older timestamp than the stored score keeps the
    /// stored score but still counts as a new marker instance.
    async fn mark_pending(&self, id: EntityId, touched_at: i64) -> Result<()>;

    /// Full current membership
    async fn snapshot(&self) -> Result<PendingSnapshot>;

    /// Remove exactly the given marker instances.
    ///
    /// Entries whose revision no longer matches were re-marked after the
    /// snapshot and are kept. Returns the number of entries removed.
    async fn remove(&self, markers: &[PendingMarker]) -> Result<usize>;

    /// Score of `id`, if pending
    async fn score(&self, id: EntityId) -> Result<Option<i64>>;

    /// Number of pending entries
    async fn len(&self) -> Result<usize>;
}

#[derive(Debug, Default)]
struct IndexState {
    /// id -> (touched_at, revision)
    markers: BTreeMap<EntityId, (i64, u64)>,
    next_revision: u64,
}

/// In-process pending index.
///
/// Lives only as long as the process; use the redb-backed index from
/// `viewsync-store` when pending work must survive restarts.
#[derive(Debug, Default)]
pub struct MemoryPendingIndex {
    state: Mutex<IndexState>,
}

impl MemoryPendingIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingIndex for MemoryPendingIndex {
    async fn mark_pending(&self, id: EntityId, touched_at: i64) -> Result<()> {
        let mut state = self.state.lock();
        state.next_revision += 1;
        let revision = state.next_revision;
        let score = state
            .markers
            .get(&id)
            .map_or(touched_at, |&(score, _)| score.max(touched_at));
        state.markers.insert(id, (score, revision));
        Ok(())
    }

    async fn snapshot(&self) -> Result<PendingSnapshot> {
        let state = self.state.lock();
        let markers = state
            .markers
            .iter()
            .map(|(&id, &(touched_at, revision))| PendingMarker {
                id,
                touched_at,
                revision,
            })
            .collect();
        Ok(PendingSnapshot::new(markers))
    }

    async fn remove(&self, markers: &[PendingMarker]) -> Result<usize> {
        let mut state = self.state.lock();
        let mut removed = 0;
        for marker in markers {
            if state
                .markers
                .get(&marker.id)
                .is_some_and(|&(_, revision)| revision == marker.revision)
            {
                state.markers.remove(&marker.id);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn score(&self, id: EntityId) -> Result<Option<i64>> {
        Ok(self.state.lock().markers.get(&id).map(|&(score, _)| score))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.state.lock().markers.len())
    }
}
