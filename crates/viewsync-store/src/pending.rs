//! Pending-sync index persisted in redb.
//!
//! Marks commit with eventual durability: they are on the hot read path and
//! reach disk with the next immediate commit (any removal, or [`flush`]).
//! Removals commit immediately. Marker revisions come from a counter stored
//! next to the markers and bumped inside the mark's own write transaction,
//! so commit order and revision order always agree.
//!
//! [`flush`]: RedbPendingIndex::flush

use async_trait::async_trait;
use redb::{Database, Durability, ReadableTable, ReadableTableMetadata};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use viewsync_common::{EntityId, Error, Result};
use viewsync_counter::{PendingIndex, PendingMarker, PendingSnapshot};

use crate::error::{StoreError, StoreResult};
use crate::run_blocking;
use crate::tables;

pub struct RedbPendingIndex {
    db: Arc<Database>,
}

impl RedbPendingIndex {
    /// Open (or create) the pending index at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(tables::PENDING)?;
            let _t = write_txn.open_table(tables::SEQUENCES)?;
        }
        write_txn.commit()?;

        let count = {
            let read_txn = db.begin_read()?;
            read_txn.open_table(tables::PENDING)?.len()?
        };
        if count > 0 {
            info!("Recovered {} pending view counters from {}", count, path.display());
        }

        Ok(Self { db: Arc::new(db) })
    }

    /// Make every earlier mark durable
    pub fn flush(&self) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        write_txn.commit()?;
        Ok(())
    }

    fn read_markers(&self) -> StoreResult<Vec<PendingMarker>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::PENDING)?;
        let mut markers = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let (touched_at, revision) = value.value();
            markers.push(PendingMarker {
                id: EntityId::new(key.value()),
                touched_at,
                revision,
            });
        }
        Ok(markers)
    }
}

/// Upsert the marker for `id`. The score never moves backwards; the
/// revision always advances.
fn write_marker(db: &Database, id: EntityId, touched_at: i64) -> StoreResult<()> {
    let mut write_txn = db.begin_write()?;
    write_txn.set_durability(Durability::Eventual);
    {
        let mut sequences = write_txn.open_table(tables::SEQUENCES)?;
        let revision = sequences
            .get(tables::PENDING_REVISION_SEQUENCE)?
            .map_or(0, |guard| guard.value())
            + 1;
        sequences.insert(tables::PENDING_REVISION_SEQUENCE, revision)?;

        let mut table = write_txn.open_table(tables::PENDING)?;
        let score = table
            .get(id.get())?
            .map_or(touched_at, |guard| guard.value().0.max(touched_at));
        table.insert(id.get(), (score, revision))?;
    }
    write_txn.commit()?;
    Ok(())
}

fn remove_markers(db: &Database, markers: &[PendingMarker]) -> StoreResult<usize> {
    let write_txn = db.begin_write()?;
    let mut removed = 0;
    {
        let mut table = write_txn.open_table(tables::PENDING)?;
        for marker in markers {
            let current = table.get(marker.id.get())?.map(|guard| guard.value().1);
            if current == Some(marker.revision) {
                table.remove(marker.id.get())?;
                removed += 1;
            }
        }
    }
    write_txn.commit()?;
    Ok(removed)
}

fn unavailable(e: StoreError) -> Error {
    Error::index(e.to_string())
}

#[async_trait]
impl PendingIndex for RedbPendingIndex {
    async fn mark_pending(&self, id: EntityId, touched_at: i64) -> Result<()> {
        let db = Arc::clone(&self.db);
        run_blocking(move || write_marker(&db, id, touched_at))
            .await
            .map_err(unavailable)
    }

    async fn snapshot(&self) -> Result<PendingSnapshot> {
        self.read_markers()
            .map(PendingSnapshot::new)
            .map_err(unavailable)
    }

    async fn remove(&self, markers: &[PendingMarker]) -> Result<usize> {
        if markers.is_empty() {
            return Ok(0);
        }
        let db = Arc::clone(&self.db);
        let markers = markers.to_vec();
        run_blocking(move || remove_markers(&db, &markers))
            .await
            .map_err(unavailable)
    }

    async fn score(&self, id: EntityId) -> Result<Option<i64>> {
        let lookup = || -> StoreResult<Option<i64>> {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(tables::PENDING)?;
            Ok(table.get(id.get())?.map(|guard| guard.value().0))
        };
        lookup().map_err(unavailable)
    }

    async fn len(&self) -> Result<usize> {
        let count = || -> StoreResult<u64> {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(tables::PENDING)?;
            Ok(table.len()?)
        };
        count()
            .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
            .map_err(unavailable)
    }
}
