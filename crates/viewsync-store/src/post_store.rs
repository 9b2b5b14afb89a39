//! Durable post records backed by redb.
//!
//! Reads run inline; every write is one write transaction. The counter
//! write-back used by the sync worker is moved to a blocking thread so the
//! worker's commit timeout can fire while redb is busy.

use async_trait::async_trait;
use chrono::Utc;
use redb::{Database, ReadableTable, ReadableTableMetadata};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use viewsync_common::EntityId;
use viewsync_counter::CounterStore;

use crate::error::{StoreError, StoreResult};
use crate::run_blocking;
use crate::tables;
use crate::types::{NewPost, PostPatch, StoredPost};

/// Persistent post store; cheap to clone
#[derive(Clone)]
pub struct PostStore {
    db: Arc<Database>,
}

impl PostStore {
    /// Open (or create) the redb database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create all tables eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(tables::POSTS)?;
            let _t = write_txn.open_table(tables::SEQUENCES)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Insert a new post with a freshly allocated id. Ids are never reused.
    pub fn create_post(&self, owner_id: u64, new: NewPost) -> StoreResult<StoredPost> {
        let write_txn = self.db.begin_write()?;
        let post = {
            let mut sequences = write_txn.open_table(tables::SEQUENCES)?;
            let last = sequences
                .get(tables::POST_ID_SEQUENCE)?
                .map_or(0, |guard| guard.value());
            let id = last + 1;
            sequences.insert(tables::POST_ID_SEQUENCE, id)?;

            let post = StoredPost {
                id: EntityId::new(id),
                title: new.title,
                content: new.content,
                created_at: Utc::now(),
                owner_id,
                views: 0,
            };
            let bytes = bincode::serialize(&post)?;
            write_txn.open_table(tables::POSTS)?.insert(id, bytes.as_slice())?;
            post
        };
        write_txn.commit()?;
        debug!("Created post {}", post.id);
        Ok(post)
    }

    pub fn get_post(&self, id: EntityId) -> StoreResult<Option<StoredPost>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::POSTS)?;
        match table.get(id.get())? {
            Some(guard) => Ok(Some(bincode::deserialize(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Apply `patch` to a post. Read and write share one transaction, so a
    /// concurrent view-count write-back is never overwritten.
    pub fn update_post(&self, id: EntityId, patch: PostPatch) -> StoreResult<Option<StoredPost>> {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(tables::POSTS)?;
            let current: Option<StoredPost> = match table.get(id.get())? {
                Some(guard) => Some(bincode::deserialize(guard.value())?),
                None => None,
            };
            match current {
                Some(mut post) => {
                    patch.apply(&mut post);
                    let bytes = bincode::serialize(&post)?;
                    table.insert(id.get(), bytes.as_slice())?;
                    Some(post)
                }
                None => None,
            }
        };
        write_txn.commit()?;
        Ok(updated)
    }

    /// Returns whether a post was deleted
    pub fn delete_post(&self, id: EntityId) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(tables::POSTS)?;
            table.remove(id.get())?.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }

    pub fn contains(&self, id: EntityId) -> StoreResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::POSTS)?;
        Ok(table.get(id.get())?.is_some())
    }

    pub fn post_count(&self) -> StoreResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::POSTS)?;
        Ok(table.len()?)
    }

    /// Write view counts in one transaction, keeping `max(stored, new)`.
    ///
    /// A missing post aborts the transaction before anything is committed.
    pub fn apply_view_counts(&self, updates: &[(EntityId, u64)]) -> StoreResult<usize> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(tables::POSTS)?;
            for &(id, views) in updates {
                let mut post: StoredPost = match table.get(id.get())? {
                    Some(guard) => bincode::deserialize(guard.value())?,
                    // Dropping the uncommitted txn aborts it
                    None => return Err(StoreError::NotFound(id)),
                };
                if views <= post.views {
                    continue;
                }
                post.views = views;
                let bytes = bincode::serialize(&post)?;
                table.insert(id.get(), bytes.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(updates.len())
    }
}

#[async_trait]
impl CounterStore for PostStore {
    async fn owner_exists(&self, id: EntityId) -> viewsync_common::Result<bool> {
        Ok(self.contains(id)?)
    }

    async fn batch_update_counters(
        &self,
        updates: &[(EntityId, u64)],
    ) -> viewsync_common::Result<usize> {
        // If the caller times out, the blocking commit still finishes; the
        // next cycle rewrites the same values under the max policy.
        let store = self.clone();
        let updates = updates.to_vec();
        Ok(run_blocking(move || store.apply_view_counts(&updates)).await?)
    }
}
