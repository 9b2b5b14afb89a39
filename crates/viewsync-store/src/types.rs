//! Persisted record types (bincode-encoded in redb).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use viewsync_common::EntityId;

/// Board post; the owner of a mirrored view counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPost {
    pub id: EntityId,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Id of the user who wrote the post
    pub owner_id: u64,
    /// Last view count written back by the sync worker
    #[serde(default)]
    pub views: u64,
}

/// Fields accepted when creating a post
#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
}

/// Partial update; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl PostPatch {
    pub(crate) fn apply(self, post: &mut StoredPost) {
        if let Some(title) = self.title {
            post.title = title;
        }
        if let Some(content) = self.content {
            post.content = content;
        }
    }
}
