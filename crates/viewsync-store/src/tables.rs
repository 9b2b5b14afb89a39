//! Redb table definitions for the board's persistent state.

use redb::TableDefinition;

// posts.db
// Key: post id, Value: bincode-encoded StoredPost
pub const POSTS: TableDefinition<u64, &[u8]> = TableDefinition::new("posts");

// pending.db
// Key: post id, Value: (touched_at unix millis, marker revision)
pub const PENDING: TableDefinition<u64, (i64, u64)> = TableDefinition::new("pending");

// Key: counter name, Value: last allocated value
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");
pub const POST_ID_SEQUENCE: &str = "post_id";
// pending.db; bumped in the same transaction as each mark
pub const PENDING_REVISION_SEQUENCE: &str = "pending_revision";
