//! viewsync durable storage
//!
//! redb-backed implementations of the counter pipeline's persistent seams:
//! the post records that own the mirrored view count ([`PostStore`]) and the
//! pending-sync index ([`RedbPendingIndex`]).

pub mod error;
pub mod pending;
pub mod post_store;
pub mod tables;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use pending::RedbPendingIndex;
pub use post_store::PostStore;
pub use types::{NewPost, PostPatch, StoredPost};

/// Run a redb transaction on the blocking pool
pub(crate) async fn run_blocking<T, F>(f: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
