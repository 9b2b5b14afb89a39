//! Error type for redb-backed storage.

use viewsync_common::{EntityId, Error};

/// Error type for post store and pending index operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("post not found: {0}")]
    NotFound(EntityId),
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Io(e) => Self::Io(e),
            StoreError::Bincode(e) => Self::Serialization(e.to_string()),
            StoreError::Join(e) => Self::internal(format!("blocking task failed: {e}")),
            other => Self::store(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
