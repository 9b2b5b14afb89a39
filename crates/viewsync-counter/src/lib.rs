//! viewsync Counter Pipeline
//!
//! Every content read bumps a fast counter and marks the entity as pending;
//! a single background worker periodically copies pending counters into the
//! durable store in one batch.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   increment    ┌────────────────┐
//! │   ViewRecorder   │───────────────►│  CounterCache  │
//! │   (read path)    │                └───────▲────────┘
//! │                  │   mark_pending ┌───────┴────────┐
//! │                  │───────────────►│  PendingIndex  │
//! └──────────────────┘                └───────▲────────┘
//!                                             │ snapshot / peek / remove
//!                                     ┌───────┴────────┐  batch_update
//!                                     │   SyncWorker   │──────────────► CounterStore
//!                                     └────────────────┘
//! ```
//!
//! Each seam is a trait so the worker and the read path run against
//! in-memory implementations in tests and against redb in production.

pub mod cache;
pub mod metrics;
pub mod pending;
pub mod recorder;
pub mod store;
pub mod worker;

pub use cache::{CounterCache, MemoryCounterCache};
pub use metrics::{SyncMetrics, sync_metrics};
pub use pending::{MemoryPendingIndex, PendingIndex, PendingMarker, PendingSnapshot};
pub use recorder::ViewRecorder;
pub use store::{CounterStore, InMemoryCounterStore};
pub use worker::{CycleOutcome, SyncState, SyncWorker, SyncWorkerConfig, sync_loop};
