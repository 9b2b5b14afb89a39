//! viewsync Board - post service with cached view counters
//!
//! Serves board posts over HTTP. Reads are counted in the counter cache and
//! written back to the post records by the background sync worker.

pub mod board;
mod metrics_middleware;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use viewsync_counter::{CounterCache, PendingIndex, SyncWorker, SyncWorkerConfig, ViewRecorder};
use viewsync_store::PostStore;

/// Shared handler state
pub struct AppState {
    pub posts: PostStore,
    pub index: Arc<dyn PendingIndex>,
    pub recorder: ViewRecorder,
    pub worker: Arc<SyncWorker>,
}

impl AppState {
    /// Wire the read path and the sync worker around one cache and one index
    pub fn new(
        posts: PostStore,
        cache: Arc<dyn CounterCache>,
        index: Arc<dyn PendingIndex>,
        worker_config: SyncWorkerConfig,
    ) -> Self {
        let recorder = ViewRecorder::new(Arc::clone(&cache), Arc::clone(&index));
        let worker = Arc::new(SyncWorker::new(
            cache,
            Arc::clone(&index),
            Arc::new(posts.clone()),
            worker_config,
        ));
        Self {
            posts,
            index,
            recorder,
            worker,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/metrics", get(board::metrics_handler))
        .route("/health", get(board::health_check))
        .route("/api/board/posts", post(board::create_post))
        .route(
            "/api/board/posts/{post_id}",
            get(board::get_post)
                .patch(board::update_post)
                .delete(board::delete_post),
        )
        .route("/_admin/sync", post(board::admin_sync))
        .route("/_admin/pending", get(board::admin_pending))
        .layer(middleware::from_fn(metrics_middleware::metrics_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
