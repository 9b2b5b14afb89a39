//! Board HTTP handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use viewsync_common::{EntityId, Error};
use viewsync_counter::sync_metrics;
use viewsync_store::{NewPost, PostPatch, StoredPost};

use crate::AppState;

/// Header carrying the authenticated caller, set by the upstream gateway
pub const USER_ID_HEADER: &str = "x-user-id";

/// Response of the content-read endpoint
#[derive(Debug, Serialize)]
pub struct PostView {
    pub post: StoredPost,
    /// Live counter value, or the durable count when `views_live` is false
    pub views: u64,
    pub views_live: bool,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn store_failure(context: &str, e: impl Into<Error>) -> Response {
    let e = e.into();
    error!("{}: {}", context, e);
    let status =
        StatusCode::from_u16(e.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_response(status, e.to_string())
}

fn caller_id(headers: &HeaderMap) -> Result<u64, Response> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| {
            error_response(
                StatusCode::BAD_REQUEST,
                format!("missing or invalid {USER_ID_HEADER} header"),
            )
        })
}

/// Load a post the caller owns, or the response explaining why not
fn owned_post(state: &AppState, id: EntityId, caller: u64) -> Result<StoredPost, Response> {
    match state.posts.get_post(id) {
        Ok(Some(post)) if post.owner_id == caller => Ok(post),
        Ok(Some(_)) => Err(error_response(StatusCode::FORBIDDEN, "Not authorized")),
        Ok(None) => Err(error_response(StatusCode::NOT_FOUND, "Post not found")),
        Err(e) => Err(store_failure("Failed to load post", e)),
    }
}

pub async fn health_check() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        r#"{"status":"healthy"}"#,
    )
        .into_response()
}

/// Prometheus metrics endpoint handler
pub async fn metrics_handler() -> Response {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        sync_metrics().export_prometheus(),
    )
        .into_response()
}

/// GET /api/board/posts/{post_id}
///
/// Every successful read counts as one view.
pub async fn get_post(State(state): State<Arc<AppState>>, Path(post_id): Path<u64>) -> Response {
    let id = EntityId::new(post_id);
    let post = match state.posts.get_post(id) {
        Ok(Some(post)) => post,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Post not found"),
        Err(e) => return store_failure("Failed to load post", e),
    };

    let count = state.recorder.record_view(id, post.views).await;
    Json(PostView {
        post,
        views: count.views,
        views_live: count.live,
    })
    .into_response()
}

/// POST /api/board/posts
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewPost>,
) -> Response {
    let owner_id = match caller_id(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.posts.create_post(owner_id, body) {
        Ok(post) => {
            info!("User {} created post {}", owner_id, post.id);
            (StatusCode::CREATED, Json(post)).into_response()
        }
        Err(e) => store_failure("Failed to create post", e),
    }
}

/// PATCH /api/board/posts/{post_id}
pub async fn update_post(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<u64>,
    headers: HeaderMap,
    Json(patch): Json<PostPatch>,
) -> Response {
    let caller = match caller_id(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let id = EntityId::new(post_id);
    if let Err(response) = owned_post(&state, id, caller) {
        return response;
    }
    match state.posts.update_post(id, patch) {
        Ok(Some(post)) => Json(post).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Post not found"),
        Err(e) => store_failure("Failed to update post", e),
    }
}

/// DELETE /api/board/posts/{post_id}
///
/// The post's counter and pending marker are left behind; the sync worker
/// drops them once it sees the post is gone.
pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<u64>,
    headers: HeaderMap,
) -> Response {
    let caller = match caller_id(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let id = EntityId::new(post_id);
    if let Err(response) = owned_post(&state, id, caller) {
        return response;
    }
    match state.posts.delete_post(id) {
        Ok(_) => {
            info!("User {} deleted post {}", caller, id);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => store_failure("Failed to delete post", e),
    }
}

/// POST /_admin/sync: run one sync cycle now
pub async fn admin_sync(State(state): State<Arc<AppState>>) -> Response {
    let outcome = state.worker.run_cycle().await;
    Json(outcome).into_response()
}

/// GET /_admin/pending
pub async fn admin_pending(State(state): State<Arc<AppState>>) -> Response {
    match state.index.len().await {
        Ok(pending) => Json(json!({
            "pending": pending,
            "state": state.worker.state(),
            "consecutive_failures": state.worker.consecutive_failures(),
        }))
        .into_response(),
        Err(e) => store_failure("Failed to read pending index", e),
    }
}
