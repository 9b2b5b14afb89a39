//! Metrics middleware for request tracking
//!
//! Classifies each request by method and path and counts it per status code.

use axum::{body::Body, extract::Request, http::Method, middleware::Next, response::Response};
use viewsync_counter::sync_metrics;

/// Route class of a request, or `None` for endpoints that are not counted
pub(crate) fn route_class(method: &Method, path: &str) -> Option<&'static str> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method, segments.as_slice()) {
        (m, ["api", "board", "posts"]) if m == Method::POST => Some("post_create"),
        (m, ["api", "board", "posts", _id]) if m == Method::GET => Some("post_read"),
        (m, ["api", "board", "posts", _id]) if m == Method::PATCH => Some("post_update"),
        (m, ["api", "board", "posts", _id]) if m == Method::DELETE => Some("post_delete"),
        (_, ["_admin", ..]) => Some("admin"),
        // Skip metrics and health endpoints
        _ => None,
    }
}

pub async fn metrics_layer(request: Request<Body>, next: Next) -> Response {
    let route = route_class(request.method(), request.uri().path());

    let response = next.run(request).await;

    if let Some(route) = route {
        sync_metrics().record_http(route, response.status().as_u16());
    }
    response
}
