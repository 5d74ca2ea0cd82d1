//! HTTP surface.
//!
//! Thin endpoints over the engine: create a job, read its summary, attach
//! the SSE stream, download the artifact, cancel. Identity arrives as an
//! opaque `x-user-id` header (authentication itself is upstream's problem);
//! every store key and registry lookup is namespaced by it.

mod jobs;
mod stream;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::jobs::JobRegistry;
use crate::server_config::ServerConfig;
use crate::store::JobStore;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub registry: Arc<JobRegistry>,
    pub defaults: Arc<ServerConfig>,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/jobs", get(jobs::list_jobs).post(jobs::create_job))
        .route(
            "/jobs/:job_id",
            get(jobs::get_job).delete(jobs::cancel_job),
        )
        .route("/jobs/:job_id/stream", get(stream::stream_job))
        .route("/jobs/:job_id/download", get(jobs::download_job))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Extract the opaque user id set by the authenticating proxy.
pub(crate) fn require_user(headers: &HeaderMap) -> Result<String, Response> {
    match headers.get("x-user-id").and_then(|v| v.to_str().ok()) {
        Some(user) if !user.is_empty() => Ok(user.to_string()),
        _ => Err(api_error(
            StatusCode::UNAUTHORIZED,
            "missing x-user-id header",
        )),
    }
}
