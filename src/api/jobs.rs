//! Job lifecycle endpoints.
//!
//! - `POST   /jobs`                — create a job, returns `{ job_id, stream_url }`
//! - `GET    /jobs`                — recent jobs for the user
//! - `GET    /jobs/:id`            — job summary
//! - `GET    /jobs/:id/download`   — final Markdown (completed jobs only)
//! - `DELETE /jobs/:id`            — cancel (idempotent)

use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use super::{AppState, api_error, require_user};
use crate::config::{CrawlOptions, build_job_config};
use crate::store::{JobCounters, JobKey, JobRecord, JobStatus};

/// How many jobs `GET /jobs` returns at most.
const LIST_LIMIT: usize = 50;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateJobRequest {
    pub url: String,
    #[serde(default)]
    pub options: Option<CrawlOptions>,
}

#[derive(Serialize)]
struct CreateJobResponse {
    job_id: String,
    stream_url: String,
}

#[derive(Serialize)]
struct JobSummary {
    job_id: String,
    seed_url: String,
    status: JobStatus,
    counters: JobCounters,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl From<&JobRecord> for JobSummary {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.job_id.clone(),
            seed_url: record.seed_url.clone(),
            status: record.status,
            counters: record.counters,
            created_at: record.created_at,
            completed_at: record.completed_at,
            error: record.error.clone(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /jobs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn create_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateJobRequest>,
) -> Response {
    let user = match require_user(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let options = body.options.unwrap_or_default();
    let cfg = match build_job_config(&body.url, options, state.defaults.job_deadline) {
        Ok(cfg) => cfg,
        Err(e) => return api_error(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let job_id = Uuid::new_v4().to_string();
    let key = JobKey::new(user, job_id.clone());
    let record = JobRecord::new(&key, cfg.seed.to_string(), cfg.options.clone());

    if let Err(e) = state.store.create_job(record).await {
        error!("failed to create job record: {e}");
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to create job");
    }

    state.registry.launch(key.clone(), cfg);
    info!("created job {key}");

    (
        StatusCode::CREATED,
        axum::response::Json(CreateJobResponse {
            stream_url: format!("/jobs/{job_id}/stream"),
            job_id,
        }),
    )
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /jobs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_jobs(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = match require_user(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state.store.list_jobs(&user, LIST_LIMIT).await {
        Ok(records) => {
            let jobs: Vec<JobSummary> = records.iter().map(JobSummary::from).collect();
            axum::response::Json(serde_json::json!({ "jobs": jobs })).into_response()
        }
        Err(e) => {
            error!("failed to list jobs: {e}");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to list jobs")
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /jobs/:job_id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Response {
    let user = match require_user(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };
    let key = JobKey::new(user, job_id);

    match state.store.get_job(&key).await {
        Ok(Some(record)) => axum::response::Json(JobSummary::from(&record)).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "unknown job"),
        Err(e) => {
            error!("failed to read job: {e}");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to read job")
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /jobs/:job_id/download
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn download_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Response {
    let user = match require_user(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };
    let key = JobKey::new(user, job_id);

    let record = match state.store.get_job(&key).await {
        Ok(Some(record)) => record,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "unknown job"),
        Err(e) => {
            error!("failed to read job: {e}");
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to read job");
        }
    };

    match (record.status, record.final_markdown) {
        (JobStatus::Completed, Some(markdown)) => (
            [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
            markdown,
        )
            .into_response(),
        _ => api_error(
            StatusCode::CONFLICT,
            format!("job is not completed (status: {:?})", record.status),
        ),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /jobs/:job_id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cancel a job. Idempotent: cancelling a terminal or already-cancelling
/// job succeeds without effect.
pub async fn cancel_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Response {
    let user = match require_user(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };
    let key = JobKey::new(user, job_id);

    let record = match state.store.get_job(&key).await {
        Ok(Some(record)) => record,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "unknown job"),
        Err(e) => {
            error!("failed to read job: {e}");
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to read job");
        }
    };

    if record.status.is_terminal() {
        return axum::response::Json(serde_json::json!({
            "job_id": key.job_id,
            "status": record.status,
        }))
        .into_response();
    }

    if state.registry.cancel(&key) {
        info!("cancelling job {key}");
    } else {
        // No live runner (e.g. the process restarted under a durable
        // store): finalize the orphan record directly.
        match state
            .store
            .cas_status(
                &key,
                &[JobStatus::Pending, JobStatus::Running],
                JobStatus::Cancelled,
            )
            .await
        {
            Ok(true) => {
                if let Err(e) = state.store.finish_job(&key, None, None).await {
                    error!("failed to finish orphan job {key}: {e}");
                }
                let payload = serde_json::json!({
                    "event_type": "job_cancelled",
                    "counters": record.counters,
                });
                if let Err(e) = state.store.append_event(&key, "job_cancelled", payload).await {
                    error!("failed to log cancellation for {key}: {e}");
                }
            }
            Ok(false) => {}
            Err(e) => {
                error!("failed to cancel orphan job {key}: {e}");
                return api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to cancel job");
            }
        }
    }

    axum::response::Json(serde_json::json!({
        "job_id": key.job_id,
        "status": "cancelling",
    }))
    .into_response()
}
