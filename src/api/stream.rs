//! Server-Sent-Events stream endpoint.
//!
//! `GET /jobs/:job_id/stream` frames the job's event sequence as SSE:
//! `event:` carries the event type, `data:` the JSON payload, `id:` the
//! monotone event id clients echo back on reconnect (standard
//! `Last-Event-ID` header, or a `last_event_id` query parameter for
//! clients that cannot set headers). Heartbeat comments flow every ten
//! seconds; the terminal event ends the stream.

use std::convert::Infallible;
use std::time::Duration;

use async_stream::stream;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;
use tracing::{error, warn};

use super::{AppState, api_error, require_user};
use crate::events::{JobEvent, follow_events};
use crate::store::JobKey;

/// Interval between SSE heartbeat comments.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub last_event_id: Option<u64>,
}

pub async fn stream_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> axum::response::Response {
    let user = match require_user(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };
    let key = JobKey::new(user, job_id);

    let job = match state.store.get_job(&key).await {
        Ok(Some(job)) => job,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "unknown job"),
        Err(e) => {
            error!("failed to read job for stream: {e}");
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to read job");
        }
    };

    // Header takes precedence; the query parameter serves EventSource
    // polyfills that cannot set Last-Event-ID.
    let last_event_id = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .or(query.last_event_id)
        .unwrap_or(0);

    // Subscribe before replay so nothing published in between is lost.
    let live = state.registry.get(&key).map(|handle| handle.bus.subscribe());

    if live.is_none() && job.status.is_terminal() {
        // Terminal and evicted: resumable only if the log still has a
        // suffix to offer.
        match state.store.events_after(&key, last_event_id).await {
            Ok(events) if events.is_empty() => {
                return api_error(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "stream already terminal, nothing to resume",
                );
            }
            Ok(_) => {}
            Err(e) => {
                error!("failed to read event log: {e}");
                return api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to read events");
            }
        }
    }

    let records = follow_events(state.store.clone(), key.clone(), live, last_event_id);
    let connected = JobEvent::StreamConnected {
        job_id: key.job_id.clone(),
        last_event_id,
    };

    let sse_stream = stream! {
        // The connection frame is synthetic: it carries no id and is never
        // persisted, so it cannot disturb resume bookkeeping.
        match Event::default()
            .event(connected.event_type())
            .json_data(connected.payload())
        {
            Ok(event) => yield Ok::<Event, Infallible>(event),
            Err(e) => warn!("failed to frame stream_connected: {e}"),
        }

        for await record in records {
            match Event::default()
                .event(record.event_type.as_str())
                .id(record.event_id.to_string())
                .json_data(&record.payload)
            {
                Ok(event) => yield Ok(event),
                Err(e) => warn!("failed to frame event {}: {e}", record.event_id),
            }
        }
    };

    Sse::new(sse_stream)
        .keep_alive(
            KeepAlive::new()
                .interval(HEARTBEAT_INTERVAL)
                .text("heartbeat"),
        )
        .into_response()
}
