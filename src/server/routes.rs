//! Route handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::catalog::{is_playlist_url, is_supported_url};
use crate::scheduler::DownloadRequest;

use super::ServerState;

fn bad_request(message: String) -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn internal_error(context: &str, e: anyhow::Error) -> (StatusCode, Json<serde_json::Value>) {
    warn!("{}: {:#}", context, e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": context })),
    )
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// =============================================================================
// Imports
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SubmitImportBody {
    pub playlist_url: String,
}

/// POST /api/imports - submit a playlist import, returns the pending job.
pub async fn submit_import(
    State(state): State<ServerState>,
    Json(body): Json<SubmitImportBody>,
) -> impl IntoResponse {
    match state.orchestrator.submit(&body.playlist_url) {
        Ok(job) => (StatusCode::ACCEPTED, Json(json!({ "job": job.view() }))).into_response(),
        Err(e) => bad_request(e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// GET /api/imports - recent import jobs.
pub async fn list_imports(
    State(state): State<ServerState>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    match state.orchestrator.recent_jobs(query.limit) {
        Ok(jobs) => {
            let views: Vec<_> = jobs.iter().map(|j| j.view()).collect();
            Json(json!({ "jobs": views })).into_response()
        }
        Err(e) => internal_error("Failed to list import jobs", e).into_response(),
    }
}

/// GET /api/imports/{id} - one job with its tracks.
pub async fn get_import(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.get_job(&id) {
        Ok(Some((job, tracks))) => {
            Json(json!({ "job": job.view(), "tracks": tracks })).into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, "Import job not found").into_response(),
        Err(e) => internal_error("Failed to load import job", e).into_response(),
    }
}

/// POST /api/imports/{id}/resume - re-run a job's remaining tracks.
pub async fn resume_import(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.resume(&id) {
        Ok(job) => (StatusCode::ACCEPTED, Json(json!({ "job": job.view() }))).into_response(),
        Err(e) => bad_request(e.to_string()).into_response(),
    }
}

// =============================================================================
// Download queue
// =============================================================================

/// POST /api/queue - enqueue a direct download.
pub async fn enqueue_download(
    State(state): State<ServerState>,
    Json(request): Json<DownloadRequest>,
) -> impl IntoResponse {
    if !is_supported_url(&request.url) {
        return bad_request("Invalid or unsupported URL".to_string()).into_response();
    }
    if is_playlist_url(&request.url) {
        return bad_request("Playlist URLs are not accepted here; enqueue tracks individually".to_string())
            .into_response();
    }
    if request.title.trim().is_empty() {
        return bad_request("Title must not be empty".to_string()).into_response();
    }

    let receipt = state.scheduler.enqueue(request);
    (StatusCode::ACCEPTED, Json(receipt)).into_response()
}

/// GET /api/queue - queue contents plus active job records.
pub async fn get_queue(State(state): State<ServerState>) -> impl IntoResponse {
    Json(state.scheduler.snapshot())
}

/// GET /api/queue/{id} - one job's status record.
pub async fn get_queue_job(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.scheduler.status(&id) {
        Some(record) => Json(record).into_response(),
        None => (StatusCode::NOT_FOUND, "Job not found").into_response(),
    }
}

/// DELETE /api/queue/{id} - remove a queued-but-unstarted item.
pub async fn cancel_queue_item(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.scheduler.cancel_pending(&id) {
        Json(json!({ "removed": true })).into_response()
    } else {
        (StatusCode::NOT_FOUND, "No queued item with that id").into_response()
    }
}

// =============================================================================
// Library
// =============================================================================

/// GET /api/library - most recently downloaded tracks.
pub async fn get_library(
    State(state): State<ServerState>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    match state.library.recent(query.limit) {
        Ok(tracks) => Json(json!({ "tracks": tracks })).into_response(),
        Err(e) => internal_error("Failed to list library", e).into_response(),
    }
}
