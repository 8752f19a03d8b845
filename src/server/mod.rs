//! HTTP surface.
//!
//! Thin axum layer over the scheduler, orchestrator, and library. Handlers
//! translate component results into status codes; validation failures come
//! back synchronously as 400s with no state created.

mod routes;

use anyhow::{Context, Result};
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tracing::info;

use crate::import::ImportOrchestrator;
use crate::library::LibraryStore;
use crate::scheduler::DownloadScheduler;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ServerState {
    pub scheduler: Arc<DownloadScheduler>,
    pub orchestrator: Arc<ImportOrchestrator>,
    pub library: Arc<dyn LibraryStore>,
}

pub fn make_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/imports", post(routes::submit_import))
        .route("/api/imports", get(routes::list_imports))
        .route("/api/imports/{id}", get(routes::get_import))
        .route("/api/imports/{id}/resume", post(routes::resume_import))
        .route("/api/queue", post(routes::enqueue_download))
        .route("/api/queue", get(routes::get_queue))
        .route("/api/queue/{id}", get(routes::get_queue_job))
        .route("/api/queue/{id}", delete(routes::cancel_queue_item))
        .route("/api/library", get(routes::get_library))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn run_server(state: ServerState, port: u16) -> Result<()> {
    let app = make_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on port {}", port);
    axum::serve(listener, app).await.context("Server error")
}
