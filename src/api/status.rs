//! Health and job status endpoints

use axum::{
    Json,
    extract::{Path, Query, State as AxumState},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use std::collections::HashMap;

use crate::SharedState;

const RECENT_JOBS: usize = 10;

/// Root health check endpoint
/// Supports ?format=json for detailed JSON response
pub async fn root(
    AxumState(state): AxumState<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if params.get("format").map(String::as_str) == Some("json") {
        let store = state.job_store.lock().await;
        Json(json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_seconds": state.start_time.elapsed().as_secs(),
            "running_jobs": store.get_running_jobs().len(),
            "total_targets": state.config.targets.len(),
            "status": "healthy"
        }))
        .into_response()
    } else {
        "push2live - healthy".into_response()
    }
}

/// Returns server info and the most recent jobs
/// Supports ?target=name to filter
pub async fn status(
    AxumState(state): AxumState<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let store = state.job_store.lock().await;
    let jobs: Vec<_> = store
        .get_recent_jobs(store.len())
        .into_iter()
        .filter(|j| params.get("target").is_none_or(|t| &j.target == t))
        .take(RECENT_JOBS)
        .collect();
    let targets: Vec<_> = state
        .config
        .targets
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "repository": t.repository,
                "channel_id": t.channel_id,
                "branch": t.branch,
                "on_push": t.on_push,
            })
        })
        .collect();

    Json(json!({
        "server": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": state.started_at,
            "uptime_seconds": state.start_time.elapsed().as_secs(),
        },
        "jobs": {
            "running": store.get_running_jobs(),
            "recent": jobs,
        },
        "targets": targets,
    }))
}

/// Returns a specific job by ID
pub async fn get_job(
    AxumState(state): AxumState<SharedState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.job_store.lock().await;
    match store.get_job(&id) {
        Some(job) => Json(job).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Job not found"})),
        )
            .into_response(),
    }
}
