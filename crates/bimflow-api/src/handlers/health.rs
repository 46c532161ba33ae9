//! Health check handlers and response types.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const STORAGE_PROBE_KEY: &str = "health-check-non-existent-key";

/// Run an async check with timeout; returns "healthy", "timeout", or "{prefix}: {error}".
async fn run_check<F, E>(timeout: Duration, f: F, error_prefix: &str) -> String
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match tokio::time::timeout(timeout, f).await {
        Ok(Ok(())) => "healthy".to_string(),
        Ok(Err(e)) => format!("{}: {}", error_prefix, e),
        Err(_) => "timeout".to_string(),
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessResponse {
    pub status: String,
    pub storage: String,
    pub content_index: String,
    pub job_store: String,
}

/// Liveness probe - process is running.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Process is alive"))
)]
pub async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "alive" })))
}

/// Readiness probe - content store, content index and job store.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Ready to accept uploads", body = ReadinessResponse),
        (status = 503, description = "A dependency is unavailable", body = ReadinessResponse)
    )
)]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let storage = state.storage.clone();
    let storage_status = run_check(
        CHECK_TIMEOUT,
        async move { storage.exists(STORAGE_PROBE_KEY).await.map(drop) },
        "not_ready",
    )
    .await;
    let content_status = run_check(CHECK_TIMEOUT, state.contents.health_check(), "not_ready").await;
    let job_status = run_check(CHECK_TIMEOUT, state.jobs.health_check(), "not_ready").await;

    let ready = [&storage_status, &content_status, &job_status]
        .iter()
        .all(|s| s.as_str() == "healthy");
    if !ready {
        tracing::error!(
            storage = %storage_status,
            content_index = %content_status,
            job_store = %job_status,
            "Readiness check failed"
        );
    }

    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status_code,
        Json(ReadinessResponse {
            status: if ready { "ready" } else { "not_ready" }.to_string(),
            storage: storage_status,
            content_index: content_status,
            job_store: job_status,
        }),
    )
}
