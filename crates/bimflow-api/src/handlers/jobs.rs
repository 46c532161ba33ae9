use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use bimflow_core::models::{JobState, TranslationJob};
use bimflow_core::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Public view of a translation job. Lease bookkeeping stays internal.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub job_id: Uuid,
    pub content_id: String,
    pub file_name: String,
    pub state: JobState,
    pub attempts: i32,
    pub max_attempts: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TranslationJob> for JobResponse {
    fn from(job: TranslationJob) -> Self {
        Self {
            job_id: job.job_id,
            content_id: job.content_id,
            file_name: job.file_name,
            state: job.state,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            last_error: job.last_error,
            requested_by: job.requested_by,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Get a translation job by ID
#[utoipa::path(
    get,
    path = "/api/v0/jobs/{job_id}",
    tag = "jobs",
    params(("job_id" = Uuid, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job found", body = JobResponse),
        (status = 404, description = "Job not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state))]
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobResponse>, HttpAppError> {
    match state.queue.get(job_id).await? {
        Some(job) => Ok(Json(JobResponse::from(job))),
        None => {
            tracing::debug!(job_id = %job_id, "Job not found");
            Err(AppError::NotFound("Job not found".to_string()).into())
        }
    }
}
