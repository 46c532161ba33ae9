use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use bimflow_core::models::ContentRecord;
use bimflow_core::AppError;
use std::sync::Arc;

/// Get the record of a stored content item
#[utoipa::path(
    get,
    path = "/api/v0/content/{content_id}",
    tag = "content",
    params(("content_id" = String, Path, description = "Hex SHA-256 of the content")),
    responses(
        (status = 200, description = "Content record", body = ContentRecord),
        (status = 404, description = "Unknown content", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state))]
pub async fn get_content(
    State(state): State<Arc<AppState>>,
    Path(content_id): Path<String>,
) -> Result<Json<ContentRecord>, HttpAppError> {
    state
        .contents
        .get(&content_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Content not found".to_string()).into())
}
