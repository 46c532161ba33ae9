//! Translation results, served from the cache when possible.

use crate::constants::CACHE_STATUS_HEADER;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use bimflow_core::models::ResultKind;
use std::sync::Arc;

async fn serve(
    state: &AppState,
    content_id: &str,
    kind: ResultKind,
) -> Result<Response, HttpAppError> {
    let result = state.results.fetch(content_id, kind).await?;
    let cache_status = if result.hit { "HIT" } else { "MISS" };
    Ok(([(CACHE_STATUS_HEADER, cache_status)], Json(result.value)).into_response())
}

/// Translation manifest of a content item
#[utoipa::path(
    get,
    path = "/api/v0/content/{content_id}/manifest",
    tag = "results",
    params(("content_id" = String, Path, description = "Hex SHA-256 of the content")),
    responses(
        (status = 200, description = "Manifest; X-Cache tells whether it came from the cache", body = Object),
        (status = 404, description = "No translation submitted", body = ErrorResponse),
        (status = 502, description = "Translation service failed", body = ErrorResponse),
        (status = 503, description = "Circuit breaker open", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state))]
pub async fn get_manifest(
    State(state): State<Arc<AppState>>,
    Path(content_id): Path<String>,
) -> Result<Response, HttpAppError> {
    serve(&state, &content_id, ResultKind::Manifest).await
}

/// Object properties of a translated model
#[utoipa::path(
    get,
    path = "/api/v0/content/{content_id}/properties",
    tag = "results",
    params(("content_id" = String, Path, description = "Hex SHA-256 of the content")),
    responses(
        (status = 200, description = "Properties collection", body = Object),
        (status = 404, description = "No translation submitted", body = ErrorResponse),
        (status = 502, description = "Translation service failed", body = ErrorResponse),
        (status = 503, description = "Circuit breaker open", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state))]
pub async fn get_properties(
    State(state): State<Arc<AppState>>,
    Path(content_id): Path<String>,
) -> Result<Response, HttpAppError> {
    serve(&state, &content_id, ResultKind::Properties).await
}

/// Quantity takeoff derived from the model properties
#[utoipa::path(
    get,
    path = "/api/v0/content/{content_id}/quantities",
    tag = "results",
    params(("content_id" = String, Path, description = "Hex SHA-256 of the content")),
    responses(
        (status = 200, description = "Counts, lengths, areas and volumes per category", body = Object),
        (status = 404, description = "No translation submitted", body = ErrorResponse),
        (status = 502, description = "Translation service failed", body = ErrorResponse),
        (status = 503, description = "Circuit breaker open", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state))]
pub async fn get_quantities(
    State(state): State<Arc<AppState>>,
    Path(content_id): Path<String>,
) -> Result<Response, HttpAppError> {
    serve(&state, &content_id, ResultKind::Quantities).await
}
