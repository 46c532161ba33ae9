use crate::state::AppState;
use axum::{extract::State, Json};
use bimflow_infra::{BreakerSnapshot, CacheStats};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BreakersResponse {
    pub breakers: Vec<BreakerSnapshot>,
    pub cache: CacheStats,
}

/// Circuit breaker state per remote operation, plus result cache counters
#[utoipa::path(
    get,
    path = "/api/v0/breakers",
    tag = "operations",
    responses((status = 200, description = "Breaker snapshots", body = BreakersResponse))
)]
pub async fn list_breakers(State(state): State<Arc<AppState>>) -> Json<BreakersResponse> {
    Json(BreakersResponse {
        breakers: state.translation.breaker_snapshots(),
        cache: state.cache.stats().await,
    })
}
