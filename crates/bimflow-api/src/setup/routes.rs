//! Route configuration and setup

use crate::constants::{API_PREFIX, MULTIPART_OVERHEAD_BYTES};
use crate::handlers;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use bimflow_core::Config;
use bimflow_infra::request_id_middleware;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router<()>, anyhow::Error> {
    let cors = setup_cors(config)?;

    // The upload optimizer enforces the real limit while streaming; this only
    // stops bodies that could never be valid
    let body_limit = usize::try_from(config.max_upload_size_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let http_concurrency_limit = std::env::var("HTTP_CONCURRENCY_LIMIT")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(10_000)
        .max(1);
    tracing::debug!(http_concurrency_limit, "HTTP concurrency limit layer enabled");

    let app = api_routes()
        .merge(health_routes())
        .with_state(state)
        .route(
            "/api/openapi.json",
            get(|| async { Json(crate::api_doc::get_openapi_spec()) }),
        )
        .merge(utoipa_rapidoc::RapiDoc::new("/api/openapi.json").path("/docs"))
        .layer(ConcurrencyLimitLayer::new(http_concurrency_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware));

    Ok(app)
}

fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let cors = if config.cors_origins().iter().any(|o| o == "*") {
        if config.is_production() {
            tracing::warn!("CORS configured to allow all origins - not recommended for production");
        }
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
    } else {
        let origins = config
            .cors_origins()
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Invalid CORS origin: {}", e))?;
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
    };
    Ok(cors)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &format!("{}/uploads", API_PREFIX),
            post(handlers::uploads::upload_model),
        )
        .route(
            &format!("{}/jobs/{{job_id}}", API_PREFIX),
            get(handlers::jobs::get_job),
        )
        .route(
            &format!("{}/content/{{content_id}}", API_PREFIX),
            get(handlers::content::get_content),
        )
        .route(
            &format!("{}/content/{{content_id}}/manifest", API_PREFIX),
            get(handlers::results::get_manifest),
        )
        .route(
            &format!("{}/content/{{content_id}}/properties", API_PREFIX),
            get(handlers::results::get_properties),
        )
        .route(
            &format!("{}/content/{{content_id}}/quantities", API_PREFIX),
            get(handlers::results::get_quantities),
        )
        .route(
            &format!("{}/breakers", API_PREFIX),
            get(handlers::breakers::list_breakers),
        )
}

fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health::liveness_check))
        .route("/health/ready", get(handlers::health::readiness_check))
}
