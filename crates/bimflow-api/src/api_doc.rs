//! OpenAPI documentation, served at `/api/openapi.json` and browsable at `/docs`.

use utoipa::OpenApi;

use crate::error::ErrorResponse;
use crate::handlers;
use bimflow_core::models::{ContentRecord, JobState};
use bimflow_infra::{BreakerSnapshot, CacheStats};

pub fn get_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bimflow API",
        version = "0.1.0",
        description = "Ingestion pipeline for CAD/BIM design files. Uploads are deduplicated by content hash, translated by an external model-derivative service on a background worker pool, and derived results (manifest, properties, quantities) are served from a cache."
    ),
    paths(
        handlers::uploads::upload_model,
        handlers::jobs::get_job,
        handlers::content::get_content,
        handlers::results::get_manifest,
        handlers::results::get_properties,
        handlers::results::get_quantities,
        handlers::breakers::list_breakers,
        handlers::health::liveness_check,
        handlers::health::readiness_check,
    ),
    components(schemas(
        handlers::uploads::UploadResponse,
        handlers::jobs::JobResponse,
        handlers::breakers::BreakersResponse,
        handlers::health::ReadinessResponse,
        ContentRecord,
        JobState,
        BreakerSnapshot,
        CacheStats,
        ErrorResponse,
    )),
    tags(
        (name = "uploads", description = "Design file upload"),
        (name = "jobs", description = "Translation job status"),
        (name = "content", description = "Stored content records"),
        (name = "results", description = "Translation results"),
        (name = "operations", description = "Circuit breakers and cache"),
        (name = "health", description = "Liveness and readiness probes")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route() {
        let spec = get_openapi_spec();
        for path in [
            "/api/v0/uploads",
            "/api/v0/jobs/{job_id}",
            "/api/v0/content/{content_id}",
            "/api/v0/content/{content_id}/manifest",
            "/api/v0/content/{content_id}/properties",
            "/api/v0/content/{content_id}/quantities",
            "/api/v0/breakers",
            "/health",
            "/health/ready",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
