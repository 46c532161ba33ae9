//! Read side: manifest, properties and quantities per content item.

use std::sync::Arc;

use bimflow_core::models::ResultKind;
use bimflow_core::AppError;
use bimflow_translation::{CachedResult, CachingTranslationClient, DerivativeHandle};
use bimflow_worker::JobQueue;

pub struct ResultService {
    results: Arc<CachingTranslationClient>,
    queue: Arc<JobQueue>,
}

impl ResultService {
    pub fn new(results: Arc<CachingTranslationClient>, queue: Arc<JobQueue>) -> Self {
        Self { results, queue }
    }

    pub fn client(&self) -> &Arc<CachingTranslationClient> {
        &self.results
    }

    /// Serve a derived result.
    ///
    /// A cached value is returned without touching the job store or the
    /// remote service. Otherwise the remote handle of the latest job is
    /// looked up and the breaker-protected fetch runs.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self, content_id: &str, kind: ResultKind) -> Result<CachedResult, AppError> {
        if let Some(value) = self.results.cached(kind, content_id).await {
            tracing::debug!(content_id = %content_id, kind = %kind, "Result cache hit");
            return Ok(CachedResult { value, hit: true });
        }

        let urn = self
            .queue
            .latest_for_content(content_id)
            .await?
            .and_then(|job| job.remote_urn)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "No translation has been submitted for content {}",
                    content_id
                ))
            })?;

        let handle = DerivativeHandle::new(content_id, urn);
        Ok(self.results.fetch(kind, &handle).await?)
    }
}
