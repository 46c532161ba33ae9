//! Ingestion orchestrator: stage → promote → enqueue, per upload request.

use bytes::Bytes;
use futures::Stream;
use std::fmt::Display;
use std::sync::Arc;

use bimflow_core::models::{ContentRecord, JobState, TranslationJob};
use bimflow_core::AppError;
use bimflow_db::EnqueueOutcome;
use bimflow_translation::CachingTranslationClient;
use bimflow_worker::JobQueue;

use crate::services::upload::UploadOptimizer;

/// Incoming file as handed over by the HTTP layer.
pub struct UploadRequest<S> {
    pub stream: S,
    pub declared_name: String,
    pub declared_size: Option<u64>,
    pub mime_hint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub record: ContentRecord,
    /// The bytes were already in the content store.
    pub duplicate: bool,
    pub job: TranslationJob,
    /// A new job was queued by this request.
    pub job_created: bool,
}

pub struct IngestionOrchestrator {
    optimizer: Arc<UploadOptimizer>,
    queue: Arc<JobQueue>,
    results: Arc<CachingTranslationClient>,
}

impl IngestionOrchestrator {
    pub fn new(
        optimizer: Arc<UploadOptimizer>,
        queue: Arc<JobQueue>,
        results: Arc<CachingTranslationClient>,
    ) -> Self {
        Self {
            optimizer,
            queue,
            results,
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Accept one upload and make sure a translation is queued for it.
    ///
    /// Returns once the file is in the content store and a job exists.
    /// Translation itself happens on the worker pool.
    #[tracing::instrument(skip_all, fields(declared_name = %request.declared_name, requested_by = %requested_by))]
    pub async fn ingest<S, E>(
        &self,
        request: UploadRequest<S>,
        requested_by: &str,
    ) -> Result<IngestOutcome, AppError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let staged = self
            .optimizer
            .stage(
                request.stream,
                &request.declared_name,
                request.declared_size,
                request.mime_hint.as_deref(),
            )
            .await?;
        let file_name = staged.original_name.clone();
        let (record, duplicate) = self.optimizer.promote(staged).await?;

        let (job, job_created) = self
            .ensure_translation(&record.content_id, &file_name, requested_by)
            .await?;

        tracing::info!(
            content_id = %record.content_id,
            job_id = %job.job_id,
            duplicate,
            job_created,
            "Upload ingested"
        );

        Ok(IngestOutcome {
            record,
            duplicate,
            job,
            job_created,
        })
    }

    /// Enqueue a translation unless one is queued, running or done.
    ///
    /// Replacing a terminally failed job drops any cached results of the
    /// earlier attempt.
    pub async fn ensure_translation(
        &self,
        content_id: &str,
        file_name: &str,
        requested_by: &str,
    ) -> Result<(TranslationJob, bool), AppError> {
        let previous = self.queue.latest_for_content(content_id).await?;

        match self.queue.enqueue(content_id, file_name, requested_by).await? {
            EnqueueOutcome::Created(job) => {
                if matches!(previous, Some(ref p) if p.state == JobState::FailedTerminal) {
                    let removed = self.results.invalidate(content_id).await;
                    tracing::info!(
                        content_id = %content_id,
                        removed,
                        "Invalidated cached results of failed translation"
                    );
                }
                Ok((job, true))
            }
            EnqueueOutcome::Existing(job) => Ok((job, false)),
        }
    }
}
