//! Job handler trait
//!
//! The API implements this for the translation pipeline. The pool calls
//! `handle` for every leased job and commits the outcome afterwards.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use bimflow_core::models::TranslationJob;
use bimflow_core::AppError;
use bimflow_db::JobRepository;

/// Proof that the current worker holds the lease on a job.
///
/// The only mutation a handler may make mid-flight is recording the remote
/// handle; the final transition is done by the pool once `handle` returns.
pub struct JobLease {
    repository: Arc<dyn JobRepository>,
    job_id: Uuid,
    worker_id: String,
}

impl JobLease {
    pub fn new(repository: Arc<dyn JobRepository>, job_id: Uuid, worker_id: impl Into<String>) -> Self {
        Self {
            repository,
            job_id,
            worker_id: worker_id.into(),
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Record the accepted remote translation and move the job to `running`.
    pub async fn mark_running(&self, remote_urn: &str) -> Result<TranslationJob, AppError> {
        self.repository
            .mark_running(self.job_id, &self.worker_id, remote_urn)
            .await
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Run one attempt of `job`; the returned value is stored as the job result.
    ///
    /// Return a [`bimflow_core::TaskError::unrecoverable`] to skip remaining attempts.
    async fn handle(&self, job: &TranslationJob, lease: &JobLease) -> Result<serde_json::Value>;
}
