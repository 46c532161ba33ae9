use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use std::time::Duration;
use uuid::Uuid;

use bimflow_core::models::{JobState, TranslationJob};
use bimflow_core::AppError;

/// Result of asking for a translation of some content.
#[derive(Debug, Clone)]
pub enum EnqueueOutcome {
    /// A new job was queued.
    Created(TranslationJob),
    /// A queued, running or succeeded job already covers this content.
    Existing(TranslationJob),
}

impl EnqueueOutcome {
    pub fn job(&self) -> &TranslationJob {
        match self {
            EnqueueOutcome::Created(job) | EnqueueOutcome::Existing(job) => job,
        }
    }

    pub fn into_job(self) -> TranslationJob {
        match self {
            EnqueueOutcome::Created(job) | EnqueueOutcome::Existing(job) => job,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, EnqueueOutcome::Created(_))
    }
}

/// Durable job table with per-job leases.
///
/// Every mutation after `lease_next` names the worker that holds the lease;
/// a worker whose lease was reaped gets an error instead of overwriting the
/// newer holder's state.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert `job` unless a non-failed-terminal job exists for the same content.
    async fn enqueue(&self, job: TranslationJob) -> Result<EnqueueOutcome, AppError>;

    async fn get(&self, job_id: Uuid) -> Result<Option<TranslationJob>, AppError>;

    /// Most recent job for a content item, whatever its state.
    async fn latest_for_content(&self, content_id: &str)
        -> Result<Option<TranslationJob>, AppError>;

    /// Claim the oldest due queued job without a live lease and count the attempt.
    async fn lease_next(
        &self,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<TranslationJob>, AppError>;

    /// Record the remote handle and move `queued → running`.
    async fn mark_running(
        &self,
        job_id: Uuid,
        worker_id: &str,
        remote_urn: &str,
    ) -> Result<TranslationJob, AppError>;

    async fn mark_succeeded(
        &self,
        job_id: Uuid,
        worker_id: &str,
        result: serde_json::Value,
    ) -> Result<TranslationJob, AppError>;

    /// `retry_at = Some(_)` → `failed-retryable`, `None` → `failed-terminal`.
    async fn mark_failed(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<TranslationJob, AppError>;

    /// Move due `failed-retryable` jobs back to `queued`.
    async fn requeue_due(&self) -> Result<u64, AppError>;

    /// Release expired leases. A job with attempts left becomes `failed-retryable`
    /// after the usual backoff; otherwise it fails terminally.
    async fn reap_expired_leases(
        &self,
        backoff_base: Duration,
        max_backoff: Duration,
    ) -> Result<u64, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

pub(crate) fn lease_lost(job_id: Uuid, worker_id: &str) -> AppError {
    AppError::Internal(format!(
        "Worker {} no longer holds the lease on job {}",
        worker_id, job_id
    ))
}

const JOB_COLUMNS: &str = "job_id, content_id, file_name, state, attempts, max_attempts, \
     last_error, remote_urn, lease_owner, lease_expires_at, run_after, requested_by, result, \
     created_at, updated_at";

#[derive(Clone)]
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn active_for_content(
        &self,
        content_id: &str,
    ) -> Result<Option<TranslationJob>, AppError> {
        let job = sqlx::query_as::<Postgres, TranslationJob>(&format!(
            "SELECT {} FROM translation_jobs WHERE content_id = $1 AND state <> 'failed-terminal'",
            JOB_COLUMNS
        ))
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    #[tracing::instrument(skip(self, job), fields(job_id = %job.job_id, content_id = %job.content_id))]
    async fn enqueue(&self, job: TranslationJob) -> Result<EnqueueOutcome, AppError> {
        // The partial unique index arbitrates concurrent enqueues; a loser reads the winner
        for _ in 0..3 {
            let inserted = sqlx::query_as::<Postgres, TranslationJob>(&format!(
                r#"
                INSERT INTO translation_jobs (
                    job_id, content_id, file_name, state, attempts, max_attempts,
                    run_after, requested_by
                )
                VALUES ($1, $2, $3, 'queued', 0, $4, NOW(), $5)
                ON CONFLICT (content_id) WHERE state <> 'failed-terminal' DO NOTHING
                RETURNING {}
                "#,
                JOB_COLUMNS
            ))
            .bind(job.job_id)
            .bind(&job.content_id)
            .bind(&job.file_name)
            .bind(job.max_attempts)
            .bind(&job.requested_by)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(created) = inserted {
                tracing::info!(
                    job_id = %created.job_id,
                    content_id = %created.content_id,
                    "Translation job queued"
                );
                return Ok(EnqueueOutcome::Created(created));
            }
            if let Some(existing) = self.active_for_content(&job.content_id).await? {
                return Ok(EnqueueOutcome::Existing(existing));
            }
            // The conflicting job went terminal in between; try inserting again
        }
        Err(AppError::Internal(format!(
            "Could not enqueue translation for content {}",
            job.content_id
        )))
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, job_id: Uuid) -> Result<Option<TranslationJob>, AppError> {
        let job = sqlx::query_as::<Postgres, TranslationJob>(&format!(
            "SELECT {} FROM translation_jobs WHERE job_id = $1",
            JOB_COLUMNS
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    #[tracing::instrument(skip(self))]
    async fn latest_for_content(
        &self,
        content_id: &str,
    ) -> Result<Option<TranslationJob>, AppError> {
        let job = sqlx::query_as::<Postgres, TranslationJob>(&format!(
            "SELECT {} FROM translation_jobs WHERE content_id = $1 ORDER BY created_at DESC LIMIT 1",
            JOB_COLUMNS
        ))
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    #[tracing::instrument(skip(self))]
    async fn lease_next(
        &self,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<TranslationJob>, AppError> {
        let job = sqlx::query_as::<Postgres, TranslationJob>(&format!(
            r#"
            UPDATE translation_jobs
            SET lease_owner = $1,
                lease_expires_at = NOW() + make_interval(secs => $2),
                attempts = attempts + 1,
                updated_at = NOW()
            WHERE job_id = (
                SELECT job_id
                FROM translation_jobs
                WHERE state = 'queued'
                    AND run_after <= NOW()
                    AND attempts < max_attempts
                    AND (lease_owner IS NULL OR lease_expires_at < NOW())
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(worker_id)
        .bind(lease.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(ref job) = job {
            tracing::debug!(
                job_id = %job.job_id,
                worker_id = %worker_id,
                attempt = job.attempts,
                "Job leased"
            );
        }
        Ok(job)
    }

    #[tracing::instrument(skip(self))]
    async fn mark_running(
        &self,
        job_id: Uuid,
        worker_id: &str,
        remote_urn: &str,
    ) -> Result<TranslationJob, AppError> {
        sqlx::query_as::<Postgres, TranslationJob>(&format!(
            r#"
            UPDATE translation_jobs
            SET state = 'running', remote_urn = $3, updated_at = NOW()
            WHERE job_id = $1 AND lease_owner = $2 AND state = 'queued'
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(job_id)
        .bind(worker_id)
        .bind(remote_urn)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| lease_lost(job_id, worker_id))
    }

    #[tracing::instrument(skip(self, result))]
    async fn mark_succeeded(
        &self,
        job_id: Uuid,
        worker_id: &str,
        result: serde_json::Value,
    ) -> Result<TranslationJob, AppError> {
        let job = sqlx::query_as::<Postgres, TranslationJob>(&format!(
            r#"
            UPDATE translation_jobs
            SET state = 'succeeded',
                result = $3,
                last_error = NULL,
                lease_owner = NULL,
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE job_id = $1 AND lease_owner = $2 AND state IN ('queued', 'running')
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(job_id)
        .bind(worker_id)
        .bind(result)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| lease_lost(job_id, worker_id))?;

        tracing::info!(job_id = %job_id, content_id = %job.content_id, "Translation job succeeded");
        Ok(job)
    }

    #[tracing::instrument(skip(self, error))]
    async fn mark_failed(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<TranslationJob, AppError> {
        let state = match retry_at {
            Some(_) => JobState::FailedRetryable,
            None => JobState::FailedTerminal,
        };
        let job = sqlx::query_as::<Postgres, TranslationJob>(&format!(
            r#"
            UPDATE translation_jobs
            SET state = $3,
                last_error = $4,
                run_after = COALESCE($5, run_after),
                lease_owner = NULL,
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE job_id = $1 AND lease_owner = $2 AND state IN ('queued', 'running')
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(job_id)
        .bind(worker_id)
        .bind(state.as_str())
        .bind(error)
        .bind(retry_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| lease_lost(job_id, worker_id))?;

        tracing::warn!(
            job_id = %job_id,
            state = %state,
            attempts = job.attempts,
            error = %error,
            "Translation job failed"
        );
        Ok(job)
    }

    async fn requeue_due(&self) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE translation_jobs
            SET state = 'queued', updated_at = NOW()
            WHERE state = 'failed-retryable' AND run_after <= NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn reap_expired_leases(
        &self,
        backoff_base: Duration,
        max_backoff: Duration,
    ) -> Result<u64, AppError> {
        // Same curve as compute_retry_backoff: base * 2^(attempts-1), capped
        let result = sqlx::query(
            r#"
            UPDATE translation_jobs
            SET state = CASE WHEN attempts >= max_attempts
                             THEN 'failed-terminal' ELSE 'failed-retryable' END,
                last_error = 'Lease expired before the worker reported an outcome',
                run_after = NOW() + make_interval(secs => LEAST(
                    $1::float8 * POWER(2, LEAST(GREATEST(attempts - 1, 0), 30)),
                    $2::float8
                )),
                lease_owner = NULL,
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE lease_owner IS NOT NULL
                AND lease_expires_at < NOW()
                AND state IN ('queued', 'running')
            "#,
        )
        .bind(backoff_base.as_secs_f64())
        .bind(max_backoff.as_secs_f64())
        .execute(&self.pool)
        .await?;

        let reaped = result.rows_affected();
        if reaped > 0 {
            tracing::warn!(reaped, "Released expired job leases");
        }
        Ok(reaped)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
