//! In-process repositories for running without PostgreSQL.
//!
//! A single mutex per repository makes every operation atomic inside this
//! process. Nothing here is shared with other processes or survives a
//! restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use bimflow_core::models::{
    compute_retry_backoff, ContentRecord, JobState, NewContentRecord, TranslationJob,
};
use bimflow_core::AppError;

use crate::content::ContentRepository;
use crate::jobs::{lease_lost, EnqueueOutcome, JobRepository};

#[derive(Default)]
pub struct MemoryContentRepository {
    records: Mutex<HashMap<String, ContentRecord>>,
}

impl MemoryContentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentRepository for MemoryContentRepository {
    async fn get(&self, content_id: &str) -> Result<Option<ContentRecord>, AppError> {
        Ok(self.records.lock().await.get(content_id).cloned())
    }

    async fn insert_if_absent(
        &self,
        record: NewContentRecord,
    ) -> Result<(ContentRecord, bool), AppError> {
        let mut records = self.records.lock().await;
        if let Some(existing) = records.get(&record.content_id) {
            return Ok((existing.clone(), false));
        }
        let created = record.into_record(Utc::now());
        records.insert(created.content_id.clone(), created.clone());
        Ok((created, true))
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryJobRepository {
    jobs: Mutex<HashMap<Uuid, TranslationJob>>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn holder_mut<'a>(
    jobs: &'a mut HashMap<Uuid, TranslationJob>,
    job_id: Uuid,
    worker_id: &str,
) -> Result<&'a mut TranslationJob, AppError> {
    match jobs.get_mut(&job_id) {
        Some(job)
            if job.lease_owner.as_deref() == Some(worker_id)
                && matches!(job.state, JobState::Queued | JobState::Running) =>
        {
            Ok(job)
        }
        Some(_) => Err(lease_lost(job_id, worker_id)),
        None => Err(AppError::NotFound(format!("Job {} not found", job_id))),
    }
}

fn release(job: &mut TranslationJob, now: DateTime<Utc>) {
    job.lease_owner = None;
    job.lease_expires_at = None;
    job.updated_at = now;
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn enqueue(&self, job: TranslationJob) -> Result<EnqueueOutcome, AppError> {
        let mut jobs = self.jobs.lock().await;
        if let Some(existing) = jobs
            .values()
            .find(|j| j.content_id == job.content_id && j.state.is_active_or_done())
        {
            return Ok(EnqueueOutcome::Existing(existing.clone()));
        }
        tracing::info!(
            job_id = %job.job_id,
            content_id = %job.content_id,
            "Translation job queued"
        );
        jobs.insert(job.job_id, job.clone());
        Ok(EnqueueOutcome::Created(job))
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<TranslationJob>, AppError> {
        Ok(self.jobs.lock().await.get(&job_id).cloned())
    }

    async fn latest_for_content(
        &self,
        content_id: &str,
    ) -> Result<Option<TranslationJob>, AppError> {
        Ok(self
            .jobs
            .lock()
            .await
            .values()
            .filter(|j| j.content_id == content_id)
            .max_by_key(|j| j.created_at)
            .cloned())
    }

    async fn lease_next(
        &self,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<TranslationJob>, AppError> {
        let now = Utc::now();
        let lease = chrono::Duration::from_std(lease)
            .map_err(|e| AppError::InvalidInput(format!("Invalid lease duration: {}", e)))?;

        let mut jobs = self.jobs.lock().await;
        let next = jobs
            .values_mut()
            .filter(|j| j.is_leasable(now))
            .min_by_key(|j| j.created_at);

        Ok(next.map(|job| {
            job.lease_owner = Some(worker_id.to_string());
            job.lease_expires_at = Some(now + lease);
            job.attempts += 1;
            job.updated_at = now;
            job.clone()
        }))
    }

    async fn mark_running(
        &self,
        job_id: Uuid,
        worker_id: &str,
        remote_urn: &str,
    ) -> Result<TranslationJob, AppError> {
        let mut jobs = self.jobs.lock().await;
        let job = holder_mut(&mut jobs, job_id, worker_id)?;
        if job.state != JobState::Queued {
            return Err(lease_lost(job_id, worker_id));
        }
        job.state = JobState::Running;
        job.remote_urn = Some(remote_urn.to_string());
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn mark_succeeded(
        &self,
        job_id: Uuid,
        worker_id: &str,
        result: serde_json::Value,
    ) -> Result<TranslationJob, AppError> {
        let mut jobs = self.jobs.lock().await;
        let job = holder_mut(&mut jobs, job_id, worker_id)?;
        job.state = JobState::Succeeded;
        job.result = Some(result);
        job.last_error = None;
        release(job, Utc::now());
        tracing::info!(job_id = %job_id, content_id = %job.content_id, "Translation job succeeded");
        Ok(job.clone())
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<TranslationJob, AppError> {
        let mut jobs = self.jobs.lock().await;
        let job = holder_mut(&mut jobs, job_id, worker_id)?;
        match retry_at {
            Some(at) => {
                job.state = JobState::FailedRetryable;
                job.run_after = at;
            }
            None => job.state = JobState::FailedTerminal,
        }
        job.last_error = Some(error.to_string());
        release(job, Utc::now());
        tracing::warn!(
            job_id = %job_id,
            state = %job.state,
            attempts = job.attempts,
            error = %error,
            "Translation job failed"
        );
        Ok(job.clone())
    }

    async fn requeue_due(&self) -> Result<u64, AppError> {
        let now = Utc::now();
        let mut count = 0;
        for job in self.jobs.lock().await.values_mut() {
            if job.state == JobState::FailedRetryable && job.run_after <= now {
                job.state = JobState::Queued;
                job.updated_at = now;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn reap_expired_leases(
        &self,
        backoff_base: Duration,
        max_backoff: Duration,
    ) -> Result<u64, AppError> {
        let now = Utc::now();
        let mut count = 0;
        for job in self.jobs.lock().await.values_mut() {
            let expired = job.lease_owner.is_some()
                && job.lease_expires_at.map(|at| at < now).unwrap_or(true)
                && matches!(job.state, JobState::Queued | JobState::Running);
            if !expired {
                continue;
            }
            if job.can_retry() {
                let backoff = compute_retry_backoff(backoff_base, max_backoff, job.attempts);
                job.state = JobState::FailedRetryable;
                job.run_after = chrono::Duration::from_std(backoff)
                    .map(|backoff| now + backoff)
                    .unwrap_or(now);
            } else {
                job.state = JobState::FailedTerminal;
            }
            job.last_error = Some("Lease expired before the worker reported an outcome".to_string());
            release(job, now);
            count += 1;
        }
        if count > 0 {
            tracing::warn!(reaped = count, "Released expired job leases");
        }
        Ok(count)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn job(content_id: &str, max_attempts: i32) -> TranslationJob {
        TranslationJob::new(content_id, "tower.ifc", max_attempts, "anonymous")
    }

    const LEASE: Duration = Duration::from_secs(60);
    const NO_BACKOFF: Duration = Duration::from_millis(0);

    #[tokio::test]
    async fn content_insert_is_idempotent() {
        let repo = MemoryContentRepository::new();
        let record = NewContentRecord {
            content_id: "abc".to_string(),
            original_name: "a.ifc".to_string(),
            size: 3,
            content_type: "application/ifc".to_string(),
            storage_key: "content/ab/c/abc.ifc".to_string(),
        };

        let (first, created) = repo.insert_if_absent(record.clone()).await.unwrap();
        assert!(created);
        let (second, created) = repo
            .insert_if_absent(NewContentRecord {
                original_name: "renamed.ifc".to_string(),
                ..record
            })
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first, second);
        assert_eq!(second.original_name, "a.ifc");
    }

    #[tokio::test]
    async fn enqueue_deduplicates_per_content() {
        let repo = MemoryJobRepository::new();

        let first = repo.enqueue(job("abc", 3)).await.unwrap();
        let second = repo.enqueue(job("abc", 3)).await.unwrap();

        assert!(first.is_created());
        assert!(!second.is_created());
        assert_eq!(first.job().job_id, second.job().job_id);
    }

    #[tokio::test]
    async fn enqueue_after_terminal_failure_creates_new_job() {
        let repo = MemoryJobRepository::new();
        let first = repo.enqueue(job("abc", 1)).await.unwrap().into_job();
        let leased = repo.lease_next("w1", LEASE).await.unwrap().unwrap();
        repo.mark_failed(leased.job_id, "w1", "rejected", None)
            .await
            .unwrap();

        let second = repo.enqueue(job("abc", 1)).await.unwrap();

        assert!(second.is_created());
        assert_ne!(second.job().job_id, first.job_id);
        let latest = repo.latest_for_content("abc").await.unwrap().unwrap();
        assert_eq!(latest.job_id, second.job().job_id);
    }

    #[tokio::test]
    async fn concurrent_workers_never_share_a_lease() {
        let repo = Arc::new(MemoryJobRepository::new());
        for i in 0..5 {
            repo.enqueue(job(&format!("c{}", i), 3)).await.unwrap();
        }

        let mut handles = Vec::new();
        for w in 0..20 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.lease_next(&format!("w{}", w), LEASE).await.unwrap()
            }));
        }
        let mut leased = Vec::new();
        for handle in handles {
            if let Some(job) = handle.await.unwrap() {
                leased.push(job.job_id);
            }
        }

        leased.sort();
        leased.dedup();
        assert_eq!(leased.len(), 5);
    }

    #[tokio::test]
    async fn only_lease_holder_may_transition() {
        let repo = MemoryJobRepository::new();
        repo.enqueue(job("abc", 3)).await.unwrap();
        let leased = repo.lease_next("w1", LEASE).await.unwrap().unwrap();
        assert_eq!(leased.attempts, 1);
        assert_eq!(leased.state, JobState::Queued);

        assert!(repo.mark_running(leased.job_id, "w2", "urn").await.is_err());

        let running = repo.mark_running(leased.job_id, "w1", "urn").await.unwrap();
        assert_eq!(running.state, JobState::Running);
        assert_eq!(running.remote_urn.as_deref(), Some("urn"));
    }

    #[tokio::test]
    async fn retryable_failure_requeues_when_due() {
        let repo = MemoryJobRepository::new();
        repo.enqueue(job("abc", 3)).await.unwrap();
        let leased = repo.lease_next("w1", LEASE).await.unwrap().unwrap();

        let failed = repo
            .mark_failed(
                leased.job_id,
                "w1",
                "breaker open",
                Some(Utc::now() - chrono::Duration::seconds(1)),
            )
            .await
            .unwrap();
        assert_eq!(failed.state, JobState::FailedRetryable);
        assert!(repo.lease_next("w1", LEASE).await.unwrap().is_none());

        assert_eq!(repo.requeue_due().await.unwrap(), 1);
        let again = repo.lease_next("w1", LEASE).await.unwrap().unwrap();
        assert_eq!(again.attempts, 2);
        assert_eq!(again.last_error.as_deref(), Some("breaker open"));
    }

    #[tokio::test]
    async fn expired_lease_is_reaped() {
        let repo = MemoryJobRepository::new();
        repo.enqueue(job("abc", 1)).await.unwrap();
        let leased = repo
            .lease_next("w1", Duration::from_millis(0))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(repo.reap_expired_leases(NO_BACKOFF, NO_BACKOFF).await.unwrap(), 1);

        let job = repo.get(leased.job_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::FailedTerminal);
        assert!(job.lease_owner.is_none());
        assert!(repo.mark_succeeded(leased.job_id, "w1", serde_json::json!({})).await.is_err());
    }

    #[tokio::test]
    async fn reaped_job_with_attempts_left_is_leased_again() {
        let repo = MemoryJobRepository::new();
        repo.enqueue(job("abc", 3)).await.unwrap();
        repo.lease_next("w1", Duration::from_millis(0))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(repo.reap_expired_leases(NO_BACKOFF, NO_BACKOFF).await.unwrap(), 1);
        assert_eq!(repo.requeue_due().await.unwrap(), 1);

        let again = repo.lease_next("w2", LEASE).await.unwrap().unwrap();
        assert_eq!(again.attempts, 2);
        assert_eq!(again.lease_owner.as_deref(), Some("w2"));
    }

    #[tokio::test]
    async fn reaped_running_job_waits_out_backoff_before_requeue() {
        let repo = MemoryJobRepository::new();
        repo.enqueue(job("abc", 3)).await.unwrap();
        let leased = repo
            .lease_next("w1", Duration::from_millis(1))
            .await
            .unwrap()
            .unwrap();
        repo.mark_running(leased.job_id, "w1", "dXJu").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let before = Utc::now();
        let reaped = repo
            .reap_expired_leases(Duration::from_secs(60), Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(reaped, 1);

        let job = repo.get(leased.job_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::FailedRetryable);
        assert_eq!(job.attempts, 1);
        assert!(job.lease_owner.is_none());
        assert!(job.run_after >= before + chrono::Duration::seconds(59));

        // Not due yet: stays out of the queue
        assert_eq!(repo.requeue_due().await.unwrap(), 0);
        assert!(repo.lease_next("w2", LEASE).await.unwrap().is_none());
    }
}
