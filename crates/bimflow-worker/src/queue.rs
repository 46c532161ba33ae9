//! Job queue: worker pool, polling with an in-process wake-up, retry with
//! backoff, and the lease reaper.
//!
//! Shutdown: [`JobQueue::shutdown`] stops claiming new jobs and waits a
//! bounded time for in-flight handlers. Jobs still running after that keep
//! their lease until the reaper releases it.

use anyhow::Result;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use uuid::Uuid;

use bimflow_core::models::{compute_retry_backoff, TranslationJob};
use bimflow_core::task_error::is_unrecoverable;
use bimflow_core::{AppError, Config};
use bimflow_db::{EnqueueOutcome, JobRepository};

use crate::context::{JobHandler, JobLease};

#[derive(Debug, Clone)]
pub struct JobQueueConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub max_attempts: i32,
    pub job_timeout: Duration,
    /// Must exceed `job_timeout` so a live handler never loses its lease.
    pub lease_duration: Duration,
    pub backoff_base: Duration,
    pub max_backoff: Duration,
    /// Interval between runs of the expired lease reaper.
    pub reap_interval: Duration,
    /// How long `shutdown` waits for in-flight handlers.
    pub shutdown_grace: Duration,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            poll_interval_ms: 1000,
            max_attempts: 3,
            job_timeout: Duration::from_secs(1800),
            lease_duration: Duration::from_secs(2100),
            backoff_base: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
            reap_interval: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl JobQueueConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_workers: config.job_max_workers(),
            poll_interval_ms: config.job_poll_interval_ms(),
            max_attempts: config.job_max_attempts(),
            job_timeout: config.job_timeout(),
            lease_duration: config.job_lease(),
            backoff_base: config.job_backoff_base(),
            max_backoff: config.job_max_backoff(),
            ..Default::default()
        }
    }
}

struct Pool {
    repository: Arc<dyn JobRepository>,
    handler: Arc<dyn JobHandler>,
    config: JobQueueConfig,
    semaphore: Arc<Semaphore>,
    notify: Arc<Notify>,
    pool_id: String,
    lease_seq: AtomicU64,
}

pub struct JobQueue {
    repository: Arc<dyn JobRepository>,
    config: JobQueueConfig,
    notify: Arc<Notify>,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl JobQueue {
    /// Create the queue and spawn its worker pool.
    pub fn new(
        repository: Arc<dyn JobRepository>,
        config: JobQueueConfig,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let notify = Arc::new(Notify::new());

        let pool = Arc::new(Pool {
            repository: repository.clone(),
            handler,
            semaphore: Arc::new(Semaphore::new(config.max_workers)),
            notify: notify.clone(),
            pool_id: Uuid::new_v4().simple().to_string()[..8].to_string(),
            lease_seq: AtomicU64::new(0),
            config: config.clone(),
        });
        let worker = tokio::spawn(Pool::run(pool, shutdown_rx));

        Self {
            repository,
            config,
            notify,
            shutdown_tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// A queue that only records jobs; another process's pool runs them.
    pub fn new_no_worker(repository: Arc<dyn JobRepository>, config: JobQueueConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            repository,
            config,
            notify: Arc::new(Notify::new()),
            shutdown_tx,
            worker: Mutex::new(None),
        }
    }

    pub fn repository(&self) -> &Arc<dyn JobRepository> {
        &self.repository
    }

    /// Queue a translation unless one already covers `content_id`.
    #[tracing::instrument(skip(self))]
    pub async fn enqueue(
        &self,
        content_id: &str,
        file_name: &str,
        requested_by: &str,
    ) -> Result<EnqueueOutcome, AppError> {
        let job = TranslationJob::new(content_id, file_name, self.config.max_attempts, requested_by);
        let outcome = self.repository.enqueue(job).await?;

        match &outcome {
            EnqueueOutcome::Created(job) => {
                tracing::info!(job_id = %job.job_id, content_id = %content_id, "Translation job submitted to queue");
                self.notify.notify_one();
            }
            EnqueueOutcome::Existing(job) => {
                tracing::debug!(job_id = %job.job_id, state = %job.state, "Translation job already exists");
            }
        }
        Ok(outcome)
    }

    pub async fn get(&self, job_id: Uuid) -> Result<Option<TranslationJob>, AppError> {
        self.repository.get(job_id).await
    }

    pub async fn latest_for_content(
        &self,
        content_id: &str,
    ) -> Result<Option<TranslationJob>, AppError> {
        self.repository.latest_for_content(content_id).await
    }

    /// Stop claiming jobs and wait for the pool to drain.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating job queue shutdown");
        let _ = self.shutdown_tx.send(true);
        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Job queue worker pool panicked");
            }
        }
    }
}

impl Pool {
    async fn run(pool: Arc<Pool>, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!(
            pool_id = %pool.pool_id,
            max_workers = pool.config.max_workers,
            poll_interval_ms = pool.config.poll_interval_ms,
            "Job queue worker pool started"
        );

        let poll_interval = Duration::from_millis(pool.config.poll_interval_ms);
        let mut reap_interval = tokio::time::interval(pool.config.reap_interval);
        reap_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    tracing::info!("Job queue worker pool shutting down");
                    break;
                }
                _ = pool.notify.notified() => {
                    pool.claim_and_dispatch_one().await;
                }
                _ = reap_interval.tick() => {
                    match pool
                        .repository
                        .reap_expired_leases(pool.config.backoff_base, pool.config.max_backoff)
                        .await
                    {
                        Ok(0) => {}
                        Ok(reaped) => tracing::warn!(reaped, "Reaped expired job leases"),
                        Err(e) => tracing::error!(error = %e, "Lease reaper failed"),
                    }
                }
                _ = sleep(poll_interval) => {
                    if let Err(e) = pool.repository.requeue_due().await {
                        tracing::error!(error = %e, "Failed to requeue due jobs");
                    }
                    pool.claim_and_dispatch_one().await;
                }
            }
        }

        // Wait for in-flight handlers by taking every permit
        let workers = u32::try_from(pool.config.max_workers).unwrap_or(u32::MAX);
        match tokio::time::timeout(
            pool.config.shutdown_grace,
            pool.semaphore.acquire_many(workers),
        )
        .await
        {
            Ok(_) => tracing::info!("Job queue worker pool stopped"),
            Err(_) => tracing::warn!(
                grace_secs = pool.config.shutdown_grace.as_secs(),
                "Job queue stopped with handlers still running"
            ),
        }
    }

    fn next_worker_id(&self) -> String {
        let seq = self.lease_seq.fetch_add(1, Ordering::Relaxed);
        format!("worker-{}-{}", self.pool_id, seq)
    }

    async fn claim_and_dispatch_one(self: &Arc<Self>) {
        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return;
            }
        };

        let worker_id = self.next_worker_id();
        match self
            .repository
            .lease_next(&worker_id, self.config.lease_duration)
            .await
        {
            Ok(Some(job)) => {
                let pool = self.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = pool.process_job(job, worker_id).await {
                        tracing::error!(error = %e, "Failed to record job outcome");
                    }
                    // Another job may be waiting behind this one
                    pool.notify.notify_one();
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No jobs available in queue");
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Failed to lease job from queue");
            }
        }
    }

    #[tracing::instrument(skip(self, job), fields(job_id = %job.job_id, content_id = %job.content_id, attempt = job.attempts))]
    async fn process_job(&self, job: TranslationJob, worker_id: String) -> Result<(), AppError> {
        let lease = JobLease::new(self.repository.clone(), job.job_id, worker_id.clone());
        let started = tokio::time::Instant::now();

        let result = tokio::time::timeout(self.config.job_timeout, self.handler.handle(&job, &lease)).await;

        let (error, recoverable) = match result {
            Ok(Ok(value)) => {
                self.repository
                    .mark_succeeded(job.job_id, &worker_id, value)
                    .await?;
                tracing::info!(
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Job completed successfully"
                );
                return Ok(());
            }
            Ok(Err(e)) => {
                let unrecoverable = is_unrecoverable(&e);
                tracing::error!(
                    error = %e,
                    attempts = job.attempts,
                    max_attempts = job.max_attempts,
                    unrecoverable,
                    "Job execution failed"
                );
                (format!("{:#}", e), !unrecoverable)
            }
            Err(_) => {
                tracing::error!(
                    timeout_secs = self.config.job_timeout.as_secs(),
                    "Job execution timed out"
                );
                (
                    format!(
                        "Job execution timed out after {}s",
                        self.config.job_timeout.as_secs()
                    ),
                    true,
                )
            }
        };

        let retry_at = if recoverable && job.can_retry() {
            let backoff = compute_retry_backoff(
                self.config.backoff_base,
                self.config.max_backoff,
                job.attempts,
            );
            tracing::info!(
                backoff_ms = backoff.as_millis() as u64,
                next_attempt = job.attempts + 1,
                "Scheduling job retry"
            );
            chrono::Duration::from_std(backoff)
                .ok()
                .map(|backoff| Utc::now() + backoff)
        } else {
            None
        };

        self.repository
            .mark_failed(job.job_id, &worker_id, &error, retry_at)
            .await?;
        Ok(())
    }
}
