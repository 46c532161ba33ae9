//! Translation job handler: upload → submit → poll → cache.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use bimflow_core::models::TranslationJob;
use bimflow_core::{Config, TaskError};
use bimflow_db::ContentRepository;
use bimflow_storage::Storage;
use bimflow_translation::{
    derive_quantities, CachingTranslationClient, TranslationClient, TranslationError,
};
use bimflow_worker::{JobHandler, JobLease};

const POLL_BACKOFF_FACTOR: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct TranslationHandlerConfig {
    pub poll_initial: Duration,
    pub poll_max: Duration,
    /// Give up polling after this long; the job is retried later.
    pub poll_deadline: Duration,
}

impl TranslationHandlerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_initial: config.forge_poll_initial(),
            poll_max: config.forge_poll_max(),
            // Leave room to record the outcome before the pool's own timeout fires
            poll_deadline: config.job_timeout().mul_f64(0.9),
        }
    }
}

/// Remote status of a translation, read from `manifest.status`.
#[derive(Debug, PartialEq, Eq)]
enum ManifestStatus {
    Success,
    Failed,
    Timeout,
    Pending,
}

impl ManifestStatus {
    fn of(manifest: &Value) -> Self {
        match manifest.get("status").and_then(Value::as_str) {
            Some("success") => ManifestStatus::Success,
            Some("failed") => ManifestStatus::Failed,
            Some("timeout") => ManifestStatus::Timeout,
            _ => ManifestStatus::Pending,
        }
    }
}

/// Errors the remote will answer the same way next time skip the retries.
fn classify(err: TranslationError) -> anyhow::Error {
    if err.is_transient() {
        anyhow::Error::new(err)
    } else {
        TaskError::unrecoverable(err).into()
    }
}

/// First human-readable message in a failed manifest, if any.
fn failure_message(manifest: &Value) -> String {
    manifest
        .get("derivatives")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|d| d.get("messages").and_then(Value::as_array))
        .flatten()
        .find_map(|m| m.get("message").and_then(Value::as_str))
        .unwrap_or("no message from translation service")
        .to_string()
}

pub struct TranslationTaskHandler {
    storage: Arc<dyn Storage>,
    contents: Arc<dyn ContentRepository>,
    client: Arc<TranslationClient>,
    results: Arc<CachingTranslationClient>,
    config: TranslationHandlerConfig,
}

impl TranslationTaskHandler {
    pub fn new(
        storage: Arc<dyn Storage>,
        contents: Arc<dyn ContentRepository>,
        client: Arc<TranslationClient>,
        results: Arc<CachingTranslationClient>,
        config: TranslationHandlerConfig,
    ) -> Self {
        Self {
            storage,
            contents,
            client,
            results,
            config,
        }
    }

    /// Upload the blob and submit it; returns the remote URN.
    async fn submit(&self, job: &TranslationJob) -> Result<String> {
        let record = self
            .contents
            .get(&job.content_id)
            .await?
            .ok_or_else(|| {
                TaskError::unrecoverable(anyhow::anyhow!(
                    "Content {} is not in the content index",
                    job.content_id
                ))
            })?;

        let data = self
            .storage
            .get(&record.storage_key)
            .await
            .with_context(|| format!("Failed to read blob {}", record.storage_key))?;

        // Remote object names are content addressed, so a re-upload overwrites the same object
        let object_name = record
            .storage_key
            .rsplit('/')
            .next()
            .unwrap_or(&record.content_id)
            .to_string();

        self.client
            .ensure_bucket(self.client.bucket())
            .await
            .map_err(classify)?;
        let object_id = self
            .client
            .upload_blob(data, &object_name)
            .await
            .map_err(classify)?;
        let urn = self
            .client
            .submit_translation(&object_id, &job.file_name)
            .await
            .map_err(classify)?;
        Ok(urn)
    }

    /// Poll the manifest until the remote reports a terminal status.
    async fn wait_for_manifest(&self, job: &TranslationJob, urn: &str) -> Result<Value> {
        let deadline = Instant::now() + self.config.poll_deadline;
        let mut delay = self.config.poll_initial;

        loop {
            let manifest = self.client.manifest(urn).await.map_err(classify)?;
            match ManifestStatus::of(&manifest) {
                ManifestStatus::Success => return Ok(manifest),
                ManifestStatus::Failed => {
                    return Err(TaskError::unrecoverable(anyhow::anyhow!(
                        "Translation failed: {}",
                        failure_message(&manifest)
                    ))
                    .into());
                }
                ManifestStatus::Timeout => {
                    return Err(TaskError::unrecoverable(anyhow::anyhow!(
                        "Translation service timed out processing the model"
                    ))
                    .into());
                }
                ManifestStatus::Pending => {}
            }

            tracing::debug!(
                job_id = %job.job_id,
                progress = manifest.get("progress").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
                next_poll_ms = delay.as_millis() as u64,
                "Translation in progress"
            );

            if Instant::now() + delay > deadline {
                anyhow::bail!(
                    "Translation still in progress after {}s",
                    self.config.poll_deadline.as_secs()
                );
            }
            tokio::time::sleep(delay).await;
            delay = delay.mul_f64(POLL_BACKOFF_FACTOR).min(self.config.poll_max);
        }
    }
}

#[async_trait]
impl JobHandler for TranslationTaskHandler {
    #[tracing::instrument(skip(self, job, lease), fields(job_id = %job.job_id, content_id = %job.content_id))]
    async fn handle(&self, job: &TranslationJob, lease: &JobLease) -> Result<Value> {
        let urn = match &job.remote_urn {
            Some(urn) => {
                tracing::info!(urn = %urn, attempt = job.attempts, "Resuming translation");
                urn.clone()
            }
            None => self.submit(job).await?,
        };
        lease.mark_running(&urn).await?;

        let manifest = self.wait_for_manifest(job, &urn).await?;

        let properties = self.client.properties(&urn).await.map_err(classify)?;
        let quantities = derive_quantities(&properties);
        let summary = json!({
            "urn": urn,
            "status": "success",
            "objects": quantities.counts.iter().map(|c| c.count).sum::<u64>(),
            "categories": quantities.counts.len(),
        });

        // Results are cached before the job is marked succeeded
        self.results
            .store_results(&job.content_id, manifest, properties, &quantities)
            .await
            .map_err(classify)?;

        tracing::info!(urn = %urn, "Translation results cached");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_status_parsing() {
        assert_eq!(ManifestStatus::of(&json!({"status": "success"})), ManifestStatus::Success);
        assert_eq!(ManifestStatus::of(&json!({"status": "failed"})), ManifestStatus::Failed);
        assert_eq!(ManifestStatus::of(&json!({"status": "inprogress"})), ManifestStatus::Pending);
        assert_eq!(ManifestStatus::of(&json!({})), ManifestStatus::Pending);
    }

    #[test]
    fn failure_message_comes_from_derivatives() {
        let manifest = json!({
            "status": "failed",
            "derivatives": [
                {"status": "failed", "messages": [{"type": "error", "message": "Unsupported IFC schema"}]}
            ]
        });
        assert_eq!(failure_message(&manifest), "Unsupported IFC schema");
        assert_eq!(
            failure_message(&json!({"status": "failed"})),
            "no message from translation service"
        );
    }

    #[test]
    fn client_errors_are_unrecoverable() {
        let rejected = classify(TranslationError::remote(Some(400), "bad urn"));
        assert!(bimflow_core::task_error::is_unrecoverable(&rejected));

        let open = classify(TranslationError::BreakerOpen {
            name: "manifest".into(),
        });
        assert!(!bimflow_core::task_error::is_unrecoverable(&open));
    }
}
