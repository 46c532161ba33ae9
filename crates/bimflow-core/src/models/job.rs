use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle of a translation job.
///
/// `queued → running → {succeeded | failed-retryable → queued | failed-terminal}`.
/// A job becomes `running` only once the remote translator accepted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    FailedRetryable,
    FailedTerminal,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::FailedTerminal)
    }

    /// States that block a second job for the same content.
    pub fn is_active_or_done(&self) -> bool {
        !matches!(self, JobState::FailedTerminal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::FailedRetryable => "failed-retryable",
            JobState::FailedTerminal => "failed-terminal",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobState::Queued),
            "running" => Ok(JobState::Running),
            "succeeded" => Ok(JobState::Succeeded),
            "failed-retryable" => Ok(JobState::FailedRetryable),
            "failed-terminal" => Ok(JobState::FailedTerminal),
            other => Err(format!("Unknown job state: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationJob {
    pub job_id: Uuid,
    pub content_id: String,
    pub file_name: String,
    pub state: JobState,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    /// Remote handle (URN) once the translation was submitted.
    pub remote_urn: Option<String>,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub run_after: DateTime<Utc>,
    pub requested_by: String,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for TranslationJob {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(TranslationJob {
            job_id: row.try_get("job_id")?,
            content_id: row.try_get("content_id")?,
            file_name: row.try_get("file_name")?,
            state: row.try_get::<String, _>("state")?.parse().map_err(|e: String| {
                sqlx::Error::Decode(format!("Failed to parse job state: {}", e).into())
            })?,
            attempts: row.try_get("attempts")?,
            max_attempts: row.try_get("max_attempts")?,
            last_error: row.try_get("last_error")?,
            remote_urn: row.try_get("remote_urn")?,
            lease_owner: row.try_get("lease_owner")?,
            lease_expires_at: row.try_get("lease_expires_at")?,
            run_after: row.try_get("run_after")?,
            requested_by: row.try_get("requested_by")?,
            result: row.try_get("result")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// `base * 2^(attempt-1)`, capped at `max`.
pub fn compute_retry_backoff(base: Duration, max: Duration, attempt: i32) -> Duration {
    let exponent = attempt.saturating_sub(1).clamp(0, 30) as u32;
    base.saturating_mul(2_u32.pow(exponent)).min(max)
}

impl TranslationJob {
    pub fn new(
        content_id: impl Into<String>,
        file_name: impl Into<String>,
        max_attempts: i32,
        requested_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            content_id: content_id.into(),
            file_name: file_name.into(),
            state: JobState::Queued,
            attempts: 0,
            max_attempts,
            last_error: None,
            remote_urn: None,
            lease_owner: None,
            lease_expires_at: None,
            run_after: now,
            requested_by: requested_by.into(),
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub fn has_live_lease(&self, now: DateTime<Utc>) -> bool {
        self.lease_owner.is_some() && self.lease_expires_at.map(|at| at > now).unwrap_or(false)
    }

    /// Eligible for `Lease()`: queued, due, attempts left, and not held by another worker.
    pub fn is_leasable(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Queued
            && self.run_after <= now
            && self.can_retry()
            && !self.has_live_lease(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn state_round_trips_through_text() {
        for state in [
            JobState::Queued,
            JobState::Running,
            JobState::Succeeded,
            JobState::FailedRetryable,
            JobState::FailedTerminal,
        ] {
            assert_eq!(state.to_string().parse::<JobState>(), Ok(state));
        }
        assert_eq!(
            serde_json::to_value(JobState::FailedTerminal).unwrap(),
            "failed-terminal"
        );
    }

    #[test]
    fn leasable_requires_due_unleased_queued_job() {
        let now = Utc::now();
        let mut job = TranslationJob::new("abc", "tower.ifc", 3, "anonymous");
        assert!(job.is_leasable(now));

        job.run_after = now + Duration::seconds(10);
        assert!(!job.is_leasable(now));

        job.run_after = now;
        job.lease_owner = Some("worker-1".to_string());
        job.lease_expires_at = Some(now + Duration::seconds(60));
        assert!(!job.is_leasable(now));

        // Expired leases no longer block
        job.lease_expires_at = Some(now - Duration::seconds(1));
        assert!(job.is_leasable(now));

        job.state = JobState::FailedTerminal;
        assert!(!job.is_leasable(now));
    }

    #[test]
    fn terminal_states() {
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::FailedTerminal.is_terminal());
        assert!(!JobState::FailedRetryable.is_terminal());
        assert!(!JobState::FailedTerminal.is_active_or_done());
    }
}
