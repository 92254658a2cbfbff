//! Background job system traits
//!
//! Jobs are `(job_type, payload, not_before)` records. The HTTP layer only
//! ever enqueues; workers dequeue and execute through the registry.

use crate::app::AppContext;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A background job that can be executed asynchronously
///
/// The job must be serializable so it can be stored in queues.
#[async_trait]
pub trait Job: Send + Sync + Debug {
    /// Unique identifier for this job type (e.g. "reconcile_notification")
    fn job_type(&self) -> &str;

    /// Serialize the job payload to JSON
    fn serialize(&self) -> Result<serde_json::Value>;

    /// Execute the job with the given application context
    async fn execute(&self, ctx: &AppContext) -> Result<()>;
}

/// A job as stored in a queue, with retry and scheduling metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobData {
    pub job_id: String,
    /// Matches `Job::job_type()`
    pub job_type: String,
    pub payload: serde_json::Value,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Not before this instant (None = immediately)
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Error from the most recent failed attempt
    #[serde(default)]
    pub last_error: Option<String>,
}

impl JobData {
    pub fn new(job_id: String, job_type: String, payload: serde_json::Value, max_retries: u32) -> Self {
        Self {
            job_id,
            job_type,
            payload,
            retry_count: 0,
            max_retries,
            scheduled_at: None,
            created_at: Utc::now(),
            last_error: None,
        }
    }

    pub fn scheduled(
        job_id: String,
        job_type: String,
        payload: serde_json::Value,
        max_retries: u32,
        run_at: DateTime<Utc>,
    ) -> Self {
        Self {
            scheduled_at: Some(run_at),
            ..Self::new(job_id, job_type, payload, max_retries)
        }
    }

    /// Whether the job may run at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.is_none_or(|at| at <= now)
    }

    pub fn should_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Increment retry count and return new count
    pub fn increment_retry(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }

    /// Backoff before the next attempt: `base * 2^retry_count`, capped at
    /// [`MAX_BACKOFF_SECONDS`]
    pub fn backoff_seconds(&self, base: u64) -> u64 {
        base.saturating_mul(2_u64.saturating_pow(self.retry_count))
            .min(MAX_BACKOFF_SECONDS)
    }

    /// When the next attempt may run, `backoff_seconds` after `now`
    pub fn retry_at(&self, base: u64, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = Duration::seconds(self.backoff_seconds(base) as i64);
        now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Longest delay between two attempts of a job: one day
pub const MAX_BACKOFF_SECONDS: u64 = 24 * 60 * 60;

/// Job queue trait for enqueueing and processing background jobs
///
/// Implementations (in-memory, SeaORM) share the same interface.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job for immediate execution, returning its id
    async fn enqueue(&self, job: &dyn Job) -> Result<String>;

    /// Schedule a job to run no earlier than `run_at`
    async fn schedule(&self, job: &dyn Job, run_at: DateTime<Utc>) -> Result<String>;

    /// Claim the next due job, moving it to processing
    ///
    /// Returns `None` if no jobs are due.
    async fn dequeue(&self) -> Result<Option<JobData>>;

    /// Mark a job as completed
    async fn complete(&self, job_id: &str) -> Result<()>;

    /// Mark a job as failed
    ///
    /// Reschedules with exponential backoff while retries remain, otherwise
    /// parks the job as failed.
    async fn fail(&self, job_id: &str, error: String) -> Result<()>;

    /// Re-enqueue a processing job immediately with incremented retry count
    async fn retry(&self, job_id: &str) -> Result<()>;

    /// Remove a pending or scheduled job
    ///
    /// Returns `false` if the job is unknown or already being processed.
    async fn cancel(&self, job_id: &str) -> Result<bool>;

    /// Check if the queue is healthy and operational
    fn is_healthy(&self) -> bool;
}
