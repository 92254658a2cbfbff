//! In-memory job queue implementation
//!
//! Suitable for development, tests and single-instance deployments that can
//! afford to lose scheduled reconciliations on restart.

use crate::error::Result;
use crate::traits::job::{Job, JobData, JobQueue};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Default maximum size for completed/failed job history
const DEFAULT_MAX_HISTORY_SIZE: usize = 10_000;

type Schedule = BTreeMap<DateTime<Utc>, Vec<JobData>>;

/// In-memory job queue
///
/// # Resource Limits
///
/// The completed and failed job lists are bounded. By default each retains
/// the most recent 10,000 jobs.
///
/// # Shutdown
///
/// Call `shutdown()` before dropping to cleanly stop the scheduler task.
#[derive(Clone)]
pub struct InMemoryJobQueue {
    pending: Arc<Mutex<VecDeque<JobData>>>,
    processing: Arc<Mutex<HashMap<String, JobData>>>,
    completed: Arc<Mutex<VecDeque<JobData>>>,
    failed: Arc<Mutex<VecDeque<JobData>>>,
    scheduled: Arc<Mutex<Schedule>>,
    max_retries: u32,
    retry_backoff_seconds: u64,
    max_history_size: usize,
    shutdown: Arc<AtomicBool>,
    scheduler_handle: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl InMemoryJobQueue {
    /// Create a new in-memory job queue
    ///
    /// Must be called inside a tokio runtime; a scheduler task is spawned.
    pub fn new(max_retries: u32, retry_backoff_seconds: u64) -> Self {
        Self::with_history_limit(max_retries, retry_backoff_seconds, DEFAULT_MAX_HISTORY_SIZE)
    }

    /// Create a new in-memory job queue with custom history limit
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Maximum retry attempts for failed jobs
    /// * `retry_backoff_seconds` - Base backoff duration (exponentially increased)
    /// * `max_history_size` - Maximum number of completed/failed jobs to retain
    pub fn with_history_limit(max_retries: u32, retry_backoff_seconds: u64, max_history_size: usize) -> Self {
        let queue = Self {
            pending: Arc::new(Mutex::new(VecDeque::new())),
            processing: Arc::new(Mutex::new(HashMap::new())),
            completed: Arc::new(Mutex::new(VecDeque::new())),
            failed: Arc::new(Mutex::new(VecDeque::new())),
            scheduled: Arc::new(Mutex::new(BTreeMap::new())),
            max_retries,
            retry_backoff_seconds,
            max_history_size,
            shutdown: Arc::new(AtomicBool::new(false)),
            scheduler_handle: Arc::new(Mutex::new(None)),
        };

        queue.start_scheduler_task();

        queue
    }

    /// Signal the scheduler task to stop and wait for it
    pub async fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);

        let mut handle_guard = self.scheduler_handle.lock().await;
        if let Some(handle) = handle_guard.take() {
            match tokio::time::timeout(tokio::time::Duration::from_secs(5), handle).await {
                Ok(_) => tracing::debug!("In-memory job queue scheduler stopped cleanly"),
                Err(_) => tracing::warn!("In-memory job queue scheduler did not stop within timeout"),
            }
        }
    }

    /// Jobs waiting for their `not_before`, earliest first
    pub async fn scheduled_jobs(&self) -> Vec<JobData> {
        let scheduled = self.scheduled.lock().await;
        scheduled.values().flatten().cloned().collect()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn completed_jobs(&self) -> Vec<JobData> {
        self.completed.lock().await.iter().cloned().collect()
    }

    /// Jobs that exhausted their retries
    pub async fn failed_jobs(&self) -> Vec<JobData> {
        self.failed.lock().await.iter().cloned().collect()
    }

    fn push_to_bounded_history(history: &mut VecDeque<JobData>, job: JobData, max_size: usize) {
        if history.len() >= max_size {
            history.pop_front();
        }
        history.push_back(job);
    }

    /// Move every scheduled job due at `now` to the back of `pending`
    fn promote_due(scheduled: &mut Schedule, pending: &mut VecDeque<JobData>, now: DateTime<Utc>) {
        let due: Vec<DateTime<Utc>> = scheduled
            .range(..=now)
            .map(|(time, _)| *time)
            .collect();

        for key in due {
            if let Some(jobs) = scheduled.remove(&key) {
                pending.extend(jobs);
            }
        }
    }

    /// Start background task that moves scheduled jobs to pending queue
    fn start_scheduler_task(&self) {
        let scheduled = self.scheduled.clone();
        let pending = self.pending.clone();
        let shutdown = self.shutdown.clone();
        let scheduler_handle = self.scheduler_handle.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(1));

            loop {
                if shutdown.load(Ordering::Acquire) {
                    tracing::debug!("In-memory job queue scheduler shutting down");
                    break;
                }

                interval.tick().await;

                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                let mut scheduled_guard = scheduled.lock().await;
                let mut pending_guard = pending.lock().await;
                Self::promote_due(&mut scheduled_guard, &mut pending_guard, Utc::now());
            }
        });

        // Sync context: the handle slot is fresh, so try_lock cannot contend
        if let Ok(mut guard) = scheduler_handle.try_lock() {
            *guard = Some(handle);
        } else {
            handle.abort();
            tracing::error!("Failed to store scheduler handle");
        }
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: &dyn Job) -> Result<String> {
        let job_id = Uuid::new_v4().to_string();
        let job_data = JobData::new(
            job_id.clone(),
            job.job_type().to_string(),
            job.serialize()?,
            self.max_retries,
        );

        self.pending.lock().await.push_back(job_data);

        Ok(job_id)
    }

    async fn schedule(&self, job: &dyn Job, run_at: DateTime<Utc>) -> Result<String> {
        let job_id = Uuid::new_v4().to_string();
        let job_data = JobData::scheduled(
            job_id.clone(),
            job.job_type().to_string(),
            job.serialize()?,
            self.max_retries,
            run_at,
        );

        let mut scheduled = self.scheduled.lock().await;
        scheduled.entry(run_at).or_default().push(job_data);

        Ok(job_id)
    }

    async fn dequeue(&self) -> Result<Option<JobData>> {
        // Lock order: scheduled, pending, processing (same as the scheduler task)
        let mut scheduled = self.scheduled.lock().await;
        let mut pending = self.pending.lock().await;
        Self::promote_due(&mut scheduled, &mut pending, Utc::now());
        drop(scheduled);

        if let Some(job_data) = pending.pop_front() {
            let mut processing = self.processing.lock().await;
            processing.insert(job_data.job_id.clone(), job_data.clone());
            Ok(Some(job_data))
        } else {
            Ok(None)
        }
    }

    async fn complete(&self, job_id: &str) -> Result<()> {
        let mut processing = self.processing.lock().await;
        if let Some(job_data) = processing.remove(job_id) {
            let mut completed = self.completed.lock().await;
            Self::push_to_bounded_history(&mut completed, job_data, self.max_history_size);
        }
        Ok(())
    }

    async fn fail(&self, job_id: &str, error: String) -> Result<()> {
        let mut processing = self.processing.lock().await;

        if let Some(mut job_data) = processing.remove(job_id) {
            drop(processing);
            job_data.last_error = Some(error);

            if job_data.should_retry() {
                let retry_at = job_data.retry_at(self.retry_backoff_seconds, Utc::now());

                job_data.increment_retry();
                job_data.scheduled_at = Some(retry_at);

                let mut scheduled = self.scheduled.lock().await;
                scheduled.entry(retry_at).or_default().push(job_data);
            } else {
                let mut failed = self.failed.lock().await;
                Self::push_to_bounded_history(&mut failed, job_data, self.max_history_size);
            }
        }

        Ok(())
    }

    async fn retry(&self, job_id: &str) -> Result<()> {
        let mut processing = self.processing.lock().await;

        if let Some(mut job_data) = processing.remove(job_id) {
            drop(processing);
            if job_data.should_retry() {
                job_data.increment_retry();
                self.pending.lock().await.push_back(job_data);
            } else {
                let mut failed = self.failed.lock().await;
                Self::push_to_bounded_history(&mut failed, job_data, self.max_history_size);
            }
        }

        Ok(())
    }

    async fn cancel(&self, job_id: &str) -> Result<bool> {
        let mut scheduled = self.scheduled.lock().await;
        let mut pending = self.pending.lock().await;

        if let Some(pos) = pending.iter().position(|job| job.job_id == job_id) {
            pending.remove(pos);
            return Ok(true);
        }

        let mut emptied = None;
        let mut found = false;
        for (time, jobs) in scheduled.iter_mut() {
            if let Some(pos) = jobs.iter().position(|job| job.job_id == job_id) {
                jobs.remove(pos);
                found = true;
                if jobs.is_empty() {
                    emptied = Some(*time);
                }
                break;
            }
        }
        if let Some(time) = emptied {
            scheduled.remove(&time);
        }

        Ok(found)
    }

    fn is_healthy(&self) -> bool {
        !self.shutdown.load(Ordering::Acquire)
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new(3, 60)
    }
}
