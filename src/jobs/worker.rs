//! Workers poll the job queue and execute jobs using registered handlers.

use crate::app::AppContext;
use crate::error::Result;
use crate::jobs::registry::JobRegistry;
use crate::traits::job::JobQueue;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, sleep};

/// Idle wait between polls of an empty queue
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Wait after a queue error before polling again
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// A single worker that processes jobs from a queue
pub struct JobWorker {
    queue: Arc<dyn JobQueue>,
    registry: Arc<JobRegistry>,
    ctx: Arc<AppContext>,
    worker_id: String,
    poll_interval: Duration,
    shutdown_tx: mpsc::Sender<()>,
}

impl JobWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        registry: Arc<JobRegistry>,
        ctx: Arc<AppContext>,
        worker_id: String,
    ) -> (Self, mpsc::Receiver<()>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        (
            Self {
                queue,
                registry,
                ctx,
                worker_id,
                poll_interval: DEFAULT_POLL_INTERVAL,
                shutdown_tx,
            },
            shutdown_rx,
        )
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run until a shutdown signal arrives
    ///
    /// A job already executing is finished before the worker stops.
    pub async fn start(self, mut shutdown_rx: mpsc::Receiver<()>) {
        tracing::info!(worker_id = %self.worker_id, "Job worker started");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!(worker_id = %self.worker_id, "Shutdown signal received");
                    break;
                }
                result = self.process_next_job() => {
                    let wait = match result {
                        Ok(Some(_)) => continue,
                        Ok(None) => self.poll_interval,
                        Err(e) => {
                            tracing::error!(worker_id = %self.worker_id, error = %e, "Error processing job");
                            ERROR_BACKOFF
                        }
                    };
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = sleep(wait) => {},
                    }
                }
            }
        }

        tracing::info!(worker_id = %self.worker_id, "Job worker stopped");
    }

    /// Claim and run one due job, returning its id
    pub async fn process_next_job(&self) -> Result<Option<String>> {
        let Some(job_data) = self.queue.dequeue().await? else {
            return Ok(None);
        };

        let job_id = job_data.job_id.clone();
        let job_type = job_data.job_type.clone();
        let attempt = job_data.retry_count + 1;
        tracing::debug!(
            worker_id = %self.worker_id,
            job_id = %job_id,
            job_type = %job_type,
            attempt,
            "Processing job"
        );

        match self.registry.execute(job_data, self.ctx.clone()).await {
            Ok(()) => {
                self.queue.complete(&job_id).await?;
                tracing::info!(
                    worker_id = %self.worker_id,
                    job_id = %job_id,
                    job_type = %job_type,
                    "Job completed"
                );
            }
            Err(e) => {
                self.queue.fail(&job_id, e.to_string()).await?;
                tracing::warn!(
                    worker_id = %self.worker_id,
                    job_id = %job_id,
                    job_type = %job_type,
                    attempt,
                    error = %e,
                    "Job failed"
                );
            }
        }

        Ok(Some(job_id))
    }

    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Pool of workers that process jobs concurrently
pub struct WorkerPool {
    workers: Vec<tokio::task::JoinHandle<()>>,
    shutdown_txs: Vec<mpsc::Sender<()>>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        registry: Arc<JobRegistry>,
        ctx: Arc<AppContext>,
        worker_count: usize,
    ) -> Self {
        let mut workers = Vec::with_capacity(worker_count);
        let mut shutdown_txs = Vec::with_capacity(worker_count);

        for i in 0..worker_count {
            let (worker, shutdown_rx) = JobWorker::new(
                queue.clone(),
                registry.clone(),
                ctx.clone(),
                format!("worker-{}", i),
            );
            shutdown_txs.push(worker.shutdown_tx.clone());
            workers.push(tokio::spawn(worker.start(shutdown_rx)));
        }

        Self {
            workers,
            shutdown_txs,
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Signal every worker and wait for in-flight jobs to finish
    pub async fn shutdown(self) {
        tracing::info!(workers = self.workers.len(), "Shutting down worker pool");

        for shutdown_tx in self.shutdown_txs {
            let _ = shutdown_tx.send(()).await;
        }

        for worker in self.workers {
            let _ = worker.await;
        }

        tracing::info!("Worker pool shut down");
    }
}
