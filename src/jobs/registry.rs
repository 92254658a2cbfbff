//! Maps job type strings to the handlers that deserialize and run them.

use crate::app::AppContext;
use crate::error::{AppError, Result};
use crate::traits::job::{Job, JobData};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

type JobHandler = Arc<dyn Fn(JobData, Arc<AppContext>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Registry for mapping job types to their handlers
///
/// Cheap to clone; all clones share the same handler table.
#[derive(Clone, Default)]
pub struct JobRegistry {
    handlers: Arc<tokio::sync::RwLock<HashMap<String, JobHandler>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job type with its handler function
    ///
    /// ```rust,ignore
    /// registry.register("reconcile_notification", |data, ctx| {
    ///     Box::pin(async move {
    ///         let job: ReconcileNotificationJob = serde_json::from_value(data.payload)?;
    ///         job.execute(&ctx).await
    ///     })
    /// }).await;
    /// ```
    pub async fn register<F>(&self, job_type: &str, handler: F)
    where
        F: Fn(JobData, Arc<AppContext>) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        let handler: JobHandler = Arc::new(handler);
        let mut handlers = self.handlers.write().await;
        handlers.insert(job_type.to_string(), handler);
    }

    /// Register a [`Job`] type whose payload is its own serde representation
    pub async fn register_job<J>(&self, job_type: &str)
    where
        J: Job + DeserializeOwned + 'static,
    {
        self.register(job_type, |data, ctx| {
            Box::pin(async move {
                let job: J = serde_json::from_value(data.payload)?;
                job.execute(&ctx).await
            })
        })
        .await;
    }

    /// Execute a job by looking up its handler
    pub async fn execute(&self, data: JobData, ctx: Arc<AppContext>) -> Result<()> {
        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&data.job_type).cloned().ok_or_else(|| {
                AppError::internal(format!("No handler registered for job type: {}", data.job_type))
            })?
        };

        handler(data, ctx).await
    }

    pub async fn is_registered(&self, job_type: &str) -> bool {
        self.handlers.read().await.contains_key(job_type)
    }

    pub async fn registered_types(&self) -> Vec<String> {
        self.handlers.read().await.keys().cloned().collect()
    }
}
