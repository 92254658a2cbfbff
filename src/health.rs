use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::app::AppContext;
use crate::traits::job::JobQueue;

/// Health check status
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check result for a single component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentHealth {
    fn new(name: &str, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: Some(message.into()),
        }
    }
}

/// Overall health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: Vec<ComponentHealth>,
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        let status_code = match self.status {
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status_code, Json(self)).into_response()
    }
}

pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self) -> BoxFuture<'_, ComponentHealth>;
}

/// Always healthy while the process is serving requests
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicHealthCheck;

impl HealthCheck for BasicHealthCheck {
    fn name(&self) -> &str {
        "application"
    }

    fn check(&self) -> BoxFuture<'_, ComponentHealth> {
        Box::pin(async {
            ComponentHealth::new(self.name(), HealthStatus::Healthy, "Application is running")
        })
    }
}

/// Reports the job queue's own health flag.
///
/// Notifications are still stored while the queue is down, but their
/// reconciliation cannot be scheduled, so this degrades rather than fails.
pub struct JobQueueHealthCheck {
    queue: Arc<dyn JobQueue>,
}

impl JobQueueHealthCheck {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }
}

impl HealthCheck for JobQueueHealthCheck {
    fn name(&self) -> &str {
        "job_queue"
    }

    fn check(&self) -> BoxFuture<'_, ComponentHealth> {
        Box::pin(async {
            if self.queue.is_healthy() {
                ComponentHealth::new(self.name(), HealthStatus::Healthy, "Job queue is operational")
            } else {
                ComponentHealth::new(self.name(), HealthStatus::Degraded, "Job queue is not accepting work")
            }
        })
    }
}

/// Pings the database behind the SeaORM stores.
#[cfg(feature = "database")]
pub struct DatabaseHealthCheck {
    db: sea_orm::DatabaseConnection,
}

#[cfg(feature = "database")]
impl DatabaseHealthCheck {
    pub fn new(db: sea_orm::DatabaseConnection) -> Self {
        Self { db }
    }
}

#[cfg(feature = "database")]
impl HealthCheck for DatabaseHealthCheck {
    fn name(&self) -> &str {
        "database"
    }

    fn check(&self) -> BoxFuture<'_, ComponentHealth> {
        Box::pin(async {
            match self.db.ping().await {
                Ok(()) => ComponentHealth::new(self.name(), HealthStatus::Healthy, "Database is reachable"),
                Err(e) => {
                    tracing::warn!(error = %e, "Database health check failed");
                    ComponentHealth::new(self.name(), HealthStatus::Unhealthy, "Database is unreachable")
                }
            }
        })
    }
}

/// Runs all registered checks and folds them into one status
pub struct HealthChecker {
    checks: Vec<Arc<dyn HealthCheck>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            checks: vec![Arc::new(BasicHealthCheck)],
        }
    }

    /// Checks for every collaborator configured in `ctx`
    pub fn from_context(ctx: &AppContext) -> Self {
        let mut checker = Self::new();
        if let Some(queue) = ctx.jobs_opt() {
            checker = checker.with_check(Arc::new(JobQueueHealthCheck::new(queue.clone())));
        }
        #[cfg(feature = "database")]
        if let Some(db) = ctx.database_opt() {
            checker = checker.with_check(Arc::new(DatabaseHealthCheck::new(db.clone())));
        }
        checker
    }

    pub fn with_check(mut self, check: Arc<dyn HealthCheck>) -> Self {
        self.checks.push(check);
        self
    }

    pub async fn check_health(&self) -> HealthResponse {
        let mut checks = Vec::with_capacity(self.checks.len());
        let mut overall_status = HealthStatus::Healthy;

        for check in &self.checks {
            let result = check.check().await;

            match result.status {
                HealthStatus::Unhealthy => overall_status = HealthStatus::Unhealthy,
                HealthStatus::Degraded if overall_status == HealthStatus::Healthy => {
                    overall_status = HealthStatus::Degraded
                }
                _ => {}
            }

            checks.push(result);
        }

        HealthResponse {
            status: overall_status,
            checks,
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// `GET /health`
pub async fn health_handler(State(ctx): State<AppContext>) -> HealthResponse {
    HealthChecker::from_context(&ctx).check_health().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::InMemoryJobQueue;

    #[tokio::test]
    async fn test_basic_only() {
        let response = HealthChecker::from_context(&AppContext::new()).check_health().await;
        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.checks.len(), 1);
    }

    #[tokio::test]
    async fn test_stopped_job_queue_degrades() {
        let queue = Arc::new(InMemoryJobQueue::new(3, 60));
        let ctx = AppContext::builder().with_job_queue(queue.clone()).build();

        let healthy = HealthChecker::from_context(&ctx).check_health().await;
        assert_eq!(healthy.status, HealthStatus::Healthy);

        queue.shutdown().await;
        let degraded = HealthChecker::from_context(&ctx).check_health().await;
        assert_eq!(degraded.status, HealthStatus::Degraded);
        assert_eq!(degraded.checks[1].name, "job_queue");
    }
}
