use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::notifications::NotificationStore;
use crate::payments::PaymentRepository;
use crate::traits::job::JobQueue;

/// Application context for dependency injection and shared state
///
/// Holds the notification store, the shop's payment repository and the job
/// queue. Handlers and jobs reach their collaborators through here, so tests
/// can swap any of them for in-memory or recording implementations.
#[derive(Clone, Default)]
pub struct AppContext {
    pub notifications: Option<Arc<dyn NotificationStore>>,

    pub payments: Option<Arc<dyn PaymentRepository>>,

    pub jobs: Option<Arc<dyn JobQueue>>,

    #[cfg(feature = "database")]
    pub database: Option<sea_orm::DatabaseConnection>,
}

impl AppContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern for constructing AppContext
    pub fn builder() -> AppContextBuilder {
        AppContextBuilder::new()
    }

    /// Get the notification store, returning an error if not configured
    pub fn notifications(&self) -> Result<&Arc<dyn NotificationStore>> {
        self.notifications
            .as_ref()
            .ok_or_else(|| AppError::internal("Notification store not configured"))
    }

    /// Get the payment repository, returning an error if not configured
    pub fn payments(&self) -> Result<&Arc<dyn PaymentRepository>> {
        self.payments
            .as_ref()
            .ok_or_else(|| AppError::internal("Payment repository not configured"))
    }

    /// Get the job queue, returning an error if not configured
    pub fn jobs(&self) -> Result<&Arc<dyn JobQueue>> {
        self.jobs
            .as_ref()
            .ok_or_else(|| AppError::internal("Job queue not configured"))
    }

    /// Get the job queue as an Option
    pub fn jobs_opt(&self) -> Option<&Arc<dyn JobQueue>> {
        self.jobs.as_ref()
    }

    /// Get the SeaORM connection, if the context was built against a database
    #[cfg(feature = "database")]
    pub fn database_opt(&self) -> Option<&sea_orm::DatabaseConnection> {
        self.database.as_ref()
    }
}

/// Builder for AppContext with fluent API
#[must_use = "builder does nothing until you call build()"]
#[derive(Default)]
pub struct AppContextBuilder {
    notifications: Option<Arc<dyn NotificationStore>>,
    payments: Option<Arc<dyn PaymentRepository>>,
    jobs: Option<Arc<dyn JobQueue>>,
    #[cfg(feature = "database")]
    database: Option<sea_orm::DatabaseConnection>,
}

impl AppContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the notification store
    pub fn with_notification_store(mut self, store: Arc<dyn NotificationStore>) -> Self {
        self.notifications = Some(store);
        self
    }

    /// Set the payment repository
    pub fn with_payments(mut self, payments: Arc<dyn PaymentRepository>) -> Self {
        self.payments = Some(payments);
        self
    }

    /// Set the job queue
    pub fn with_job_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.jobs = Some(queue);
        self
    }

    /// Set the database connection backing the SeaORM stores
    #[cfg(feature = "database")]
    pub fn with_database(mut self, db: sea_orm::DatabaseConnection) -> Self {
        self.database = Some(db);
        self
    }

    pub fn build(self) -> AppContext {
        AppContext {
            notifications: self.notifications,
            payments: self.payments,
            jobs: self.jobs,
            #[cfg(feature = "database")]
            database: self.database,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::InMemoryJobQueue;
    use crate::notifications::InMemoryNotificationStore;
    use crate::payments::InMemoryPaymentRepository;

    #[test]
    fn test_unconfigured_accessors_fail() {
        let ctx = AppContext::new();
        assert!(ctx.notifications().is_err());
        assert!(ctx.payments().is_err());
        assert!(ctx.jobs().is_err());
        assert!(ctx.jobs_opt().is_none());
    }

    #[tokio::test]
    async fn test_builder_sets_collaborators() {
        let ctx = AppContext::builder()
            .with_notification_store(Arc::new(InMemoryNotificationStore::new()))
            .with_payments(Arc::new(InMemoryPaymentRepository::new()))
            .with_job_queue(Arc::new(InMemoryJobQueue::new(3, 60)))
            .build();

        assert!(ctx.notifications().is_ok());
        assert!(ctx.payments().is_ok());
        assert!(ctx.jobs().unwrap().is_healthy());
    }
}
