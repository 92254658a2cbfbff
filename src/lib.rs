//! Adyen notification webhook for a Spree-style shop.
//!
//! Adyen posts a notification for every payment event. This crate takes
//! them in over HTTP Basic-authenticated `POST`, stores each one exactly once
//! and, after a settlement delay, reconciles it with the shop's payment:
//! a successful `AUTHORISATION` captures the payment, a refused one
//! invalidates it.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use adyen_notifications::{
//!     App, AppContext, ConfigBuilder, InMemoryJobQueue, InMemoryNotificationStore,
//!     InMemoryPaymentRepository, JobRegistry, WebhookEndpoint, register_notification_jobs,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigBuilder::new().from_env().build()?;
//!     adyen_notifications::init_tracing_with_config(&config);
//!
//!     let context = AppContext::builder()
//!         .with_notification_store(Arc::new(InMemoryNotificationStore::new()))
//!         .with_payments(Arc::new(InMemoryPaymentRepository::new()))
//!         .with_job_queue(Arc::new(InMemoryJobQueue::new(3, 60)))
//!         .build();
//!
//!     let registry = Arc::new(JobRegistry::new());
//!     register_notification_jobs(&registry).await;
//!
//!     App::with_config(config.clone())
//!         .register_module(WebhookEndpoint::new(config.notify))
//!         .with_context(context)
//!         .start_workers(registry)
//!         .serve()
//!         .await?;
//!     Ok(())
//! }
//! ```

mod app;
mod config;
mod core;
#[cfg(feature = "database")]
pub mod database;
mod error;
pub mod health;
mod http;
pub mod jobs;
mod middleware;
pub mod notifications;
pub mod payments;
pub mod testing;
pub mod traits;
mod utils;

pub use app::{AppContext, AppContextBuilder};
pub use config::{Config, ConfigBuilder, LoggingConfig, ServerConfig};
pub use crate::core::App;
#[cfg(feature = "database")]
pub use database::DatabaseConfig;
pub use error::{AppError, Result};
pub use health::{ComponentHealth, HealthCheck, HealthChecker, HealthStatus};
pub use http::RouteModule;
pub use jobs::{InMemoryJobQueue, JobBackend, JobRegistry, JobWorker, JobsConfig, WorkerPool};
#[cfg(feature = "database")]
pub use jobs::SeaOrmJobQueue;
pub use notifications::{
    InMemoryNotificationStore, Notification, NotificationError, NotificationFields,
    NotificationReconciler, NotificationStore, NotifyConfig, ReconcileOutcome, WebhookEndpoint,
    register_notification_jobs,
};
pub use payments::{
    InMemoryPaymentRepository, Payment, PaymentError, PaymentRepository, PaymentState,
};
pub use traits::job::{Job, JobData, JobQueue};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing from `RUST_LOG` (default `info`)
///
/// Set `ADYEN_LOG_JSON=true` for JSON formatted logs.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let raw = utils::get_env_with_prefix("LOG_JSON");
    let json_logs = raw.as_deref().map(config::parse_log_json);

    install_subscriber(env_filter, matches!(json_logs, Some(Some(true))));

    if let (Some(value), Some(None)) = (raw, json_logs) {
        tracing::warn!(value = %value, "ADYEN_LOG_JSON must be true or false, logging as text");
    }
}

/// Initialize tracing from the `logging` section of `config`
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    install_subscriber(env_filter, config.logging.json);
}

fn install_subscriber(env_filter: EnvFilter, json: bool) {
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {}", e);
    }
}
