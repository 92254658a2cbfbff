use std::sync::Arc;

use adyen_notifications::{
    App, AppContext, Config, ConfigBuilder, InMemoryJobQueue, InMemoryNotificationStore,
    InMemoryPaymentRepository, JobBackend, JobQueue, JobRegistry, WebhookEndpoint,
    register_notification_jobs,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigBuilder::new().from_env().build()?;
    adyen_notifications::init_tracing_with_config(&config);

    let context = build_context(&config).await?;

    let registry = Arc::new(JobRegistry::new());
    register_notification_jobs(&registry).await;

    App::with_config(config.clone())
        .register_module(WebhookEndpoint::new(config.notify.clone()))
        .with_context(context)
        .start_workers(registry)
        .serve()
        .await?;

    Ok(())
}

#[cfg(feature = "database")]
async fn build_context(config: &Config) -> anyhow::Result<AppContext> {
    use adyen_notifications::database;
    use adyen_notifications::notifications::SeaOrmNotificationStore;
    use adyen_notifications::payments::SeaOrmPaymentRepository;
    use adyen_notifications::SeaOrmJobQueue;

    let Some(db_config) = &config.database else {
        tracing::warn!("No DATABASE_URL configured, notifications and payments are kept in memory");
        return Ok(in_memory_context(config));
    };

    let db = database::connect(db_config).await?;
    if db_config.auto_migrate {
        database::create_schema(&db).await?;
    }

    let jobs: Arc<dyn JobQueue> = match config.jobs.backend {
        JobBackend::Database => {
            let queue = SeaOrmJobQueue::new(
                db.clone(),
                config.jobs.max_retries,
                config.jobs.retry_backoff_seconds,
            );
            queue.recover_stale(chrono::Duration::minutes(10)).await?;
            Arc::new(queue)
        }
        JobBackend::InMemory => in_memory_queue(config),
    };

    Ok(AppContext::builder()
        .with_notification_store(Arc::new(SeaOrmNotificationStore::new(db.clone())))
        .with_payments(Arc::new(SeaOrmPaymentRepository::new(db.clone())))
        .with_job_queue(jobs)
        .with_database(db)
        .build())
}

#[cfg(not(feature = "database"))]
async fn build_context(config: &Config) -> anyhow::Result<AppContext> {
    Ok(in_memory_context(config))
}

fn in_memory_context(config: &Config) -> AppContext {
    AppContext::builder()
        .with_notification_store(Arc::new(InMemoryNotificationStore::new()))
        .with_payments(Arc::new(InMemoryPaymentRepository::new()))
        .with_job_queue(in_memory_queue(config))
        .build()
}

fn in_memory_queue(config: &Config) -> Arc<dyn JobQueue> {
    Arc::new(InMemoryJobQueue::new(
        config.jobs.max_retries,
        config.jobs.retry_backoff_seconds,
    ))
}
