//! SeaORM connection setup and schema creation.

pub mod config;

pub use config::{DatabaseConfig, redact_database_url};
pub use sea_orm;

use crate::error::Result;
use crate::jobs::SeaOrmJobQueue;
use crate::notifications::SeaOrmNotificationStore;
use crate::payments::SeaOrmPaymentRepository;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;

/// Open a connection pool for `config`
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    tracing::info!(url = %config.redacted_url(), "Database connected");
    Ok(db)
}

/// Create every table this service owns, plus `spree_payments` when the
/// host shop has not created it
pub async fn create_schema(db: &DatabaseConnection) -> Result<()> {
    SeaOrmNotificationStore::create_table(db).await?;
    SeaOrmJobQueue::create_table(db).await?;
    SeaOrmPaymentRepository::create_table(db).await?;
    tracing::debug!("Database schema is up to date");
    Ok(())
}
