//! In-memory SQLite databases for tests.
//!
//! Each `TestDb` owns its own database. The pool is pinned to a single
//! connection because every new `sqlite::memory:` connection opens a fresh,
//! empty database.

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};

pub struct TestDb {
    pub connection: DatabaseConnection,
}

impl TestDb {
    /// Empty in-memory database with no tables
    pub async fn new() -> Result<Self, DbErr> {
        let mut options = ConnectOptions::new("sqlite::memory:");
        options
            .max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);

        let connection = Database::connect(options).await?;
        Ok(Self { connection })
    }

    /// In-memory database with the notification, job and payment tables
    pub async fn with_schema() -> Result<Self, DbErr> {
        let db = Self::new().await?;
        crate::database::create_schema(&db.connection)
            .await
            .map_err(|e| DbErr::Custom(e.to_string()))?;
        Ok(db)
    }

    pub fn connection(&self) -> DatabaseConnection {
        self.connection.clone()
    }

    /// Run raw SQL statements, in order
    pub async fn seed(&self, statements: &[&str]) -> Result<(), DbErr> {
        for statement in statements {
            self.connection.execute_unprepared(statement).await?;
        }
        Ok(())
    }

    /// Names of the user tables currently present
    pub async fn table_names(&self) -> Result<Vec<String>, DbErr> {
        let rows = self
            .connection
            .query_all(Statement::from_string(
                self.connection.get_database_backend(),
                "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            ))
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String>("", "name"))
            .collect()
    }
}
