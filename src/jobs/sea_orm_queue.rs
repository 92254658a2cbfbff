//! Durable job queue over a `background_jobs` table.
//!
//! Claiming is a conditional update (`... WHERE id = ? AND status = 'pending'`),
//! so any number of workers, in any number of processes, can poll the same
//! table without running a job twice.

use crate::error::{AppError, Result};
use crate::traits::job::{Job, JobData, JobQueue};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Schema, sea_query::Expr,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Candidates fetched per dequeue; other workers may win some of them
const CLAIM_BATCH: u64 = 5;

pub(crate) mod entity {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "background_jobs")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub job_type: String,
        #[sea_orm(column_type = "Json")]
        pub payload: Json,
        pub status: String,
        pub retry_count: i32,
        pub max_retries: i32,
        /// Not before
        pub run_at: DateTimeUtc,
        pub scheduled: bool,
        pub locked_at: Option<DateTimeUtc>,
        pub last_error: Option<String>,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

use entity::{ActiveModel, Column, Entity, Model};

mod status {
    pub const PENDING: &str = "pending";
    pub const PROCESSING: &str = "processing";
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";
}

impl From<Model> for JobData {
    fn from(model: Model) -> Self {
        JobData {
            job_id: model.id,
            job_type: model.job_type,
            payload: model.payload,
            retry_count: model.retry_count.max(0) as u32,
            max_retries: model.max_retries.max(0) as u32,
            scheduled_at: model.scheduled.then_some(model.run_at),
            created_at: model.created_at,
            last_error: model.last_error,
        }
    }
}

/// SeaORM implementation of [`JobQueue`].
#[derive(Clone)]
pub struct SeaOrmJobQueue {
    db: DatabaseConnection,
    max_retries: u32,
    retry_backoff_seconds: u64,
    health_status: Arc<AtomicBool>,
}

impl SeaOrmJobQueue {
    pub fn new(db: DatabaseConnection, max_retries: u32, retry_backoff_seconds: u64) -> Self {
        Self {
            db,
            max_retries,
            retry_backoff_seconds,
            health_status: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Create the `background_jobs` table if missing
    pub async fn create_table(db: &DatabaseConnection) -> Result<()> {
        let backend = db.get_database_backend();
        let mut table = Schema::new(backend).create_table_from_entity(Entity);
        table.if_not_exists();
        db.execute(backend.build(&table)).await?;
        Ok(())
    }

    /// Look up a job in any state
    pub async fn find(&self, job_id: &str) -> Result<Option<(JobData, String)>> {
        let model = self.track(Entity::find_by_id(job_id.to_string()).one(&self.db).await)?;
        Ok(model.map(|m| {
            let status = m.status.clone();
            (JobData::from(m), status)
        }))
    }

    /// Return jobs stuck in `processing` for longer than `timeout` to the
    /// pending state. Their worker most likely died mid-job.
    pub async fn recover_stale(&self, timeout: Duration) -> Result<u64> {
        let cutoff = Utc::now() - timeout;
        let result = self.track(
            Entity::update_many()
                .col_expr(Column::Status, Expr::value(status::PENDING))
                .col_expr(Column::LockedAt, Expr::value(Option::<DateTime<Utc>>::None))
                .filter(Column::Status.eq(status::PROCESSING))
                .filter(Column::LockedAt.lte(cutoff))
                .exec(&self.db)
                .await,
        )?;

        if result.rows_affected > 0 {
            tracing::warn!(jobs = result.rows_affected, "Recovered stale background jobs");
        }
        Ok(result.rows_affected)
    }

    fn track<T>(&self, result: std::result::Result<T, DbErr>) -> Result<T> {
        self.health_status.store(result.is_ok(), Ordering::Release);
        result.map_err(AppError::from)
    }

    async fn insert(&self, job: &dyn Job, run_at: Option<DateTime<Utc>>) -> Result<String> {
        let job_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let model = ActiveModel {
            id: Set(job_id.clone()),
            job_type: Set(job.job_type().to_string()),
            payload: Set(job.serialize()?),
            status: Set(status::PENDING.to_string()),
            retry_count: Set(0),
            max_retries: Set(self.max_retries as i32),
            run_at: Set(run_at.unwrap_or(now)),
            scheduled: Set(run_at.is_some()),
            locked_at: Set(None),
            last_error: Set(None),
            created_at: Set(now),
        };
        self.track(Entity::insert(model).exec_without_returning(&self.db).await)?;

        Ok(job_id)
    }

    async fn processing(&self, job_id: &str) -> Result<Option<Model>> {
        self.track(
            Entity::find_by_id(job_id.to_string())
                .filter(Column::Status.eq(status::PROCESSING))
                .one(&self.db)
                .await,
        )
    }

    /// Put a processing job back in the queue, or park it as failed
    async fn requeue(&self, model: Model, backoff_base: Option<u64>, error: Option<String>) -> Result<()> {
        let job = JobData::from(model.clone());
        let mut active: ActiveModel = model.into();
        active.locked_at = Set(None);
        if error.is_some() {
            active.last_error = Set(error);
        }

        if job.should_retry() {
            let now = Utc::now();
            let run_at = match backoff_base {
                Some(base) => job.retry_at(base, now),
                None => now,
            };
            active.status = Set(status::PENDING.to_string());
            active.retry_count = Set(job.retry_count as i32 + 1);
            active.run_at = Set(run_at);
            active.scheduled = Set(run_at > now);
        } else {
            active.status = Set(status::FAILED.to_string());
            tracing::warn!(job_id = %job.job_id, job_type = %job.job_type, "Job exhausted its retries");
        }

        self.track(Entity::update(active).exec(&self.db).await)?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for SeaOrmJobQueue {
    async fn enqueue(&self, job: &dyn Job) -> Result<String> {
        self.insert(job, None).await
    }

    async fn schedule(&self, job: &dyn Job, run_at: DateTime<Utc>) -> Result<String> {
        self.insert(job, Some(run_at)).await
    }

    async fn dequeue(&self) -> Result<Option<JobData>> {
        let now = Utc::now();
        let candidates = self.track(
            Entity::find()
                .filter(Column::Status.eq(status::PENDING))
                .filter(Column::RunAt.lte(now))
                .order_by_asc(Column::RunAt)
                .limit(CLAIM_BATCH)
                .all(&self.db)
                .await,
        )?;

        for candidate in candidates {
            let claimed = self.track(
                Entity::update_many()
                    .col_expr(Column::Status, Expr::value(status::PROCESSING))
                    .col_expr(Column::LockedAt, Expr::value(now))
                    .filter(Column::Id.eq(candidate.id.as_str()))
                    .filter(Column::Status.eq(status::PENDING))
                    .exec(&self.db)
                    .await,
            )?;

            if claimed.rows_affected == 1 {
                return Ok(Some(JobData::from(candidate)));
            }
        }

        Ok(None)
    }

    async fn complete(&self, job_id: &str) -> Result<()> {
        self.track(
            Entity::update_many()
                .col_expr(Column::Status, Expr::value(status::COMPLETED))
                .col_expr(Column::LockedAt, Expr::value(Option::<DateTime<Utc>>::None))
                .filter(Column::Id.eq(job_id))
                .filter(Column::Status.eq(status::PROCESSING))
                .exec(&self.db)
                .await,
        )?;
        Ok(())
    }

    async fn fail(&self, job_id: &str, error: String) -> Result<()> {
        if let Some(model) = self.processing(job_id).await? {
            let retry_count = model.retry_count.max(0) as u32;
            let backoff = JobData::from(model.clone()).backoff_seconds(self.retry_backoff_seconds);
            tracing::debug!(job_id, retry_count, backoff, "Rescheduling failed job");
            self.requeue(model, Some(self.retry_backoff_seconds), Some(error)).await?;
        }
        Ok(())
    }

    async fn retry(&self, job_id: &str) -> Result<()> {
        if let Some(model) = self.processing(job_id).await? {
            self.requeue(model, None, None).await?;
        }
        Ok(())
    }

    async fn cancel(&self, job_id: &str) -> Result<bool> {
        let result = self.track(
            Entity::delete_many()
                .filter(Column::Id.eq(job_id))
                .filter(Column::Status.eq(status::PENDING))
                .exec(&self.db)
                .await,
        )?;
        Ok(result.rows_affected == 1)
    }

    fn is_healthy(&self) -> bool {
        self.health_status.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppContext;
    use crate::testing::TestDb;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct PingJob {
        n: u32,
    }

    #[async_trait]
    impl Job for PingJob {
        fn job_type(&self) -> &str {
            "ping"
        }

        fn serialize(&self) -> Result<serde_json::Value> {
            Ok(serde_json::to_value(self)?)
        }

        async fn execute(&self, _ctx: &AppContext) -> Result<()> {
            Ok(())
        }
    }

    async fn queue(max_retries: u32) -> SeaOrmJobQueue {
        let test_db = TestDb::new().await.unwrap();
        SeaOrmJobQueue::create_table(&test_db.connection).await.unwrap();
        SeaOrmJobQueue::new(test_db.connection, max_retries, 60)
    }

    #[tokio::test]
    async fn test_enqueue_claim_complete() {
        let queue = queue(3).await;
        let job_id = queue.enqueue(&PingJob { n: 1 }).await.unwrap();

        let claimed = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(claimed.job_id, job_id);
        assert_eq!(claimed.job_type, "ping");
        assert_eq!(claimed.payload["n"], 1);

        // Claimed jobs are invisible to other workers
        assert!(queue.dequeue().await.unwrap().is_none());

        queue.complete(&job_id).await.unwrap();
        let (_, status) = queue.find(&job_id).await.unwrap().unwrap();
        assert_eq!(status, "completed");
        assert!(queue.is_healthy());
    }

    #[tokio::test]
    async fn test_scheduled_job_waits_for_not_before() {
        let queue = queue(3).await;
        let later = queue
            .schedule(&PingJob { n: 2 }, Utc::now() + Duration::seconds(120))
            .await
            .unwrap();
        assert!(queue.dequeue().await.unwrap().is_none());

        let due = queue
            .schedule(&PingJob { n: 3 }, Utc::now() - Duration::seconds(1))
            .await
            .unwrap();
        let claimed = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(claimed.job_id, due);
        assert!(claimed.scheduled_at.is_some());

        assert!(queue.cancel(&later).await.unwrap());
        assert!(queue.find(&later).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fail_backs_off_then_parks() {
        let queue = queue(1).await;
        let job_id = queue.enqueue(&PingJob { n: 4 }).await.unwrap();

        queue.dequeue().await.unwrap().unwrap();
        queue.fail(&job_id, "boom".to_string()).await.unwrap();

        let (job, status) = queue.find(&job_id).await.unwrap().unwrap();
        assert_eq!(status, "pending");
        assert_eq!(job.retry_count, 1);
        assert_eq!(job.last_error.as_deref(), Some("boom"));
        // Backed off, so not claimable yet
        assert!(queue.dequeue().await.unwrap().is_none());

        // Force it due and exhaust the retry budget
        Entity::update_many()
            .col_expr(Column::RunAt, Expr::value(Utc::now() - Duration::seconds(1)))
            .filter(Column::Id.eq(job_id.as_str()))
            .exec(&queue.db)
            .await
            .unwrap();
        queue.dequeue().await.unwrap().unwrap();
        queue.fail(&job_id, "boom again".to_string()).await.unwrap();

        let (_, status) = queue.find(&job_id).await.unwrap().unwrap();
        assert_eq!(status, "failed");
    }

    #[tokio::test]
    async fn test_cannot_cancel_processing_job() {
        let queue = queue(3).await;
        let job_id = queue.enqueue(&PingJob { n: 5 }).await.unwrap();
        queue.dequeue().await.unwrap();

        assert!(!queue.cancel(&job_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_recover_stale() {
        let queue = queue(3).await;
        let job_id = queue.enqueue(&PingJob { n: 6 }).await.unwrap();
        queue.dequeue().await.unwrap();

        assert_eq!(queue.recover_stale(Duration::minutes(10)).await.unwrap(), 0);
        assert_eq!(queue.recover_stale(Duration::seconds(-1)).await.unwrap(), 1);

        let claimed = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(claimed.job_id, job_id);
    }
}
