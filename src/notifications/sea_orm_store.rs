//! SeaORM-backed notification store.
//!
//! Duplicate detection relies on the unique index
//! `idx_adyen_notifications_unique_event` over
//! `(psp_reference, event_code, success)`; the database rejects the second
//! insert and the error is mapped to [`NotificationError::Duplicate`].
//!
//! ```rust,ignore
//! let db = sea_orm::Database::connect("sqlite::memory:").await?;
//! SeaOrmNotificationStore::create_table(&db).await?;
//! let store = SeaOrmNotificationStore::new(db);
//! ```

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Schema, SqlErr,
    sea_query::Index,
};
use uuid::Uuid;

use super::error::NotificationError;
use super::fields::NotificationFields;
use super::model::{EventCode, NewNotification, Notification};
use super::store::NotificationStore;
use crate::error::Result;

pub(crate) mod entity {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "adyen_notifications")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub psp_reference: String,
        pub event_code: String,
        pub success: bool,
        pub merchant_reference: Option<String>,
        pub original_reference: Option<String>,
        pub merchant_account_code: Option<String>,
        pub payment_method: Option<String>,
        pub currency: Option<String>,
        pub value: Option<i64>,
        pub event_date: Option<String>,
        pub live: Option<bool>,
        pub reason: Option<String>,
        pub operations: Option<String>,
        #[sea_orm(column_type = "Json")]
        pub raw: Json,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

use entity::{ActiveModel, Column, Entity, Model};

const UNIQUE_EVENT_INDEX: &str = "idx_adyen_notifications_unique_event";

impl From<Model> for Notification {
    fn from(model: Model) -> Self {
        Notification {
            id: model.id,
            psp_reference: model.psp_reference,
            event_code: EventCode::from(model.event_code),
            success: model.success,
            merchant_reference: model.merchant_reference,
            original_reference: model.original_reference,
            merchant_account_code: model.merchant_account_code,
            payment_method: model.payment_method,
            currency: model.currency,
            value: model.value,
            event_date: model.event_date,
            live: model.live,
            reason: model.reason,
            operations: model
                .operations
                .map(|ops| ops.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
            raw: model.raw,
            created_at: model.created_at,
        }
    }
}

/// SeaORM implementation of [`NotificationStore`].
#[derive(Clone)]
pub struct SeaOrmNotificationStore {
    db: DatabaseConnection,
}

impl SeaOrmNotificationStore {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create the `adyen_notifications` table and its unique index if missing
    pub async fn create_table(db: &DatabaseConnection) -> Result<()> {
        let backend = db.get_database_backend();
        let schema = Schema::new(backend);

        let mut table = schema.create_table_from_entity(Entity);
        table.if_not_exists();
        db.execute(backend.build(&table)).await?;

        let index = Index::create()
            .name(UNIQUE_EVENT_INDEX)
            .table(Entity)
            .col(Column::PspReference)
            .col(Column::EventCode)
            .col(Column::Success)
            .unique()
            .if_not_exists()
            .to_owned();
        db.execute(backend.build(&index)).await?;

        Ok(())
    }

    fn active_model(id: &str, new: &NewNotification, created_at: chrono::DateTime<Utc>) -> ActiveModel {
        ActiveModel {
            id: Set(id.to_string()),
            psp_reference: Set(new.psp_reference.clone()),
            event_code: Set(new.event_code.to_string()),
            success: Set(new.success),
            merchant_reference: Set(new.merchant_reference.clone()),
            original_reference: Set(new.original_reference.clone()),
            merchant_account_code: Set(new.merchant_account_code.clone()),
            payment_method: Set(new.payment_method.clone()),
            currency: Set(new.currency.clone()),
            value: Set(new.value),
            event_date: Set(new.event_date.clone()),
            live: Set(new.live),
            reason: Set(new.reason.clone()),
            operations: Set(if new.operations.is_empty() {
                None
            } else {
                Some(new.operations.join(","))
            }),
            raw: Set(new.raw.clone()),
            created_at: Set(created_at),
        }
    }
}

#[async_trait]
impl NotificationStore for SeaOrmNotificationStore {
    async fn log(&self, fields: &NotificationFields) -> std::result::Result<Notification, NotificationError> {
        let new = NewNotification::from_fields(fields)?;
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        let insert = Entity::insert(Self::active_model(&id, &new, created_at))
            .exec_without_returning(&self.db)
            .await;

        match insert {
            Ok(_) => Ok(new.into_notification(id, created_at)),
            Err(err) => match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => Err(NotificationError::Duplicate {
                    psp_reference: new.psp_reference,
                    event_code: new.event_code,
                    success: new.success,
                }),
                _ => Err(err.into()),
            },
        }
    }

    async fn find(&self, id: &str) -> Result<Option<Notification>> {
        let model = Entity::find_by_id(id.to_string()).one(&self.db).await?;
        Ok(model.map(Notification::from))
    }

    async fn find_by_psp_reference(&self, psp_reference: &str) -> Result<Vec<Notification>> {
        let models = Entity::find()
            .filter(Column::PspReference.eq(psp_reference))
            .order_by_asc(Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Notification::from).collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(Entity::find().count(&self.db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestDb;

    async fn store() -> SeaOrmNotificationStore {
        let test_db = TestDb::new().await.unwrap();
        SeaOrmNotificationStore::create_table(&test_db.connection)
            .await
            .unwrap();
        SeaOrmNotificationStore::new(test_db.connection)
    }

    fn fields(success: &str) -> NotificationFields {
        let mut fields = NotificationFields::new();
        fields.insert("pspReference", "8513823667306210");
        fields.insert("eventCode", "AUTHORISATION");
        fields.insert("success", success);
        fields.insert("value", "6999");
        fields.insert("operations", "CANCEL,CAPTURE,REFUND");
        fields
    }

    #[tokio::test]
    async fn test_log_and_find() {
        let store = store().await;

        let logged = store.log(&fields("true")).await.unwrap();
        let found = store.find(&logged.id).await.unwrap().unwrap();

        assert_eq!(found.psp_reference, "8513823667306210");
        assert_eq!(found.event_code, EventCode::Authorisation);
        assert_eq!(found.value, Some(6999));
        assert_eq!(found.operations, vec!["CANCEL", "CAPTURE", "REFUND"]);
        assert_eq!(found.raw["value"], "6999");
    }

    #[tokio::test]
    async fn test_unique_index_rejects_duplicate() {
        let store = store().await;

        store.log(&fields("true")).await.unwrap();
        let err = store.log(&fields("true")).await.unwrap_err();

        assert!(matches!(err, NotificationError::Duplicate { .. }));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_refusal_and_authorisation_both_stored() {
        let store = store().await;

        store.log(&fields("false")).await.unwrap();
        store.log(&fields("true")).await.unwrap();

        let stored = store.find_by_psp_reference("8513823667306210").await.unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn test_create_table_is_idempotent() {
        let test_db = TestDb::new().await.unwrap();
        SeaOrmNotificationStore::create_table(&test_db.connection)
            .await
            .unwrap();
        SeaOrmNotificationStore::create_table(&test_db.connection)
            .await
            .unwrap();
    }
}
