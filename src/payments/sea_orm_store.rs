//! SeaORM-backed payment repository over the shop's `spree_payments` table.
//!
//! Transitions are compare-and-set updates (`WHERE id = ? AND state = ?`), so
//! two workers reconciling the same payment cannot both apply a transition.

use async_trait::async_trait;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Schema, sea_query::Expr,
};

use super::{Payment, PaymentError, PaymentEvent, PaymentRepository, PaymentState, Transition};
use crate::error::{AppError, Result};

/// Attempts before giving up on a payment that keeps changing underneath us
const MAX_CAS_ATTEMPTS: usize = 5;

pub(crate) mod entity {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "spree_payments")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: i64,
        pub order_number: String,
        pub amount: i64,
        pub currency: String,
        pub response_code: Option<String>,
        pub state: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

use entity::{ActiveModel, Column, Entity, Model};

impl TryFrom<Model> for Payment {
    type Error = PaymentError;

    fn try_from(model: Model) -> std::result::Result<Self, Self::Error> {
        let state = model
            .state
            .parse::<PaymentState>()
            .map_err(|e| PaymentError::Storage(AppError::internal(e)))?;
        Ok(Payment {
            id: model.id,
            order_number: model.order_number,
            amount: model.amount,
            currency: model.currency,
            response_code: model.response_code,
            state,
        })
    }
}

/// SeaORM implementation of [`PaymentRepository`].
#[derive(Clone)]
pub struct SeaOrmPaymentRepository {
    db: DatabaseConnection,
}

impl SeaOrmPaymentRepository {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create the `spree_payments` table if missing.
    ///
    /// Shops that already own this table never need to call it.
    pub async fn create_table(db: &DatabaseConnection) -> Result<()> {
        let backend = db.get_database_backend();
        let mut table = Schema::new(backend).create_table_from_entity(Entity);
        table.if_not_exists();
        db.execute(backend.build(&table)).await?;
        Ok(())
    }

    pub async fn insert(&self, payment: &Payment) -> std::result::Result<(), PaymentError> {
        let model = ActiveModel {
            id: Set(payment.id),
            order_number: Set(payment.order_number.clone()),
            amount: Set(payment.amount),
            currency: Set(payment.currency.clone()),
            response_code: Set(payment.response_code.clone()),
            state: Set(payment.state.as_str().to_string()),
        };
        Entity::insert(model).exec_without_returning(&self.db).await?;
        Ok(())
    }

    pub async fn get(&self, id: i64) -> std::result::Result<Option<Payment>, PaymentError> {
        Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Payment::try_from)
            .transpose()
    }

    async fn transition(
        &self,
        payment: &Payment,
        event: PaymentEvent,
    ) -> std::result::Result<Transition, PaymentError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self
                .get(payment.id)
                .await?
                .ok_or(PaymentError::NotFound { payment_id: payment.id })?;

            let transition = current
                .state
                .apply(event)
                .map_err(|rejected| PaymentError::rejected(payment.id, rejected))?;

            let Transition::Applied { from, to } = transition else {
                return Ok(transition);
            };

            let updated = Entity::update_many()
                .col_expr(Column::State, Expr::value(to.as_str()))
                .filter(Column::Id.eq(payment.id))
                .filter(Column::State.eq(from.as_str()))
                .exec(&self.db)
                .await?;

            if updated.rows_affected == 1 {
                return Ok(transition);
            }

            tracing::debug!(
                payment_id = payment.id,
                event = %event,
                "Payment state changed during transition, re-reading"
            );
        }

        Err(PaymentError::Storage(AppError::internal(format!(
            "payment {} kept changing during {}",
            payment.id, event
        ))))
    }
}

#[async_trait]
impl PaymentRepository for SeaOrmPaymentRepository {
    async fn find_by_response_code(
        &self,
        response_code: &str,
    ) -> std::result::Result<Option<Payment>, PaymentError> {
        Entity::find()
            .filter(Column::ResponseCode.eq(response_code))
            .order_by_asc(Column::Id)
            .one(&self.db)
            .await?
            .map(Payment::try_from)
            .transpose()
    }

    async fn capture(&self, payment: &Payment) -> std::result::Result<Transition, PaymentError> {
        self.transition(payment, PaymentEvent::Capture).await
    }

    async fn invalidate(&self, payment: &Payment) -> std::result::Result<Transition, PaymentError> {
        self.transition(payment, PaymentEvent::Invalidate).await
    }
}
