//! Payments owned by the host shop.
//!
//! The reconciler only needs three things from the shop: find a payment by
//! the PSP reference recorded when it was authorised, capture it, and
//! invalidate it. [`PaymentRepository`] is that seam.

mod in_memory;
#[cfg(feature = "database")]
mod sea_orm_store;
mod state;

pub use in_memory::InMemoryPaymentRepository;
#[cfg(feature = "database")]
pub use sea_orm_store::SeaOrmPaymentRepository;
pub use state::{PaymentEvent, PaymentState, RejectedTransition, Transition};

use crate::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A shop payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub order_number: String,
    /// Amount in minor units
    pub amount: i64,
    pub currency: String,
    /// PSP reference returned by the gateway at authorisation time
    pub response_code: Option<String>,
    pub state: PaymentState,
}

impl Payment {
    pub fn new(id: i64, order_number: impl Into<String>, amount: i64, currency: impl Into<String>) -> Self {
        Self {
            id,
            order_number: order_number.into(),
            amount,
            currency: currency.into(),
            response_code: None,
            state: PaymentState::Pending,
        }
    }

    #[must_use]
    pub fn with_response_code(mut self, response_code: impl Into<String>) -> Self {
        self.response_code = Some(response_code.into());
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: PaymentState) -> Self {
        self.state = state;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("payment {payment_id} not found")]
    NotFound { payment_id: i64 },

    #[error("cannot {event} payment {payment_id} in state {from}")]
    InvalidTransition {
        payment_id: i64,
        from: PaymentState,
        event: PaymentEvent,
    },

    #[error(transparent)]
    Storage(#[from] AppError),
}

impl PaymentError {
    fn rejected(payment_id: i64, rejected: RejectedTransition) -> Self {
        Self::InvalidTransition {
            payment_id,
            from: rejected.from,
            event: rejected.event,
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotFound { .. } => AppError::NotFound(err.to_string()),
            PaymentError::InvalidTransition { .. } => AppError::Internal(err.to_string()),
            PaymentError::Storage(inner) => inner,
        }
    }
}

#[cfg(feature = "database")]
impl From<sea_orm::DbErr> for PaymentError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Storage(err.into())
    }
}

/// Access to the shop's payments.
///
/// `capture` and `invalidate` must apply the [`PaymentState`] guard
/// atomically: concurrent reconciliations of the same payment may race, and
/// the loser must see `AlreadyInState` or `InvalidTransition`, never a
/// double transition.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Find the payment whose recorded response code equals `response_code`
    async fn find_by_response_code(&self, response_code: &str) -> Result<Option<Payment>, PaymentError>;

    /// Capture previously authorised funds
    async fn capture(&self, payment: &Payment) -> Result<Transition, PaymentError>;

    /// Mark the payment invalid
    async fn invalidate(&self, payment: &Payment) -> Result<Transition, PaymentError>;
}
