use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{Payment, PaymentError, PaymentEvent, PaymentRepository, Transition};

/// In-memory payment repository (for development/testing)
#[derive(Clone, Default)]
pub struct InMemoryPaymentRepository {
    payments: Arc<RwLock<HashMap<i64, Payment>>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a payment
    pub async fn insert(&self, payment: Payment) {
        self.payments.write().await.insert(payment.id, payment);
    }

    pub async fn get(&self, id: i64) -> Option<Payment> {
        self.payments.read().await.get(&id).cloned()
    }

    /// Remove a payment, as when the shop deletes it before reconciliation
    pub async fn delete(&self, id: i64) -> Option<Payment> {
        self.payments.write().await.remove(&id)
    }

    async fn transition(&self, payment: &Payment, event: PaymentEvent) -> Result<Transition, PaymentError> {
        let mut payments = self.payments.write().await;
        let stored = payments
            .get_mut(&payment.id)
            .ok_or(PaymentError::NotFound { payment_id: payment.id })?;

        let transition = stored
            .state
            .apply(event)
            .map_err(|rejected| PaymentError::rejected(payment.id, rejected))?;

        if let Transition::Applied { to, .. } = transition {
            stored.state = to;
        }
        Ok(transition)
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn find_by_response_code(&self, response_code: &str) -> Result<Option<Payment>, PaymentError> {
        let payments = self.payments.read().await;
        let mut matches: Vec<&Payment> = payments
            .values()
            .filter(|p| p.response_code.as_deref() == Some(response_code))
            .collect();
        // Several payments can share a reference after a retried checkout; take the oldest
        matches.sort_by_key(|p| p.id);
        Ok(matches.first().map(|p| (*p).clone()))
    }

    async fn capture(&self, payment: &Payment) -> Result<Transition, PaymentError> {
        self.transition(payment, PaymentEvent::Capture).await
    }

    async fn invalidate(&self, payment: &Payment) -> Result<Transition, PaymentError> {
        self.transition(payment, PaymentEvent::Invalidate).await
    }
}
