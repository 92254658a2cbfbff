//! Applies a stored notification to the shop's payment.
//!
//! Policy:
//! - no payment with `response_code == psp_reference`: nothing to do
//! - any event other than `AUTHORISATION`: ignored
//! - refused `AUTHORISATION`: invalidate the payment, never capture
//! - successful `AUTHORISATION`: capture the payment once
//!
//! Runs from the `reconcile_notification` job. The webhook delays that job
//! only for successful authorisations, so captures wait for Adyen to settle
//! while refusals apply straight away. A transition the payment guard
//! rejects can never succeed, so it is reported as `Rejected` and the job
//! completes; only storage errors go back to the job system for a retry.

use std::sync::Arc;

use crate::app::AppContext;
use crate::error::Result;
use crate::payments::{PaymentError, PaymentRepository, PaymentState, Transition};

use super::model::Notification;
use super::store::NotificationStore;

/// What reconciling a notification did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The notification id is unknown
    NoNotification,
    /// No payment carries the notification's PSP reference
    NoPayment,
    /// Not an `AUTHORISATION` event
    Ignored { payment_id: i64 },
    Invalidated { payment_id: i64 },
    Captured { payment_id: i64 },
    /// The payment was already in the target state
    Unchanged { payment_id: i64, state: PaymentState },
    /// The payment's state does not allow the transition
    Rejected { payment_id: i64, state: PaymentState },
}

impl ReconcileOutcome {
    /// Whether a payment was modified
    pub fn mutated(&self) -> bool {
        matches!(self, Self::Invalidated { .. } | Self::Captured { .. })
    }
}

#[derive(Clone)]
pub struct NotificationReconciler {
    notifications: Arc<dyn NotificationStore>,
    payments: Arc<dyn PaymentRepository>,
}

impl NotificationReconciler {
    pub fn new(notifications: Arc<dyn NotificationStore>, payments: Arc<dyn PaymentRepository>) -> Self {
        Self {
            notifications,
            payments,
        }
    }

    pub fn from_context(ctx: &AppContext) -> Result<Self> {
        Ok(Self::new(ctx.notifications()?.clone(), ctx.payments()?.clone()))
    }

    /// Load a notification by id and reconcile it
    pub async fn reconcile_by_id(&self, notification_id: &str) -> Result<ReconcileOutcome> {
        match self.notifications.find(notification_id).await? {
            Some(notification) => self.reconcile(&notification).await,
            None => {
                tracing::warn!(notification_id, "Notification to reconcile no longer exists");
                Ok(ReconcileOutcome::NoNotification)
            }
        }
    }

    #[tracing::instrument(
        skip_all,
        fields(
            notification_id = %notification.id,
            psp_reference = %notification.psp_reference,
            event_code = %notification.event_code,
            success = notification.success,
        )
    )]
    pub async fn reconcile(&self, notification: &Notification) -> Result<ReconcileOutcome> {
        let Some(payment) = self
            .payments
            .find_by_response_code(&notification.psp_reference)
            .await?
        else {
            tracing::info!("No payment matches notification, nothing to reconcile");
            return Ok(ReconcileOutcome::NoPayment);
        };
        let payment_id = payment.id;

        let outcome = if notification.is_failed_authorisation() {
            settle(
                payment_id,
                self.payments.invalidate(&payment).await,
                ReconcileOutcome::Invalidated { payment_id },
            )?
        } else if notification.is_successful_authorisation() {
            settle(
                payment_id,
                self.payments.capture(&payment).await,
                ReconcileOutcome::Captured { payment_id },
            )?
        } else {
            ReconcileOutcome::Ignored { payment_id }
        };

        if let ReconcileOutcome::Rejected { state, .. } = outcome {
            tracing::warn!(payment_id, state = %state, "Payment state rejects notification, not retrying");
        } else {
            tracing::info!(payment_id, outcome = ?outcome, "Notification reconciled");
        }
        Ok(outcome)
    }
}

/// Map a repository transition onto an outcome; guard rejections are final
fn settle(
    payment_id: i64,
    result: std::result::Result<Transition, PaymentError>,
    applied: ReconcileOutcome,
) -> Result<ReconcileOutcome> {
    match result {
        Ok(Transition::Applied { .. }) => Ok(applied),
        Ok(Transition::AlreadyInState(state)) => Ok(ReconcileOutcome::Unchanged { payment_id, state }),
        Err(PaymentError::InvalidTransition { from, .. }) => Ok(ReconcileOutcome::Rejected {
            payment_id,
            state: from,
        }),
        Err(err) => Err(err.into()),
    }
}
