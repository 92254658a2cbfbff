use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::app::AppContext;
use crate::error::Result;
use crate::jobs::JobRegistry;
use crate::traits::job::Job;

use super::reconciler::NotificationReconciler;

pub const RECONCILE_NOTIFICATION: &str = "reconcile_notification";

/// Deferred reconciliation of one stored notification.
///
/// Only the id travels through the queue; the notification is re-read when
/// the job runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileNotificationJob {
    pub notification_id: String,
}

impl ReconcileNotificationJob {
    pub fn new(notification_id: impl Into<String>) -> Self {
        Self {
            notification_id: notification_id.into(),
        }
    }
}

#[async_trait]
impl Job for ReconcileNotificationJob {
    fn job_type(&self) -> &str {
        RECONCILE_NOTIFICATION
    }

    fn serialize(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        NotificationReconciler::from_context(ctx)?
            .reconcile_by_id(&self.notification_id)
            .await?;
        Ok(())
    }
}

/// Register every job the notification module schedules
pub async fn register_notification_jobs(registry: &JobRegistry) {
    registry
        .register_job::<ReconcileNotificationJob>(RECONCILE_NOTIFICATION)
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{InMemoryNotificationStore, NotificationFields, NotificationStore};
    use crate::payments::{InMemoryPaymentRepository, Payment, PaymentState};
    use crate::traits::job::JobData;
    use std::sync::Arc;

    #[test]
    fn test_payload_shape() {
        let job = ReconcileNotificationJob::new("abc");
        assert_eq!(job.job_type(), "reconcile_notification");
        assert_eq!(
            Job::serialize(&job).unwrap(),
            serde_json::json!({"notification_id": "abc"})
        );
    }

    #[tokio::test]
    async fn test_registered_job_reconciles() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let payments = Arc::new(InMemoryPaymentRepository::new());
        payments
            .insert(Payment::new(7, "R7", 100, "EUR").with_response_code("psp-7"))
            .await;

        let mut fields = NotificationFields::new();
        fields.insert("pspReference", "psp-7");
        fields.insert("eventCode", "AUTHORISATION");
        fields.insert("success", "true");
        let notification = store.log(&fields).await.unwrap();

        let ctx = Arc::new(
            AppContext::builder()
                .with_notification_store(store)
                .with_payments(payments.clone())
                .build(),
        );

        let registry = JobRegistry::new();
        register_notification_jobs(&registry).await;
        assert!(registry.is_registered(RECONCILE_NOTIFICATION).await);

        let data = JobData::new(
            "job-1".to_string(),
            RECONCILE_NOTIFICATION.to_string(),
            serde_json::json!({"notification_id": notification.id}),
            3,
        );
        registry.execute(data, ctx).await.unwrap();

        assert_eq!(payments.get(7).await.unwrap().state, PaymentState::Completed);
    }
}
