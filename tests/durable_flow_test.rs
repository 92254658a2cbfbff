//! The notification flow against SQLite-backed stores and job queue.
#![cfg(feature = "database")]

use std::sync::Arc;

use adyen_notifications::notifications::SeaOrmNotificationStore;
use adyen_notifications::payments::SeaOrmPaymentRepository;
use adyen_notifications::testing::{self, TestDb};
use adyen_notifications::{
    App, AppContext, ConfigBuilder, JobRegistry, JobWorker, NotificationStore, NotifyConfig,
    Payment, PaymentState, SeaOrmJobQueue, WebhookEndpoint, register_notification_jobs,
};

const PSP: &str = "8513823667306210";

#[tokio::test]
async fn notification_survives_in_database_and_captures_payment() {
    let db = TestDb::with_schema().await.unwrap();

    let notifications = Arc::new(SeaOrmNotificationStore::new(db.connection()));
    let payments = Arc::new(SeaOrmPaymentRepository::new(db.connection()));
    payments
        .insert(&Payment::new(1, "R354361834", 6999, "USD").with_response_code(PSP))
        .await
        .unwrap();
    let queue = Arc::new(SeaOrmJobQueue::new(db.connection(), 3, 60));

    let ctx = AppContext::builder()
        .with_notification_store(notifications.clone())
        .with_payments(payments.clone())
        .with_job_queue(queue.clone())
        .with_database(db.connection())
        .build();

    let notify = NotifyConfig::new("username", "password").with_reconcile_delay_seconds(0);
    let config = ConfigBuilder::new().with_notify(notify.clone()).build().unwrap();
    let router = App::with_config(config)
        .register_module(WebhookEndpoint::new(notify))
        .with_context(ctx.clone())
        .into_test_router();

    for _ in 0..2 {
        testing::post(router.clone(), "/adyen/notify")
            .basic_auth("username", "password")
            .form_body(&[
                ("pspReference", PSP),
                ("eventCode", "AUTHORISATION"),
                ("success", "true"),
                ("merchantReference", "R354361834-A3JC8TNJ"),
                ("value", "6999"),
                ("currency", "USD"),
            ])
            .execute()
            .await
            .assert_ok()
            .assert_body("[accepted]")
            .await;
    }
    assert_eq!(notifications.count().await.unwrap(), 1);

    let registry = Arc::new(JobRegistry::new());
    register_notification_jobs(&registry).await;
    let (worker, _shutdown_rx) =
        JobWorker::new(queue.clone(), registry, Arc::new(ctx), "db-worker".to_string());

    let job_id = worker.process_next_job().await.unwrap().unwrap();
    assert!(worker.process_next_job().await.unwrap().is_none());

    let (_, status) = queue.find(&job_id).await.unwrap().unwrap();
    assert_eq!(status, "completed");
    assert_eq!(
        payments.get(1).await.unwrap().unwrap().state,
        PaymentState::Completed
    );

    testing::get(router, "/health")
        .execute()
        .await
        .assert_ok()
        .assert_json_path("checks.2.name", serde_json::json!("database"))
        .await
        .assert_json_path("checks.2.status", serde_json::json!("healthy"))
        .await;
}
