//! Full notification flow: HTTP intake, scheduled reconciliation, payment update.

use std::sync::Arc;

use adyen_notifications::notifications::ACCEPTED;
use adyen_notifications::{
    App, AppContext, ConfigBuilder, InMemoryJobQueue, InMemoryNotificationStore,
    InMemoryPaymentRepository, JobRegistry, JobWorker, NotificationStore, NotifyConfig, Payment,
    PaymentState, WebhookEndpoint, register_notification_jobs, testing,
};
use axum::Router;

const PSP: &str = "8513823667306210";

struct Shop {
    notifications: Arc<InMemoryNotificationStore>,
    payments: Arc<InMemoryPaymentRepository>,
    queue: Arc<InMemoryJobQueue>,
    worker: JobWorker,
    router: Router,
}

async fn shop() -> Shop {
    let notifications = Arc::new(InMemoryNotificationStore::new());
    let payments = Arc::new(InMemoryPaymentRepository::new());
    payments
        .insert(Payment::new(1, "R354361834", 6999, "USD").with_response_code(PSP))
        .await;
    let queue = Arc::new(InMemoryJobQueue::new(2, 0));

    let ctx = AppContext::builder()
        .with_notification_store(notifications.clone())
        .with_payments(payments.clone())
        .with_job_queue(queue.clone())
        .build();

    let registry = Arc::new(JobRegistry::new());
    register_notification_jobs(&registry).await;
    let (worker, _shutdown_rx) = JobWorker::new(
        queue.clone(),
        registry,
        Arc::new(ctx.clone()),
        "test-worker".to_string(),
    );

    let notify = NotifyConfig::new("username", "password").with_reconcile_delay_seconds(0);
    let config = ConfigBuilder::new().with_notify(notify.clone()).build().unwrap();
    let router = App::with_config(config)
        .register_module(WebhookEndpoint::new(notify))
        .with_context(ctx)
        .into_test_router();

    Shop {
        notifications,
        payments,
        queue,
        worker,
        router,
    }
}

fn authorisation(success: &str) -> Vec<(&'static str, &str)> {
    vec![
        ("pspReference", PSP),
        ("eventDate", "2013-10-21T14:45:45.93Z"),
        ("merchantAccountCode", "Test"),
        ("reason", "41061:1111:6/2016"),
        ("originalReference", ""),
        ("value", "6999"),
        ("eventCode", "AUTHORISATION"),
        ("merchantReference", "R354361834-A3JC8TNJ"),
        ("operations", "CANCEL,CAPTURE,REFUND"),
        ("success", success),
        ("paymentMethod", "visa"),
        ("currency", "USD"),
        ("live", "false"),
    ]
}

async fn deliver(shop: &Shop, fields: &[(&str, &str)]) {
    testing::post(shop.router.clone(), "/adyen/notify")
        .basic_auth("username", "password")
        .form_body(fields)
        .execute()
        .await
        .assert_ok()
        .assert_body(ACCEPTED)
        .await;
}

#[tokio::test]
async fn successful_authorisation_captures_payment() {
    let shop = shop().await;

    deliver(&shop, &authorisation("true")).await;
    assert_eq!(shop.payments.get(1).await.unwrap().state, PaymentState::Pending);

    assert!(shop.worker.process_next_job().await.unwrap().is_some());
    assert_eq!(shop.payments.get(1).await.unwrap().state, PaymentState::Completed);
    assert_eq!(shop.queue.completed_jobs().await.len(), 1);
    assert!(shop.worker.process_next_job().await.unwrap().is_none());
}

#[tokio::test]
async fn refused_authorisation_invalidates_payment() {
    let shop = shop().await;

    deliver(&shop, &authorisation("false")).await;
    shop.worker.process_next_job().await.unwrap();

    assert_eq!(shop.payments.get(1).await.unwrap().state, PaymentState::Invalid);
}

#[tokio::test]
async fn redelivered_notification_is_reconciled_once() {
    let shop = shop().await;

    deliver(&shop, &authorisation("true")).await;
    deliver(&shop, &authorisation("true")).await;

    assert_eq!(shop.notifications.count().await.unwrap(), 1);
    assert!(shop.worker.process_next_job().await.unwrap().is_some());
    assert!(shop.worker.process_next_job().await.unwrap().is_none());
    assert_eq!(shop.payments.get(1).await.unwrap().state, PaymentState::Completed);
}

#[tokio::test]
async fn unrelated_event_leaves_payment_alone() {
    let shop = shop().await;
    let mut fields = authorisation("true");
    fields[6] = ("eventCode", "REPORT_AVAILABLE");

    deliver(&shop, &fields).await;
    shop.worker.process_next_job().await.unwrap();

    assert_eq!(shop.notifications.count().await.unwrap(), 1);
    assert_eq!(shop.payments.get(1).await.unwrap().state, PaymentState::Pending);
}

#[tokio::test]
async fn authorisation_without_outcome_leaves_payment_alone() {
    let shop = shop().await;
    let mut fields = authorisation("true");
    fields.retain(|(key, _)| *key != "success");

    deliver(&shop, &fields).await;

    assert_eq!(shop.notifications.count().await.unwrap(), 0);
    assert!(shop.worker.process_next_job().await.unwrap().is_none());
    assert_eq!(shop.payments.get(1).await.unwrap().state, PaymentState::Pending);
}

#[tokio::test]
async fn capture_after_refusal_is_rejected_without_retry() {
    let shop = shop().await;

    deliver(&shop, &authorisation("false")).await;
    shop.worker.process_next_job().await.unwrap();

    deliver(&shop, &authorisation("true")).await;
    assert!(shop.worker.process_next_job().await.unwrap().is_some());
    assert!(shop.worker.process_next_job().await.unwrap().is_none());

    assert!(shop.queue.failed_jobs().await.is_empty());
    assert_eq!(shop.queue.completed_jobs().await.len(), 2);
    assert_eq!(shop.payments.get(1).await.unwrap().state, PaymentState::Invalid);
}

#[tokio::test]
async fn rejected_credentials_store_nothing() {
    let shop = shop().await;

    testing::post(shop.router.clone(), "/adyen/notify")
        .basic_auth("username", "wrong")
        .form_body(&authorisation("true"))
        .execute()
        .await
        .assert_unauthorized();

    assert_eq!(shop.notifications.count().await.unwrap(), 0);
    assert!(shop.worker.process_next_job().await.unwrap().is_none());
}

#[tokio::test]
async fn health_reports_job_queue() {
    let shop = shop().await;

    testing::get(shop.router.clone(), "/health")
        .execute()
        .await
        .assert_ok()
        .assert_json_path("status", serde_json::json!("healthy"))
        .await
        .assert_json_path("checks.1.name", serde_json::json!("job_queue"))
        .await;
}
