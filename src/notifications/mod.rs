//! Adyen notification intake and reconciliation.
//!
//! A notification travels through three stages:
//!
//! 1. [`WebhookEndpoint`] authenticates the call and hands the field bag to
//!    the [`NotificationStore`], which rejects duplicates of
//!    `(psp_reference, event_code, success)`.
//! 2. A [`ReconcileNotificationJob`] is scheduled, after a settlement delay
//!    when the notification would lead to a capture.
//! 3. The [`NotificationReconciler`] captures or invalidates the matching
//!    payment.

mod config;
mod endpoint;
mod error;
mod fields;
mod jobs;
mod model;
mod reconciler;
#[cfg(feature = "database")]
mod sea_orm_store;
mod store;

pub use config::{MAX_RECONCILE_DELAY_SECONDS, NotifyConfig};
pub use endpoint::{ACCEPTED, WebhookEndpoint};
pub use error::NotificationError;
pub use fields::{FieldBagRejection, NotificationFields};
pub use jobs::{RECONCILE_NOTIFICATION, ReconcileNotificationJob, register_notification_jobs};
pub use model::{EventCode, NewNotification, Notification, NotificationKey};
pub use reconciler::{NotificationReconciler, ReconcileOutcome};
#[cfg(feature = "database")]
pub use sea_orm_store::SeaOrmNotificationStore;
pub use store::{InMemoryNotificationStore, NotificationStore};
