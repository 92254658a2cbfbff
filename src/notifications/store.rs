use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::error::NotificationError;
use super::fields::NotificationFields;
use super::model::{NewNotification, Notification, NotificationKey};

/// Durable log of received notifications.
///
/// `log` must reject a second notification with the same
/// `(psp_reference, event_code, success)` tuple at the storage level, so two
/// concurrent deliveries of the same event cannot both be accepted.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Validate and persist a field bag
    async fn log(&self, fields: &NotificationFields) -> std::result::Result<Notification, NotificationError>;

    /// Look up a notification by id
    async fn find(&self, id: &str) -> Result<Option<Notification>>;

    /// All notifications for a PSP reference, oldest first
    async fn find_by_psp_reference(&self, psp_reference: &str) -> Result<Vec<Notification>>;

    /// Number of stored notifications
    async fn count(&self) -> Result<u64>;
}

/// In-memory notification store (for development/testing)
///
/// The uniqueness check and the insert happen under one write lock.
#[derive(Clone, Default)]
pub struct InMemoryNotificationStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    notifications: Vec<Notification>,
    keys: HashSet<NotificationKey>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn log(&self, fields: &NotificationFields) -> std::result::Result<Notification, NotificationError> {
        let new = NewNotification::from_fields(fields)?;
        let key = new.key();

        let mut inner = self.inner.write().await;
        if inner.keys.contains(&key) {
            return Err(NotificationError::Duplicate {
                psp_reference: key.psp_reference,
                event_code: key.event_code,
                success: key.success,
            });
        }

        let notification = new.into_notification(Uuid::new_v4().to_string(), Utc::now());
        inner.keys.insert(key);
        inner.notifications.push(notification.clone());

        Ok(notification)
    }

    async fn find(&self, id: &str) -> Result<Option<Notification>> {
        let inner = self.inner.read().await;
        Ok(inner.notifications.iter().find(|n| n.id == id).cloned())
    }

    async fn find_by_psp_reference(&self, psp_reference: &str) -> Result<Vec<Notification>> {
        let inner = self.inner.read().await;
        Ok(inner
            .notifications
            .iter()
            .filter(|n| n.psp_reference == psp_reference)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.inner.read().await.notifications.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::model::EventCode;

    fn fields(psp: &str, event_code: &str, success: &str) -> NotificationFields {
        let mut fields = NotificationFields::new();
        fields.insert("pspReference", psp);
        fields.insert("eventCode", event_code);
        fields.insert("success", success);
        fields.insert("merchantReference", "R354361834-A3JC8TNJ");
        fields
    }

    #[tokio::test]
    async fn test_log_stores_notification() {
        let store = InMemoryNotificationStore::new();

        let notification = store
            .log(&fields("8513823667306210", "AUTHORISATION", "true"))
            .await
            .unwrap();

        assert_eq!(notification.event_code, EventCode::Authorisation);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(
            store.find(&notification.id).await.unwrap(),
            Some(notification)
        );
    }

    #[tokio::test]
    async fn test_duplicate_is_rejected() {
        let store = InMemoryNotificationStore::new();
        let bag = fields("8513823667306210", "AUTHORISATION", "true");

        store.log(&bag).await.unwrap();
        let err = store.log(&bag).await.unwrap_err();

        assert!(matches!(err, NotificationError::Duplicate { success: true, .. }));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_success_flag_stores_nothing() {
        let store = InMemoryNotificationStore::new();
        let mut bag = fields("8513823667306210", "AUTHORISATION", "true");
        bag.remove("success");

        let err = store.log(&bag).await.unwrap_err();

        assert!(matches!(err, NotificationError::ValidationFailed(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_different_success_flag_is_a_new_notification() {
        let store = InMemoryNotificationStore::new();

        store
            .log(&fields("8513823667306210", "AUTHORISATION", "false"))
            .await
            .unwrap();
        store
            .log(&fields("8513823667306210", "AUTHORISATION", "true"))
            .await
            .unwrap();
        store
            .log(&fields("8513823667306210", "CAPTURE", "true"))
            .await
            .unwrap();

        let stored = store.find_by_psp_reference("8513823667306210").await.unwrap();
        assert_eq!(stored.len(), 3);
        assert!(!stored[0].success);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_store_once() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let bag = fields("8513823667306210", "AUTHORISATION", "true");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let bag = bag.clone();
                tokio::spawn(async move { store.log(&bag).await.is_ok() })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_fields_are_not_stored() {
        let store = InMemoryNotificationStore::new();
        let mut bag = fields("", "AUTHORISATION", "true");
        bag.remove("pspReference");

        let err = store.log(&bag).await.unwrap_err();
        assert!(matches!(err, NotificationError::ValidationFailed(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
