//! Outbound notifications.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::UserId;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, RwLock};

use crate::error::ServiceError;

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderPlaced,
    NewSale,
    OrderShipped,
    OrderDelivered,
    OrderCancelled,
    PaymentApproved,
    PaymentRejected,
    DeliveryConfirmed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OrderPlaced => "order_placed",
            NotificationKind::NewSale => "new_sale",
            NotificationKind::OrderShipped => "order_shipped",
            NotificationKind::OrderDelivered => "order_delivered",
            NotificationKind::OrderCancelled => "order_cancelled",
            NotificationKind::PaymentApproved => "payment_approved",
            NotificationKind::PaymentRejected => "payment_rejected",
            NotificationKind::DeliveryConfirmed => "delivery_confirmed",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message for one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient_id: UserId,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
}

impl Notification {
    pub fn new(recipient_id: UserId, kind: NotificationKind, payload: serde_json::Value) -> Self {
        Self {
            recipient_id,
            kind,
            payload,
        }
    }
}

/// Delivers notifications. Callers never wait on the result beyond logging it.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryDispatcherState {
    sent: Vec<Notification>,
    fail_on_notify: bool,
}

/// Records every delivered notification. Used in tests and as the default
/// dispatcher when no transport is configured.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationDispatcher {
    state: Arc<RwLock<InMemoryDispatcherState>>,
    delivered: Arc<Notify>,
}

impl InMemoryNotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all notifications delivered so far.
    pub async fn sent(&self) -> Vec<Notification> {
        self.state.read().await.sent.clone()
    }

    /// Returns delivered notifications of one kind.
    pub async fn sent_of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.state
            .read()
            .await
            .sent
            .iter()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect()
    }

    /// Configures the dispatcher to fail every delivery.
    pub async fn set_fail_on_notify(&self, fail: bool) {
        self.state.write().await.fail_on_notify = fail;
    }

    /// Waits until at least `count` notifications were delivered.
    ///
    /// Returns false if the timeout elapses first.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.delivered.notified();
                if self.state.read().await.sent.len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

#[async_trait]
impl NotificationDispatcher for InMemoryNotificationDispatcher {
    async fn notify(&self, notification: Notification) -> Result<(), ServiceError> {
        {
            let mut state = self.state.write().await;
            if state.fail_on_notify {
                return Err(ServiceError::new("notifications", "delivery failed"));
            }
            state.sent.push(notification);
        }
        self.delivered.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_records_notifications() {
        let dispatcher = InMemoryNotificationDispatcher::new();
        let merchant = UserId::new();
        dispatcher
            .notify(Notification::new(
                merchant,
                NotificationKind::NewSale,
                json!({"units": 2}),
            ))
            .await
            .unwrap();

        let sent = dispatcher.sent_of_kind(NotificationKind::NewSale).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient_id, merchant);
    }

    #[tokio::test]
    async fn test_wait_for_wakes_on_delivery() {
        let dispatcher = InMemoryNotificationDispatcher::new();
        let background = dispatcher.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            background
                .notify(Notification::new(
                    UserId::new(),
                    NotificationKind::OrderPlaced,
                    json!({}),
                ))
                .await
                .unwrap();
        });

        assert!(dispatcher.wait_for(1, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let dispatcher = InMemoryNotificationDispatcher::new();
        assert!(!dispatcher.wait_for(1, Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_failing_dispatcher_records_nothing() {
        let dispatcher = InMemoryNotificationDispatcher::new();
        dispatcher.set_fail_on_notify(true).await;
        let result = dispatcher
            .notify(Notification::new(
                UserId::new(),
                NotificationKind::OrderCancelled,
                json!({}),
            ))
            .await;
        assert!(result.is_err());
        assert!(dispatcher.sent().await.is_empty());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let value = serde_json::to_value(NotificationKind::NewSale).unwrap();
        assert_eq!(value, json!("new_sale"));
    }
}
