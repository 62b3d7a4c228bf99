//! Best-effort notification fan-out.

use std::sync::Arc;

use domain::{Aggregate, Order};
use serde_json::json;

use crate::services::{Notification, NotificationDispatcher};

/// Common payload fields describing an order.
pub fn order_payload(order: &Order) -> serde_json::Value {
    json!({
        "order_id": order.id(),
        "order_number": order.order_number(),
        "status": order.status(),
        "total": order.total(),
    })
}

/// Sends notifications in the background.
///
/// Delivery runs on a spawned task so the caller's response never waits on
/// it. Failures are logged and counted, never returned.
#[derive(Clone)]
pub struct Notifier {
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl Notifier {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Queues notifications for delivery, in order.
    pub fn send(&self, notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            for notification in notifications {
                let recipient_id = notification.recipient_id;
                let kind = notification.kind;
                if let Err(e) = dispatcher.notify(notification).await {
                    metrics::counter!("notifications_failed_total").increment(1);
                    tracing::warn!(
                        %recipient_id,
                        kind = %kind,
                        error = %e,
                        "Notification delivery failed"
                    );
                }
            }
        });
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}
