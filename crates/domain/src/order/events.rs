//! Order domain events.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{AddressSnapshot, LineItem, OrderNumber, OrderStatus, PaymentMethod};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was placed with priced, reserved line items.
    OrderPlaced(Box<OrderPlacedData>),

    /// Order moved along the transition table.
    StatusChanged(StatusChangedData),

    /// A payment attempt started.
    PaymentAttemptStarted(PaymentAttemptStartedData),

    /// Payment approved. Also confirms the order.
    PaymentApproved(PaymentApprovedData),

    /// Payment rejected. The order stays pending.
    PaymentRejected(PaymentRejectedData),

    /// Customer confirmed receipt.
    DeliveryConfirmed(DeliveryConfirmedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::StatusChanged(_) => "StatusChanged",
            OrderEvent::PaymentAttemptStarted(_) => "PaymentAttemptStarted",
            OrderEvent::PaymentApproved(_) => "PaymentApproved",
            OrderEvent::PaymentRejected(_) => "PaymentRejected",
            OrderEvent::DeliveryConfirmed(_) => "DeliveryConfirmed",
        }
    }
}

/// Data for OrderPlaced event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub customer_id: UserId,
    pub line_items: Vec<LineItem>,
    pub subtotal: Money,
    pub taxes: Money,
    pub shipping_cost: Money,
    pub discounts: Money,
    pub total: Money,
    pub shipping_address: AddressSnapshot,
    pub payment_method: PaymentMethod,
    pub placed_at: DateTime<Utc>,
}

/// Data for StatusChanged event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor_id: UserId,
    pub comment: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Data for PaymentAttemptStarted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAttemptStartedData {
    pub method: PaymentMethod,
    pub reference: String,
    pub started_at: DateTime<Utc>,
}

/// Data for PaymentApproved event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentApprovedData {
    pub transaction_id: String,
    pub reference: String,
    pub paid_at: DateTime<Utc>,
}

/// Data for PaymentRejected event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRejectedData {
    pub transaction_id: String,
    pub reference: String,
    pub reason: Option<String>,
    pub rejected_at: DateTime<Utc>,
}

/// Data for DeliveryConfirmed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfirmedData {
    pub actor_id: UserId,
    pub rating: u8,
    pub comment: Option<String>,
    pub confirmed_at: DateTime<Utc>,
}
