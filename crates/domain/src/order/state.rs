//! Order status state machine.

use common::ActorRole;
use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Confirmed ──► Processing ──► Shipped ──► Delivered
///    │                          │
///    └──────────────────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order placed and stock reserved, awaiting payment.
    #[default]
    Pending,

    /// Payment approved.
    Confirmed,

    /// A merchant is preparing the order.
    Processing,

    /// Handed to the carrier.
    Shipped,

    /// Delivered (terminal state).
    Delivered,

    /// Cancelled, stock released (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Returns true if the customer may confirm receipt in this state.
    pub fn accepts_delivery_confirmation(&self) -> bool {
        matches!(self, OrderStatus::Shipped | OrderStatus::Delivered)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown order status: {s}"))
    }
}

/// An entry kind in the status history.
///
/// Every [`OrderStatus`] is a milestone; `DeliveryConfirmed` is recorded in
/// the history only and never becomes the order's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    DeliveryConfirmed,
}

impl Milestone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Milestone::DeliveryConfirmed => "delivery_confirmed",
            other => other.as_status().map(|s| s.as_str()).unwrap_or_default(),
        }
    }

    /// Returns the status this milestone corresponds to, if any.
    pub fn as_status(&self) -> Option<OrderStatus> {
        match self {
            Milestone::Pending => Some(OrderStatus::Pending),
            Milestone::Confirmed => Some(OrderStatus::Confirmed),
            Milestone::Processing => Some(OrderStatus::Processing),
            Milestone::Shipped => Some(OrderStatus::Shipped),
            Milestone::Delivered => Some(OrderStatus::Delivered),
            Milestone::Cancelled => Some(OrderStatus::Cancelled),
            Milestone::DeliveryConfirmed => None,
        }
    }
}

impl From<OrderStatus> for Milestone {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Pending => Milestone::Pending,
            OrderStatus::Confirmed => Milestone::Confirmed,
            OrderStatus::Processing => Milestone::Processing,
            OrderStatus::Shipped => Milestone::Shipped,
            OrderStatus::Delivered => Milestone::Delivered,
            OrderStatus::Cancelled => Milestone::Cancelled,
        }
    }
}

impl std::fmt::Display for Milestone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The transition table.
///
/// Returns the roles allowed to move an order from `from` to `to`, or
/// `None` when the edge does not exist. This is the only place legal edges
/// are defined.
pub fn permitted_roles(from: OrderStatus, to: OrderStatus) -> Option<&'static [ActorRole]> {
    use ActorRole::*;
    use OrderStatus::*;

    match (from, to) {
        (Pending, Confirmed) => Some(&[System, Administrator]),
        (Pending, Cancelled) => Some(&[Customer, Administrator]),
        (Confirmed, Processing) => Some(&[Merchant, Administrator]),
        (Processing, Shipped) => Some(&[Merchant, Administrator]),
        (Processing, Cancelled) => Some(&[Administrator]),
        (Shipped, Delivered) => Some(&[Merchant, Administrator]),
        _ => None,
    }
}
