//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod state;
mod value_objects;

pub use aggregate::{NoticeDisposition, Order};
pub use commands::PlaceOrder;
pub use events::{
    DeliveryConfirmedData, OrderEvent, OrderPlacedData, PaymentApprovedData,
    PaymentAttemptStartedData, PaymentRejectedData, StatusChangedData,
};
pub use state::{Milestone, OrderStatus, permitted_roles};
pub use value_objects::{
    AddressSnapshot, DeliveryRecord, LineItem, ORDER_NUMBER_PREFIX, OrderNumber, PaymentMethod,
    PaymentNotice, PaymentRecord, PaymentStatus, StatusHistoryEntry,
};

use thiserror::Error;

use crate::error::{Classify, ErrorKind};

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The command targets an order that was never placed.
    #[error("Order has not been placed")]
    NotPlaced,

    /// The order already exists.
    #[error("Order already placed")]
    AlreadyPlaced,

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// The actor does not own the order or lacks the role for the action.
    #[error("Not permitted to {action} this order")]
    Forbidden { action: &'static str },

    /// The requested edge is not in the transition table.
    #[error("Illegal transition: cannot move from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: Milestone },

    /// Delivery was already confirmed.
    #[error("Delivery already confirmed")]
    AlreadyConfirmed,

    /// Rating outside the accepted range.
    #[error("Invalid rating: {rating} (must be between 1 and 5)")]
    InvalidRating { rating: u8 },

    /// A payment attempt is in flight; only its outcome may move the order.
    #[error("A payment attempt is in progress for this order")]
    PaymentInFlight,

    /// Payment is not in a state that accepts a new attempt.
    #[error("Payment already processed (status: {status})")]
    PaymentAlreadyProcessed { status: PaymentStatus },

    /// The order is no longer awaiting payment.
    #[error("Order is {status} and no longer accepts payment")]
    NotAwaitingPayment { status: OrderStatus },

    /// A payment outcome referenced an attempt that is not the current one.
    #[error("Payment reference {received} does not match the current attempt")]
    PaymentReferenceMismatch { received: String },
}

impl Classify for OrderError {
    fn kind(&self) -> ErrorKind {
        match self {
            OrderError::NotPlaced => ErrorKind::NotFound,
            OrderError::NoItems
            | OrderError::InvalidRating { .. }
            | OrderError::PaymentReferenceMismatch { .. } => ErrorKind::Validation,
            OrderError::Forbidden { .. } => ErrorKind::Forbidden,
            OrderError::AlreadyPlaced
            | OrderError::IllegalTransition { .. }
            | OrderError::AlreadyConfirmed
            | OrderError::PaymentInFlight
            | OrderError::PaymentAlreadyProcessed { .. }
            | OrderError::NotAwaitingPayment { .. } => ErrorKind::Conflict,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            OrderError::NotPlaced => "ORDER_NOT_FOUND",
            OrderError::AlreadyPlaced => "ALREADY_PLACED",
            OrderError::NoItems => "EMPTY_CART",
            OrderError::Forbidden { .. } => "FORBIDDEN",
            OrderError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            OrderError::AlreadyConfirmed => "ALREADY_CONFIRMED",
            OrderError::InvalidRating { .. } => "INVALID_RATING",
            OrderError::PaymentInFlight => "PAYMENT_IN_FLIGHT",
            OrderError::PaymentAlreadyProcessed { .. } => "ALREADY_PROCESSED",
            OrderError::NotAwaitingPayment { .. } => "ORDER_NOT_PAYABLE",
            OrderError::PaymentReferenceMismatch { .. } => "PAYMENT_REFERENCE_MISMATCH",
        }
    }
}
