//! Payment error types.

use checkout::CheckoutError;
use domain::{Classify, ErrorKind, OrderError, PaymentMethod, PaymentStatus};
use order_store::StoreError;
use thiserror::Error;

/// Errors that can occur while paying for an order.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Method-specific fields failed validation. Nothing was charged.
    #[error("Invalid {method} payment details: {reason}")]
    InvalidDetails {
        method: PaymentMethod,
        reason: String,
    },

    /// No provider is registered for the method.
    #[error("Payment method {0} is not available")]
    UnsupportedMethod(PaymentMethod),

    /// The provider did not answer in time. The attempt stays in
    /// processing until a webhook reports its outcome.
    #[error("Payment outcome unknown for attempt {reference}")]
    OutcomeUnknown { reference: String },

    /// The provider failed without reporting an outcome.
    #[error("Payment provider error: {0}")]
    Provider(String),

    /// Order loading, authorization or persistence failed.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
}

impl PaymentError {
    pub fn invalid(method: PaymentMethod, reason: impl Into<String>) -> Self {
        PaymentError::InvalidDetails {
            method,
            reason: reason.into(),
        }
    }

    /// A lost race to start an attempt reads as "already processed".
    pub(crate) fn from_attempt_start(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Store(StoreError::ConcurrencyConflict { .. }) => {
                PaymentError::Checkout(CheckoutError::Order(
                    OrderError::PaymentAlreadyProcessed {
                        status: PaymentStatus::Processing,
                    },
                ))
            }
            other => PaymentError::Checkout(other),
        }
    }
}

impl From<OrderError> for PaymentError {
    fn from(err: OrderError) -> Self {
        PaymentError::Checkout(CheckoutError::Order(err))
    }
}

impl From<StoreError> for PaymentError {
    fn from(err: StoreError) -> Self {
        PaymentError::Checkout(err.into())
    }
}

impl Classify for PaymentError {
    fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::InvalidDetails { .. } | PaymentError::UnsupportedMethod(_) => {
                ErrorKind::Validation
            }
            PaymentError::OutcomeUnknown { .. } | PaymentError::Provider(_) => {
                ErrorKind::Unavailable
            }
            PaymentError::Checkout(err) => err.kind(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            PaymentError::InvalidDetails { .. } => "INVALID_PAYMENT_DETAILS",
            PaymentError::UnsupportedMethod(_) => "UNSUPPORTED_PAYMENT_METHOD",
            PaymentError::OutcomeUnknown { .. } => "PAYMENT_OUTCOME_UNKNOWN",
            PaymentError::Provider(_) => "PAYMENT_PROVIDER_ERROR",
            PaymentError::Checkout(err) => err.code(),
        }
    }
}

/// Convenience type alias for payment results.
pub type Result<T> = std::result::Result<T, PaymentError>;
