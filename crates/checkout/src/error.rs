//! Checkout error types.

use common::{AddressId, OrderId, ProductId};
use domain::{Classify, ErrorKind, OrderError, PricingError};
use order_store::StoreError;
use thiserror::Error;

/// Failure of an external collaborator (catalog, address book, cart,
/// statistics store, notification transport).
#[derive(Debug, Clone, Error)]
#[error("{service} unavailable: {reason}")]
pub struct ServiceError {
    pub service: &'static str,
    pub reason: String,
}

impl ServiceError {
    pub fn new(service: &'static str, reason: impl Into<String>) -> Self {
        Self {
            service,
            reason: reason.into(),
        }
    }
}

/// Errors that can occur while creating or transitioning orders.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The shipping address does not exist or is not the customer's.
    #[error("Address not found: {0}")]
    AddressNotFound(AddressId),

    /// The cart has no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// A cart line asks for zero units.
    #[error("Invalid quantity for product {product_id}")]
    InvalidQuantity { product_id: ProductId },

    /// A cart line references an unknown product.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Not enough stock for a line. Nothing was reserved.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: i64,
    },

    /// The cart's amounts do not fit in a money amount.
    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order rejected the command.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Storage error.
    #[error(transparent)]
    Store(StoreError),

    /// A collaborator needed on the critical path failed.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OrderNotFound(id) => CheckoutError::OrderNotFound(id),
            StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => CheckoutError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            other => CheckoutError::Store(other),
        }
    }
}

impl Classify for CheckoutError {
    fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::AddressNotFound(_)
            | CheckoutError::ProductNotFound(_)
            | CheckoutError::OrderNotFound(_) => ErrorKind::NotFound,
            CheckoutError::EmptyCart | CheckoutError::InvalidQuantity { .. } => {
                ErrorKind::Validation
            }
            CheckoutError::InsufficientStock { .. } => ErrorKind::InsufficientResource,
            CheckoutError::Pricing(err) => err.kind(),
            CheckoutError::Order(err) => err.kind(),
            CheckoutError::Store(err) => err.kind(),
            CheckoutError::Service(_) => ErrorKind::Internal,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            CheckoutError::AddressNotFound(_) => "ADDRESS_NOT_FOUND",
            CheckoutError::EmptyCart => "EMPTY_CART",
            CheckoutError::InvalidQuantity { .. } => "INVALID_QUANTITY",
            CheckoutError::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            CheckoutError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            CheckoutError::OrderNotFound(_) => "ORDER_NOT_FOUND",
            CheckoutError::Pricing(err) => err.code(),
            CheckoutError::Order(err) => err.code(),
            CheckoutError::Store(err) => err.code(),
            CheckoutError::Service(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
