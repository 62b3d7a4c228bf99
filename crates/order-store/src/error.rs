use common::{OrderId, ProductId};
use domain::{Classify, ErrorKind, Version};
use thiserror::Error;

/// Errors that can occur when reading or writing orders and stock.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The order was modified since it was read.
    #[error(
        "Concurrent modification of order {order_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        order_id: OrderId,
        expected: Version,
        actual: Version,
    },

    /// The order was not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// An order with this id already exists.
    #[error("Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// Another order already uses this order number.
    #[error("Order number already in use: {0}")]
    DuplicateOrderNumber(String),

    /// Only placed orders (with id and number) can be stored.
    #[error("Order has not been placed")]
    Unplaced,

    /// Not enough units to reserve. Nothing was reserved.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: i64,
    },

    /// A product's merged reservation quantity does not fit in a `u32`.
    #[error("Quantity out of range for product {0}")]
    QuantityOverflow(ProductId),

    /// A reservation with this id already exists.
    #[error("Reservation already exists: {0}")]
    DuplicateReservation(OrderId),

    /// Stock cannot be set below zero.
    #[error("Invalid stock level for product {product_id}: {quantity}")]
    InvalidStockLevel { product_id: ProductId, quantity: i64 },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Classify for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::ConcurrencyConflict { .. }
            | StoreError::DuplicateOrder(_)
            | StoreError::DuplicateOrderNumber(_)
            | StoreError::DuplicateReservation(_) => ErrorKind::Conflict,
            StoreError::OrderNotFound(_) => ErrorKind::NotFound,
            StoreError::InsufficientStock { .. } => ErrorKind::InsufficientResource,
            StoreError::InvalidStockLevel { .. } | StoreError::QuantityOverflow(_) => {
                ErrorKind::Validation
            }
            StoreError::Unplaced
            | StoreError::Database(_)
            | StoreError::Migration(_)
            | StoreError::Serialization(_) => ErrorKind::Internal,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            StoreError::ConcurrencyConflict { .. } => "CONCURRENT_MODIFICATION",
            StoreError::OrderNotFound(_) => "ORDER_NOT_FOUND",
            StoreError::DuplicateOrder(_) => "DUPLICATE_ORDER",
            StoreError::DuplicateOrderNumber(_) => "DUPLICATE_ORDER_NUMBER",
            StoreError::Unplaced => "ORDER_NOT_PLACED",
            StoreError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            StoreError::DuplicateReservation(_) => "DUPLICATE_RESERVATION",
            StoreError::InvalidStockLevel { .. } => "INVALID_STOCK_LEVEL",
            StoreError::QuantityOverflow(_) => "INVALID_QUANTITY",
            StoreError::Database(_) | StoreError::Migration(_) | StoreError::Serialization(_) => {
                "INTERNAL_ERROR"
            }
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
