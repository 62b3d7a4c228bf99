//! Domain layer for the marketplace order core.
//!
//! This crate holds the pure, I/O-free model:
//! - [`Order`] aggregate with its append-only status history
//! - [`OrderStatus`] and the transition table gated by actor role
//! - [`OrderEvent`]s produced by commands and applied to the aggregate
//! - [`PricingEngine`] for totals, tax, shipping and commission split
//! - [`ErrorKind`] taxonomy shared by every layer above

pub mod aggregate;
pub mod error;
pub mod order;
pub mod pricing;

pub use aggregate::{Aggregate, DomainEvent, Version};
pub use error::{Classify, ErrorKind};
pub use order::{
    AddressSnapshot, DeliveryRecord, LineItem, Milestone, NoticeDisposition, Order, OrderError,
    OrderEvent, OrderNumber, OrderStatus, PaymentMethod, PaymentNotice, PaymentRecord,
    PaymentStatus, PlaceOrder, StatusHistoryEntry, permitted_roles,
};
pub use pricing::{
    CommissionSplit, PriceableLine, PricedCart, PricingEngine, PricingError, PricingPolicy,
};
