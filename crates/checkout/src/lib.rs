//! Order services for the marketplace order core.
//!
//! - [`OrderCreationService`] turns a cart into a pending order with its
//!   stock held, and sweeps stale holds after a crash
//! - [`OrderStateService`] applies the transition table, cancellation,
//!   delivery confirmation and order reads
//! - [`OrderCommandHandler`] is the read-validate-write loop both build on
//! - [`services`] holds the collaborator traits (catalog, address book,
//!   carts, merchant statistics, notifications) with in-memory versions

pub mod command;
pub mod creation;
pub mod error;
pub mod notifier;
pub mod services;
pub mod state_service;

pub use command::{CommandResult, OrderCommandHandler};
pub use creation::{CreateOrderRequest, OrderCreationService, RecoveryReport};
pub use error::{CheckoutError, Result, ServiceError};
pub use notifier::{Notifier, order_payload};
pub use services::{
    AddressBook, CartItem, CartStore, Catalog, Collaborators, InMemoryAddressBook,
    InMemoryCartStore, InMemoryCatalog, InMemoryMerchantStats, InMemoryNotificationDispatcher,
    MerchantStatsDelta, MerchantStatsStore, Notification, NotificationDispatcher,
    NotificationKind, Product,
};
pub use state_service::{MerchantOrderView, OrderStateService};
