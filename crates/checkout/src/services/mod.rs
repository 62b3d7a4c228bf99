//! Collaborators outside the order core.
//!
//! Each one is a trait the services depend on, plus an in-memory
//! implementation used by tests and by the server when nothing else is
//! wired in.

pub mod address_book;
pub mod cart;
pub mod catalog;
pub mod merchant_stats;
pub mod notifications;

use std::sync::Arc;

pub use address_book::{AddressBook, InMemoryAddressBook};
pub use cart::{CartItem, CartStore, InMemoryCartStore};
pub use catalog::{Catalog, InMemoryCatalog, Product};
pub use merchant_stats::{
    InMemoryMerchantStats, MerchantStatsDelta, MerchantStatsStore, sales_by_merchant,
};
pub use notifications::{
    InMemoryNotificationDispatcher, Notification, NotificationDispatcher, NotificationKind,
};

use crate::notifier::Notifier;

/// The external collaborators shared by the order services.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn Catalog>,
    pub address_book: Arc<dyn AddressBook>,
    pub carts: Arc<dyn CartStore>,
    pub merchant_stats: Arc<dyn MerchantStatsStore>,
    pub notifier: Notifier,
}

impl Collaborators {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        address_book: Arc<dyn AddressBook>,
        carts: Arc<dyn CartStore>,
        merchant_stats: Arc<dyn MerchantStatsStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            catalog,
            address_book,
            carts,
            merchant_stats,
            notifier: Notifier::new(dispatcher),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
