use async_trait::async_trait;
use common::{OrderId, UserId};
use domain::{Order, Version};

use crate::{OrderQuery, Result, StoreError};

/// Durable storage of order documents.
///
/// Every write is a compare-and-swap on the order's version, so a
/// read-validate-write sequence either lands whole or fails with
/// `ConcurrencyConflict`. All implementations must be thread-safe.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Stores a newly placed order at [`Version::first`].
    ///
    /// Fails with `DuplicateOrder` or `DuplicateOrderNumber` if either key
    /// is taken.
    async fn insert(&self, order: &Order) -> Result<Version>;

    /// Loads an order with its stored version set.
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Replaces the stored order if its version still equals `expected`.
    ///
    /// Returns the new version.
    async fn save(&self, order: &Order, expected: Version) -> Result<Version>;

    /// Orders placed by a customer, newest first.
    async fn list_for_customer(&self, customer_id: UserId, query: &OrderQuery)
    -> Result<Vec<Order>>;

    /// Orders containing at least one line sold by the merchant, newest first.
    async fn list_for_merchant(&self, merchant_id: UserId, query: &OrderQuery)
    -> Result<Vec<Order>>;
}

/// Extension trait providing convenience methods for order repositories.
#[async_trait]
pub trait OrderRepositoryExt: OrderRepository {
    /// Loads an order, failing with `OrderNotFound` if it is absent.
    async fn get_required(&self, order_id: OrderId) -> Result<Order> {
        self.get(order_id)
            .await?
            .ok_or(StoreError::OrderNotFound(order_id))
    }

    /// Checks if an order exists.
    async fn exists(&self, order_id: OrderId) -> Result<bool> {
        Ok(self.get(order_id).await?.is_some())
    }
}

// Blanket implementation for all OrderRepository implementations
impl<T: OrderRepository + ?Sized> OrderRepositoryExt for T {}
