//! Cart store trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ProductId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ServiceError;

/// One line of a customer's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl CartItem {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Customer carts. The order core only ever clears them.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn clear(&self, customer_id: UserId) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryCartState {
    carts: HashMap<UserId, Vec<CartItem>>,
    fail_on_clear: bool,
}

/// In-memory cart store for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartStore {
    state: Arc<RwLock<InMemoryCartState>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a customer's cart.
    pub async fn set_cart(&self, customer_id: UserId, items: Vec<CartItem>) {
        self.state.write().await.carts.insert(customer_id, items);
    }

    /// Returns a customer's cart lines.
    pub async fn items(&self, customer_id: UserId) -> Vec<CartItem> {
        self.state
            .read()
            .await
            .carts
            .get(&customer_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Configures the store to fail on clear.
    pub async fn set_fail_on_clear(&self, fail: bool) {
        self.state.write().await.fail_on_clear = fail;
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn clear(&self, customer_id: UserId) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        if state.fail_on_clear {
            return Err(ServiceError::new("cart store", "clear failed"));
        }
        state.carts.remove(&customer_id);
        Ok(())
    }
}
