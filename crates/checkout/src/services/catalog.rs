//! Catalog lookup trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, ProductId, UserId};
use tokio::sync::RwLock;

use crate::error::ServiceError;

/// Product data needed to price a cart line.
///
/// Stock is not part of this view: the stock ledger is the only authority
/// on available units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: ProductId,
    pub merchant_id: UserId,
    pub name: String,
    pub image_url: Option<String>,
    pub price: Money,
    pub discounted_price: Option<Money>,
}

/// Read access to the product catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Looks up a product. Returns None if it does not exist.
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    products: HashMap<ProductId, Product>,
    fail_on_lookup: bool,
}

/// In-memory catalog for testing and database-less runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<InMemoryCatalogState>>,
}

impl InMemoryCatalog {
    /// Creates a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a product.
    pub async fn upsert(&self, product: Product) {
        self.state
            .write()
            .await
            .products
            .insert(product.id.clone(), product);
    }

    /// Configures the catalog to fail every lookup.
    pub async fn set_fail_on_lookup(&self, fail: bool) {
        self.state.write().await.fail_on_lookup = fail;
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>, ServiceError> {
        let state = self.state.read().await;
        if state.fail_on_lookup {
            return Err(ServiceError::new("catalog", "lookup failed"));
        }
        Ok(state.products.get(product_id).cloned())
    }
}
