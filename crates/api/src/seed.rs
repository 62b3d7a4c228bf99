//! Start-up data for runs without an external catalog or address book.
//!
//! The seed file is JSON:
//!
//! ```json
//! {
//!   "products": [
//!     { "id": "CAFE-HUILA-500G", "merchant_id": "…", "name": "Café del Huila",
//!       "price": 32000, "stock": 40 }
//!   ],
//!   "addresses": [
//!     { "id": "…", "customer_id": "…", "address": { "recipient_name": "…", … } }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};

use checkout::{InMemoryAddressBook, InMemoryCatalog, Product};
use common::{AddressId, Money, ProductId, UserId};
use domain::AddressSnapshot;
use order_store::{StockLedger, StoreError};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid seed file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("product {0} has a negative stock")]
    NegativeStock(ProductId),

    #[error("failed to seed stock: {0}")]
    Stock(#[from] StoreError),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Seed {
    #[serde(default)]
    pub products: Vec<SeedProduct>,
    #[serde(default)]
    pub addresses: Vec<SeedAddress>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedProduct {
    pub id: ProductId,
    pub merchant_id: UserId,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub price: Money,
    #[serde(default)]
    pub discounted_price: Option<Money>,
    /// Available units written to the stock ledger.
    pub stock: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedAddress {
    pub id: AddressId,
    pub customer_id: UserId,
    pub address: AddressSnapshot,
}

/// What [`Seed::apply`] wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub products: usize,
    pub addresses: usize,
}

impl Seed {
    pub async fn load(path: &Path) -> Result<Self, SeedError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SeedError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&raw).map_err(|source| SeedError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes products, stock levels and addresses.
    ///
    /// Stock is set, not added, so re-applying the same file is idempotent.
    pub async fn apply<L: StockLedger>(
        &self,
        catalog: &InMemoryCatalog,
        addresses: &InMemoryAddressBook,
        ledger: &L,
    ) -> Result<SeedSummary, SeedError> {
        if let Some(product) = self.products.iter().find(|p| p.stock < 0) {
            return Err(SeedError::NegativeStock(product.id.clone()));
        }

        for product in &self.products {
            ledger.set_stock(&product.id, product.stock).await?;
            catalog
                .upsert(Product {
                    id: product.id.clone(),
                    merchant_id: product.merchant_id,
                    name: product.name.clone(),
                    image_url: product.image_url.clone(),
                    price: product.price,
                    discounted_price: product.discounted_price,
                })
                .await;
        }

        for entry in &self.addresses {
            addresses
                .insert(entry.id, entry.customer_id, entry.address.clone())
                .await;
        }

        tracing::info!(
            products = self.products.len(),
            addresses = self.addresses.len(),
            "Seed data loaded"
        );
        Ok(SeedSummary {
            products: self.products.len(),
            addresses: self.addresses.len(),
        })
    }
}
