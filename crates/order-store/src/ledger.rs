//! Stock ledger: the only writer of per-product available quantity.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::{Result, StoreError};

/// Stock counters for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub product_id: ProductId,

    /// Units that can still be reserved. Never negative.
    pub available: i64,

    /// Units ever reserved, for analytics only.
    pub reserved_total: i64,

    /// Units in committed sales, net of cancellations.
    pub sold_total: i64,
}

impl StockRecord {
    pub fn new(product_id: ProductId, available: i64) -> Self {
        Self {
            product_id,
            available,
            reserved_total: 0,
            sold_total: 0,
        }
    }
}

/// One product and quantity to reserve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl ReservationLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Lifecycle of a reservation.
///
/// ```text
/// Held ──► Committed ──► Released
///   └──────────────────────►┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    /// Units taken from `available`, order not yet confirmed durable.
    Held,
    /// The order exists; units count as sold.
    Committed,
    /// Units returned to `available`.
    Released,
}

impl ReservationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::Held => "held",
            ReservationState::Committed => "committed",
            ReservationState::Released => "released",
        }
    }
}

impl std::str::FromStr for ReservationState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "held" => Ok(ReservationState::Held),
            "committed" => Ok(ReservationState::Committed),
            "released" => Ok(ReservationState::Released),
            other => Err(format!("unknown reservation state: {other}")),
        }
    }
}

/// Units held for one order. The reservation id is the order id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: OrderId,
    pub lines: Vec<ReservationLine>,
    pub state: ReservationState,
    pub created_at: DateTime<Utc>,
}

/// Atomic stock operations.
///
/// Reservation is all-or-nothing across a cart: either every line is
/// decremented or none is. Each product's decrement is a single
/// compare-and-decrement, so two checkouts racing for the last unit cannot
/// both succeed.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Reserves every line or nothing.
    ///
    /// Fails with `InsufficientStock` naming the first short product, or
    /// `DuplicateReservation` if the id was used before.
    async fn reserve(&self, reservation_id: OrderId, lines: &[ReservationLine]) -> Result<()>;

    /// Marks a held reservation as sold. Returns false if it was not held.
    async fn commit_sale(&self, reservation_id: OrderId) -> Result<bool>;

    /// Returns a reservation's units to stock.
    ///
    /// Idempotent: releasing an unknown or already released reservation
    /// returns false and changes nothing.
    async fn release(&self, reservation_id: OrderId) -> Result<bool>;

    /// Reservations still held that were created before `older_than`.
    async fn stale_holds(&self, older_than: DateTime<Utc>) -> Result<Vec<Reservation>>;

    /// Committed reservations created before `older_than`, oldest first.
    ///
    /// Recovery checks these against their orders to return the units of
    /// a cancellation whose release never landed.
    async fn committed_before(&self, older_than: DateTime<Utc>) -> Result<Vec<Reservation>>;

    /// Units currently available. Unknown products have none.
    async fn available(&self, product_id: &ProductId) -> Result<i64>;

    async fn record(&self, product_id: &ProductId) -> Result<Option<StockRecord>>;

    /// Sets a product's available units. Seeding and admin restock only.
    async fn set_stock(&self, product_id: &ProductId, available: i64) -> Result<()>;
}

/// Sums quantities per product, in product order.
///
/// Locking rows in a stable order keeps concurrent reservations from
/// deadlocking each other.
pub(crate) fn merge_lines(lines: &[ReservationLine]) -> Result<BTreeMap<ProductId, u32>> {
    let mut merged: BTreeMap<ProductId, u32> = BTreeMap::new();
    for line in lines {
        let total = merged.entry(line.product_id.clone()).or_default();
        *total = total
            .checked_add(line.quantity)
            .ok_or_else(|| StoreError::QuantityOverflow(line.product_id.clone()))?;
    }
    Ok(merged)
}
