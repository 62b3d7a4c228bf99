//! Merchant aggregate statistics.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, UserId};
use domain::Order;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ServiceError;

/// Signed change to a merchant's counters. Cancellations send the negation
/// of what the sale added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MerchantStatsDelta {
    pub units_sold: i64,
    pub revenue: Money,
    pub order_count: i64,
    pub delivered_count: i64,
}

impl MerchantStatsDelta {
    /// A sale of `units` worth `revenue` in one order.
    pub fn sale(units: i64, revenue: Money) -> Self {
        Self {
            units_sold: units,
            revenue,
            order_count: 1,
            delivered_count: 0,
        }
    }

    pub fn delivered() -> Self {
        Self {
            delivered_count: 1,
            ..Self::default()
        }
    }

    /// The delta that undoes this one.
    pub fn reversed(&self) -> Self {
        Self {
            units_sold: -self.units_sold,
            revenue: -self.revenue,
            order_count: -self.order_count,
            delivered_count: -self.delivered_count,
        }
    }
}

impl std::ops::Add for MerchantStatsDelta {
    type Output = MerchantStatsDelta;

    fn add(self, rhs: Self) -> Self::Output {
        MerchantStatsDelta {
            units_sold: self.units_sold + rhs.units_sold,
            revenue: self.revenue + rhs.revenue,
            order_count: self.order_count + rhs.order_count,
            delivered_count: self.delivered_count + rhs.delivered_count,
        }
    }
}

/// Per-merchant sale deltas for an order: units and line revenue of each
/// merchant's lines, one order each.
pub fn sales_by_merchant(order: &Order) -> BTreeMap<UserId, MerchantStatsDelta> {
    let mut sales: BTreeMap<UserId, MerchantStatsDelta> = BTreeMap::new();
    for line in order.line_items() {
        let entry = sales
            .entry(line.merchant_id)
            .or_insert_with(|| MerchantStatsDelta::sale(0, Money::zero()));
        entry.units_sold += i64::from(line.quantity);
        entry.revenue += line.subtotal;
    }
    sales
}

/// Best-effort merchant counters.
#[async_trait]
pub trait MerchantStatsStore: Send + Sync {
    async fn increment(
        &self,
        merchant_id: UserId,
        delta: MerchantStatsDelta,
    ) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryStatsState {
    stats: HashMap<UserId, MerchantStatsDelta>,
    fail_on_increment: bool,
}

/// In-memory merchant statistics.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMerchantStats {
    state: Arc<RwLock<InMemoryStatsState>>,
}

impl InMemoryMerchantStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current totals for a merchant.
    pub async fn stats(&self, merchant_id: UserId) -> MerchantStatsDelta {
        self.state
            .read()
            .await
            .stats
            .get(&merchant_id)
            .copied()
            .unwrap_or_default()
    }

    pub async fn set_fail_on_increment(&self, fail: bool) {
        self.state.write().await.fail_on_increment = fail;
    }
}

#[async_trait]
impl MerchantStatsStore for InMemoryMerchantStats {
    async fn increment(
        &self,
        merchant_id: UserId,
        delta: MerchantStatsDelta,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        if state.fail_on_increment {
            return Err(ServiceError::new("merchant stats", "increment failed"));
        }
        let entry = state.stats.entry(merchant_id).or_default();
        *entry = *entry + delta;
        Ok(())
    }
}
