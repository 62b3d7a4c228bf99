//! Cart pricing: line prices, subtotal, tax, shipping and commission split.
//!
//! All amounts are whole currency units. Tax is rounded once, on the
//! aggregate subtotal, never per line.

use common::{Money, ProductId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Classify, ErrorKind};
use crate::order::LineItem;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    /// A line total does not fit in a money amount.
    #[error("Amount out of range for product {0}")]
    LineOverflow(ProductId),

    /// The cart totals do not fit in a money amount.
    #[error("Order total out of range")]
    TotalOverflow,
}

impl Classify for PricingError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }

    fn code(&self) -> &'static str {
        "AMOUNT_OUT_OF_RANGE"
    }
}

/// Tunable pricing constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// VAT in basis points (1900 = 19%).
    pub tax_rate_bps: u32,

    /// Subtotals strictly above this ship for free.
    pub free_shipping_threshold: Money,

    /// Shipping fee charged at or below the threshold.
    pub flat_shipping_fee: Money,

    /// Merchant share of line revenue in basis points (8500 = 85%).
    pub merchant_share_bps: u32,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate_bps: 1_900,
            free_shipping_threshold: Money::new(100_000),
            flat_shipping_fee: Money::new(15_000),
            merchant_share_bps: 8_500,
        }
    }
}

/// A cart line resolved against the catalog, ready to be priced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceableLine {
    pub product_id: ProductId,
    pub merchant_id: UserId,
    pub name: String,
    pub image_url: Option<String>,
    pub list_price: Money,
    pub discounted_price: Option<Money>,
    pub quantity: u32,
}

impl PriceableLine {
    /// The price charged per unit: the discounted price when it is active
    /// (positive and below list), otherwise the list price.
    pub fn effective_price(&self) -> Money {
        match self.discounted_price {
            Some(price) if price.is_positive() && price < self.list_price => price,
            _ => self.list_price,
        }
    }
}

/// Result of pricing a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedCart {
    pub lines: Vec<LineItem>,
    pub subtotal: Money,
    pub discounts: Money,
    pub taxes: Money,
    pub shipping: Money,
    pub total: Money,
}

/// Division of line revenue between merchant and platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommissionSplit {
    pub merchant: Money,
    pub platform: Money,
}

impl std::ops::Add for CommissionSplit {
    type Output = CommissionSplit;

    fn add(self, rhs: Self) -> Self::Output {
        CommissionSplit {
            merchant: self.merchant + rhs.merchant,
            platform: self.platform + rhs.platform,
        }
    }
}

/// Computes order totals from catalog prices.
#[derive(Debug, Clone, Copy, Default)]
pub struct PricingEngine {
    policy: PricingPolicy,
}

impl PricingEngine {
    pub fn new(policy: PricingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }

    /// Prices a cart, snapshotting each line's price.
    ///
    /// Fails when a line or a total would not fit in a money amount.
    pub fn price(&self, lines: &[PriceableLine]) -> Result<PricedCart, PricingError> {
        let items = lines
            .iter()
            .map(|line| {
                let overflow = || PricingError::LineOverflow(line.product_id.clone());
                let unit_price = line.effective_price();
                // List total bounds the line discount
                line.list_price.checked_multiply(line.quantity).ok_or_else(overflow)?;
                Ok(LineItem {
                    product_id: line.product_id.clone(),
                    merchant_id: line.merchant_id,
                    product_name: line.name.clone(),
                    image_url: line.image_url.clone(),
                    list_price: line.list_price,
                    unit_price,
                    quantity: line.quantity,
                    subtotal: unit_price
                        .checked_multiply(line.quantity)
                        .ok_or_else(overflow)?,
                })
            })
            .collect::<Result<Vec<LineItem>, PricingError>>()?;

        let subtotal = Money::checked_sum(items.iter().map(|item| item.subtotal))
            .ok_or(PricingError::TotalOverflow)?;
        let discounts = Money::checked_sum(items.iter().map(LineItem::discount))
            .ok_or(PricingError::TotalOverflow)?;
        let taxes = self.tax(subtotal)?;
        let shipping = self.shipping(subtotal);
        let total = Money::checked_sum([subtotal, taxes, shipping])
            .ok_or(PricingError::TotalOverflow)?;

        Ok(PricedCart {
            lines: items,
            subtotal,
            discounts,
            taxes,
            shipping,
            total,
        })
    }

    /// Tax on the whole subtotal, rounded once.
    pub fn tax(&self, subtotal: Money) -> Result<Money, PricingError> {
        subtotal
            .checked_percent_bps(self.policy.tax_rate_bps)
            .ok_or(PricingError::TotalOverflow)
    }

    pub fn shipping(&self, subtotal: Money) -> Money {
        if subtotal > self.policy.free_shipping_threshold {
            Money::zero()
        } else {
            self.policy.flat_shipping_fee
        }
    }

    /// Splits one line's revenue. The platform takes the remainder so the
    /// two shares always add up to the line total.
    pub fn commission(&self, line_total: Money) -> CommissionSplit {
        let merchant = line_total.percent_bps(self.policy.merchant_share_bps);
        CommissionSplit {
            merchant,
            platform: line_total - merchant,
        }
    }
}
