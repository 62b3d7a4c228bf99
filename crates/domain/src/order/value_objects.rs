//! Value objects for the order domain.

use chrono::{DateTime, Utc};
use common::{Money, ProductId, UserId};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Milestone, OrderError};

/// Prefix of every human-readable order number.
pub const ORDER_NUMBER_PREFIX: &str = "ORD";

const ORDER_NUMBER_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const ORDER_NUMBER_SUFFIX_LEN: usize = 6;

/// Human-readable, globally unique order number: `ORD-<millis>-<random>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Generates a fresh order number for the given creation time.
    pub fn generate(at: DateTime<Utc>) -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..ORDER_NUMBER_SUFFIX_LEN)
            .map(|_| {
                let idx = rng.gen_range(0..ORDER_NUMBER_ALPHABET.len());
                ORDER_NUMBER_ALPHABET[idx] as char
            })
            .collect();
        Self(format!(
            "{ORDER_NUMBER_PREFIX}-{}-{suffix}",
            at.timestamp_millis()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One product/quantity entry of an order.
///
/// Name, image and prices are snapshots taken at order time so later
/// catalog edits never alter a historical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub merchant_id: UserId,
    pub product_name: String,
    pub image_url: Option<String>,

    /// Catalog list price at order time.
    pub list_price: Money,

    /// Price actually charged per unit (discounted price when active).
    pub unit_price: Money,

    pub quantity: u32,

    /// `unit_price * quantity`.
    pub subtotal: Money,
}

impl LineItem {
    /// Discount granted on this line relative to the list price.
    pub fn discount(&self) -> Money {
        (self.list_price - self.unit_price).multiply(self.quantity)
    }
}

/// Denormalized copy of the shipping address chosen at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSnapshot {
    pub recipient_name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub region: String,
    pub postal_code: Option<String>,
    pub country: String,
    pub notes: Option<String>,
}

/// One append-only audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: Milestone,
    pub timestamp: DateTime<Utc>,
    pub comment: Option<String>,
    pub actor_id: UserId,
}

/// Supported payment methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Bank transfer through PSE.
    Pse,
    /// Nequi mobile wallet.
    Nequi,
    /// Credit or debit card.
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Pse => "pse",
            PaymentMethod::Nequi => "nequi",
            PaymentMethod::Card => "card",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pse" => Ok(PaymentMethod::Pse),
            "nequi" => Ok(PaymentMethod::Nequi),
            "card" => Ok(PaymentMethod::Card),
            other => Err(format!("unsupported payment method: {other}")),
        }
    }
}

/// Status of the order's payment sub-record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// No attempt made yet.
    #[default]
    Pending,

    /// An attempt is in flight or its outcome is unknown.
    Processing,

    /// Paid. Absorbing: nothing moves a payment out of this state.
    Approved,

    /// Last attempt failed; a new attempt is allowed.
    Rejected,
}

impl PaymentStatus {
    /// Returns true if a new payment attempt may start.
    pub fn accepts_new_attempt(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The order's payment sub-record. One attempt at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Method selected at checkout, replaced by the method of the latest attempt.
    pub method: Option<PaymentMethod>,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,

    /// Reference of the current attempt, sent to the provider and echoed by webhooks.
    pub reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub attempts: u32,
}

/// Customer confirmation of receipt. Set at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub confirmed: bool,
    pub confirmed_at: DateTime<Utc>,
    pub customer_comment: Option<String>,
    pub rating: u8,
}

impl DeliveryRecord {
    pub const MIN_RATING: u8 = 1;
    pub const MAX_RATING: u8 = 5;

    /// Validates a rating before it is recorded.
    pub fn validate_rating(rating: u8) -> Result<(), OrderError> {
        if (Self::MIN_RATING..=Self::MAX_RATING).contains(&rating) {
            Ok(())
        } else {
            Err(OrderError::InvalidRating { rating })
        }
    }
}

/// Outcome reported for a payment attempt, by the provider call or a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentNotice {
    pub reference: String,
    pub transaction_id: String,
    pub approved: bool,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}
