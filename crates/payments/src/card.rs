//! Credit and debit card adapter.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use domain::PaymentMethod;
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};
use crate::provider::{
    ChargeOutcome, ChargeRequest, MethodDetails, PaymentProvider, Simulator, digits_in, mismatch,
};

/// Fields of a card payment.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    /// 13 to 19 digits; spaces and dashes are ignored.
    pub number: String,
    pub holder_name: String,
    pub expiry_month: u32,

    /// Four-digit year, or two digits meaning 20xx.
    pub expiry_year: u32,
    pub cvv: String,
}

impl CardDetails {
    fn digits(&self) -> String {
        self.number
            .chars()
            .filter(|c| !matches!(c, ' ' | '-'))
            .collect()
    }

    /// Last four digits, for logs.
    pub fn last_four(&self) -> String {
        let digits: Vec<char> = self.digits().chars().collect();
        digits[digits.len().saturating_sub(4)..].iter().collect()
    }

    fn validate_at(&self, now: DateTime<Utc>) -> Result<()> {
        let invalid = |reason: &str| PaymentError::invalid(PaymentMethod::Card, reason);

        let digits = self.digits();
        if !digits_in(&digits, 13..=19) {
            return Err(invalid("card number must be 13 to 19 digits"));
        }
        if !luhn_valid(&digits) {
            return Err(invalid("card number failed checksum"));
        }
        if self.holder_name.trim().is_empty() {
            return Err(invalid("card holder name is required"));
        }
        if !(1..=12).contains(&self.expiry_month) {
            return Err(invalid("expiry month must be between 1 and 12"));
        }
        let year = if self.expiry_year < 100 {
            self.expiry_year + 2000
        } else {
            self.expiry_year
        };
        let today = (now.year(), now.month());
        if (i64::from(year), self.expiry_month) < (i64::from(today.0), today.1) {
            return Err(invalid("card has expired"));
        }
        if !digits_in(&self.cvv, 3..=4) {
            return Err(invalid("CVV must be 3 or 4 digits"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardDetails")
            .field("number", &format_args!("****{}", self.last_four()))
            .field("holder_name", &self.holder_name)
            .field("expiry_month", &self.expiry_month)
            .field("expiry_year", &self.expiry_year)
            .finish_non_exhaustive()
    }
}

/// Luhn checksum over a string of ASCII digits.
fn luhn_valid(digits: &str) -> bool {
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// Simulated card acquirer.
#[derive(Debug, Clone, Default)]
pub struct CardProvider {
    simulator: Simulator,
}

impl CardProvider {
    pub fn new(simulator: Simulator) -> Self {
        Self { simulator }
    }
}

#[async_trait]
impl PaymentProvider for CardProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Card
    }

    fn validate(&self, details: &MethodDetails) -> Result<()> {
        match details {
            MethodDetails::Card(card) => card.validate_at(Utc::now()),
            other => Err(mismatch(PaymentMethod::Card, other)),
        }
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome> {
        if let MethodDetails::Card(card) = &request.details {
            tracing::debug!(
                reference = %request.reference,
                card = %format_args!("****{}", card.last_four()),
                "Authorizing card"
            );
        }
        Ok(self.simulator.charge(PaymentMethod::Card).await)
    }
}
