//! Provider adapter trait and the simulated charge shared by every adapter.

use std::time::Duration;

use async_trait::async_trait;
use common::Money;
use domain::PaymentMethod;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::card::CardDetails;
use crate::error::{PaymentError, Result};
use crate::nequi::NequiDetails;
use crate::pse::PseDetails;

/// Method-specific payment fields, tagged by method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "details", rename_all = "lowercase")]
pub enum MethodDetails {
    Pse(PseDetails),
    Nequi(NequiDetails),
    Card(CardDetails),
}

impl MethodDetails {
    pub fn method(&self) -> PaymentMethod {
        match self {
            MethodDetails::Pse(_) => PaymentMethod::Pse,
            MethodDetails::Nequi(_) => PaymentMethod::Nequi,
            MethodDetails::Card(_) => PaymentMethod::Card,
        }
    }
}

/// One charge sent to a provider.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    /// Attempt reference, echoed back by webhooks.
    pub reference: String,
    pub amount: Money,
    pub details: MethodDetails,
}

/// Why a provider declined a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    InsufficientFunds,
    DeclinedByIssuer,
    CancelledByUser,
}

impl RejectionReason {
    pub const ALL: [RejectionReason; 3] = [
        RejectionReason::InsufficientFunds,
        RejectionReason::DeclinedByIssuer,
        RejectionReason::CancelledByUser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::InsufficientFunds => "insufficient_funds",
            RejectionReason::DeclinedByIssuer => "declined_by_issuer",
            RejectionReason::CancelledByUser => "cancelled_by_user",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the provider decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Approved {
        transaction_id: String,
    },
    Rejected {
        transaction_id: String,
        reason: RejectionReason,
    },
}

impl ChargeOutcome {
    pub fn transaction_id(&self) -> &str {
        match self {
            ChargeOutcome::Approved { transaction_id }
            | ChargeOutcome::Rejected { transaction_id, .. } => transaction_id,
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, ChargeOutcome::Approved { .. })
    }
}

/// A payment provider adapter for one method.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// The method this adapter handles.
    fn method(&self) -> PaymentMethod;

    /// Checks method-specific fields before anything is charged.
    fn validate(&self, details: &MethodDetails) -> Result<()>;

    /// Attempts the charge. An `Err` means no outcome is known.
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome>;
}

/// Tuning of the simulated provider call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationSettings {
    /// Probability in `0.0..=1.0` that a charge is approved.
    pub approval_rate: f64,

    /// How long each simulated call takes.
    pub latency: Duration,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            approval_rate: 0.8,
            latency: Duration::from_millis(200),
        }
    }
}

impl SimulationSettings {
    /// Settings that approve every charge immediately.
    pub fn always_approve() -> Self {
        Self {
            approval_rate: 1.0,
            latency: Duration::ZERO,
        }
    }

    /// Settings that reject every charge immediately.
    pub fn always_reject() -> Self {
        Self {
            approval_rate: 0.0,
            latency: Duration::ZERO,
        }
    }
}

/// Simulated external charge: sleeps for the configured latency, then
/// draws an outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct Simulator {
    settings: SimulationSettings,
}

impl Simulator {
    pub fn new(settings: SimulationSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    pub async fn charge(&self, method: PaymentMethod) -> ChargeOutcome {
        if !self.settings.latency.is_zero() {
            tokio::time::sleep(self.settings.latency).await;
        }

        let transaction_id = format!(
            "TX-{}-{}",
            method.as_str().to_ascii_uppercase(),
            uuid::Uuid::new_v4().simple()
        );

        let mut rng = rand::thread_rng();
        let approval_rate = self.settings.approval_rate.clamp(0.0, 1.0);
        if rng.gen_bool(approval_rate) {
            ChargeOutcome::Approved { transaction_id }
        } else {
            let reason = RejectionReason::ALL[rng.gen_range(0..RejectionReason::ALL.len())];
            ChargeOutcome::Rejected {
                transaction_id,
                reason,
            }
        }
    }
}

/// Rejects details meant for another method.
pub(crate) fn mismatch(expected: PaymentMethod, details: &MethodDetails) -> PaymentError {
    PaymentError::invalid(
        expected,
        format!("received {} details", details.method()),
    )
}

/// True if `value` is all ASCII digits and its length is in `range`.
pub(crate) fn digits_in(value: &str, range: std::ops::RangeInclusive<usize>) -> bool {
    range.contains(&value.len()) && value.bytes().all(|b| b.is_ascii_digit())
}
