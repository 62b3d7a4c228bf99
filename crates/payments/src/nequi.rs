//! Nequi mobile wallet adapter.

use async_trait::async_trait;
use domain::PaymentMethod;
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};
use crate::provider::{
    ChargeOutcome, ChargeRequest, MethodDetails, PaymentProvider, Simulator, digits_in, mismatch,
};

/// Fields of a Nequi payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NequiDetails {
    /// Colombian mobile number: `3` followed by nine digits.
    pub phone_number: String,
}

impl NequiDetails {
    fn validate(&self) -> Result<()> {
        let phone = self.phone_number.as_str();
        if !(phone.starts_with('3') && digits_in(phone, 10..=10)) {
            return Err(PaymentError::invalid(
                PaymentMethod::Nequi,
                "phone number must be 3 followed by 9 digits",
            ));
        }
        Ok(())
    }
}

/// Simulated Nequi push-payment provider.
#[derive(Debug, Clone, Default)]
pub struct NequiProvider {
    simulator: Simulator,
}

impl NequiProvider {
    pub fn new(simulator: Simulator) -> Self {
        Self { simulator }
    }
}

#[async_trait]
impl PaymentProvider for NequiProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Nequi
    }

    fn validate(&self, details: &MethodDetails) -> Result<()> {
        match details {
            MethodDetails::Nequi(nequi) => nequi.validate(),
            other => Err(mismatch(PaymentMethod::Nequi, other)),
        }
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome> {
        tracing::debug!(reference = %request.reference, "Sending Nequi push payment");
        Ok(self.simulator.charge(PaymentMethod::Nequi).await)
    }
}
