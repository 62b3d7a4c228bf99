//! PSE bank transfer adapter.

use async_trait::async_trait;
use domain::PaymentMethod;
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};
use crate::provider::{
    ChargeOutcome, ChargeRequest, MethodDetails, PaymentProvider, Simulator, digits_in, mismatch,
};

/// Banks reachable through PSE, by ACH code.
pub const PSE_BANKS: &[(&str, &str)] = &[
    ("1001", "Banco de Bogotá"),
    ("1002", "Banco Popular"),
    ("1006", "Banco Itaú"),
    ("1007", "Bancolombia"),
    ("1009", "Citibank"),
    ("1012", "Banco GNB Sudameris"),
    ("1013", "BBVA Colombia"),
    ("1019", "Scotiabank Colpatria"),
    ("1023", "Banco de Occidente"),
    ("1032", "Banco Caja Social"),
    ("1040", "Banco Agrario"),
    ("1051", "Davivienda"),
    ("1052", "Banco AV Villas"),
    ("1062", "Banco Falabella"),
    ("1507", "Nequi"),
    ("1551", "Daviplata"),
];

/// Whether the payer is a person or a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonType {
    Natural,
    Juridical,
}

/// Fields of a PSE payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PseDetails {
    pub bank_code: String,
    pub person_type: PersonType,

    /// Payer's identity document, 6 to 10 digits.
    pub document_number: String,
}

impl PseDetails {
    fn validate(&self) -> Result<()> {
        if !PSE_BANKS.iter().any(|(code, _)| *code == self.bank_code) {
            return Err(PaymentError::invalid(
                PaymentMethod::Pse,
                format!("unknown bank code {}", self.bank_code),
            ));
        }
        if !digits_in(&self.document_number, 6..=10) {
            return Err(PaymentError::invalid(
                PaymentMethod::Pse,
                "document number must be 6 to 10 digits",
            ));
        }
        Ok(())
    }
}

/// Simulated PSE provider.
#[derive(Debug, Clone, Default)]
pub struct PseProvider {
    simulator: Simulator,
}

impl PseProvider {
    pub fn new(simulator: Simulator) -> Self {
        Self { simulator }
    }
}

#[async_trait]
impl PaymentProvider for PseProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Pse
    }

    fn validate(&self, details: &MethodDetails) -> Result<()> {
        match details {
            MethodDetails::Pse(pse) => pse.validate(),
            other => Err(mismatch(PaymentMethod::Pse, other)),
        }
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome> {
        tracing::debug!(reference = %request.reference, amount = %request.amount, "Starting PSE transfer");
        Ok(self.simulator.charge(PaymentMethod::Pse).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nequi::NequiDetails;

    fn pse(bank: &str, document: &str) -> MethodDetails {
        MethodDetails::Pse(PseDetails {
            bank_code: bank.to_string(),
            person_type: PersonType::Natural,
            document_number: document.to_string(),
        })
    }

    #[test]
    fn test_valid_details() {
        let provider = PseProvider::default();
        assert!(provider.validate(&pse("1007", "1020304050")).is_ok());
        assert!(provider.validate(&pse("1051", "123456")).is_ok());
    }

    #[test]
    fn test_unknown_bank() {
        let err = PseProvider::default()
            .validate(&pse("9999", "1020304050"))
            .unwrap_err();
        assert!(err.to_string().contains("unknown bank code 9999"));
    }

    #[test]
    fn test_document_length() {
        let provider = PseProvider::default();
        assert!(provider.validate(&pse("1007", "12345")).is_err());
        assert!(provider.validate(&pse("1007", "12345678901")).is_err());
        assert!(provider.validate(&pse("1007", "12.345.678")).is_err());
    }

    #[test]
    fn test_rejects_other_method_details() {
        let details = MethodDetails::Nequi(NequiDetails {
            phone_number: "3001234567".to_string(),
        });
        assert!(PseProvider::default().validate(&details).is_err());
    }

    #[test]
    fn test_person_type_wire_names() {
        let value = serde_json::to_value(PersonType::Juridical).unwrap();
        assert_eq!(value, "juridical");
    }
}
