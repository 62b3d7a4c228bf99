//! Payments for the marketplace order core.
//!
//! [`PaymentOrchestrator`] starts an attempt on the order, calls the
//! provider adapter for the chosen method under a timeout, and merges the
//! outcome back into the order in one versioned write. Webhooks go through
//! the same merge, so redelivery and late outcomes are harmless.
//!
//! The PSE, Nequi and card adapters validate method fields and simulate the
//! external call with a configurable approval rate and latency.

pub mod card;
pub mod error;
pub mod nequi;
pub mod orchestrator;
pub mod provider;
pub mod pse;

pub use card::{CardDetails, CardProvider};
pub use error::{PaymentError, Result};
pub use nequi::{NequiDetails, NequiProvider};
pub use orchestrator::{
    DEFAULT_PAYMENT_TIMEOUT, MergeResult, PaymentOrchestrator, PaymentOutcome, PaymentWebhook,
    WebhookReceipt, WebhookStatus,
};
pub use provider::{
    ChargeOutcome, ChargeRequest, MethodDetails, PaymentProvider, RejectionReason,
    SimulationSettings, Simulator,
};
pub use pse::{PSE_BANKS, PersonType, PseDetails, PseProvider};
