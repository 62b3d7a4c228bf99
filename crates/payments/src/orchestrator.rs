//! Payment orchestration: attempt start, provider dispatch, outcome merge
//! and webhook reconciliation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use checkout::{
    CheckoutError, Notification, NotificationKind, Notifier, OrderCommandHandler, order_payload,
};
use chrono::Utc;
use common::{Actor, OrderId};
use domain::{
    Aggregate, NoticeDisposition, Order, OrderStatus, PaymentMethod, PaymentNotice, PaymentStatus,
};
use order_store::{OrderRepository, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::card::CardProvider;
use crate::error::{PaymentError, Result};
use crate::nequi::NequiProvider;
use crate::provider::{
    ChargeOutcome, ChargeRequest, MethodDetails, PaymentProvider, SimulationSettings, Simulator,
};
use crate::pse::PseProvider;

/// Default bound on a provider call.
pub const DEFAULT_PAYMENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Retries of an outcome merge that lost a write race.
const MERGE_ATTEMPTS: usize = 3;

/// Result of a completed payment attempt.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    pub order: Order,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub reason: Option<String>,
}

impl PaymentOutcome {
    fn from_order(order: Order) -> Self {
        let payment = order.payment();
        Self {
            status: payment.status,
            transaction_id: payment.transaction_id.clone(),
            reason: payment.rejection_reason.clone(),
            order,
        }
    }
}

/// Outcome reported by a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    Approved,
    Rejected,
}

/// Out-of-band payment notification from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentWebhook {
    pub order_id: OrderId,
    pub reference: String,
    pub transaction_id: String,
    pub status: WebhookStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

/// How a payment outcome was merged into the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum MergeResult {
    /// The order changed.
    Applied,

    /// Same transaction and outcome were already recorded.
    Duplicate,

    /// The outcome conflicts with a final state and was dropped.
    Ignored(&'static str),
}

impl MergeResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeResult::Applied => "applied",
            MergeResult::Duplicate => "duplicate",
            MergeResult::Ignored(_) => "ignored",
        }
    }
}

/// Webhook acknowledgement.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookReceipt {
    pub order_id: OrderId,
    #[serde(flatten)]
    pub result: MergeResult,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
}

/// Drives payment attempts for orders.
///
/// Every state change is one versioned write of the order: starting an
/// attempt, and merging its outcome (payment status, transaction id and
/// order confirmation together).
#[derive(Clone)]
pub struct PaymentOrchestrator<R> {
    handler: OrderCommandHandler<R>,
    providers: HashMap<PaymentMethod, Arc<dyn PaymentProvider>>,
    timeout: Duration,
    notifier: Notifier,
}

impl<R: OrderRepository> PaymentOrchestrator<R> {
    /// Creates an orchestrator with no providers registered.
    pub fn new(repository: R, notifier: Notifier, timeout: Duration) -> Self {
        Self {
            handler: OrderCommandHandler::new(repository),
            providers: HashMap::new(),
            timeout,
            notifier,
        }
    }

    /// Creates an orchestrator with the simulated PSE, Nequi and card
    /// providers.
    pub fn with_simulated_providers(
        repository: R,
        notifier: Notifier,
        timeout: Duration,
        settings: SimulationSettings,
    ) -> Self {
        let simulator = Simulator::new(settings);
        Self::new(repository, notifier, timeout)
            .with_provider(Arc::new(PseProvider::new(simulator)))
            .with_provider(Arc::new(NequiProvider::new(simulator)))
            .with_provider(Arc::new(CardProvider::new(simulator)))
    }

    /// Registers a provider, replacing any previous one for its method.
    pub fn with_provider(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.providers.insert(provider.method(), provider);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Pays for an order.
    ///
    /// Only the order's customer may pay, only while the order is pending
    /// and no attempt is in flight or approved. Method fields are validated
    /// before anything is written. If the provider does not answer within
    /// the timeout the attempt stays in processing and the caller gets
    /// `OutcomeUnknown`; a webhook settles it later.
    #[tracing::instrument(skip(self, details), fields(actor_id = %actor.id, method = %details.method()))]
    pub async fn process_payment(
        &self,
        actor: &Actor,
        order_id: OrderId,
        details: MethodDetails,
    ) -> Result<PaymentOutcome> {
        let method = details.method();
        let provider = self
            .providers
            .get(&method)
            .cloned()
            .ok_or(PaymentError::UnsupportedMethod(method))?;

        // Authorization and payability first, then method fields
        let current = self.handler.load(order_id).await?;
        current.begin_payment(actor, method)?;
        provider.validate(&details)?;

        let started = self
            .handler
            .execute(order_id, |order| order.begin_payment(actor, method))
            .await
            .map_err(PaymentError::from_attempt_start)?;
        let order = started.order;
        let reference = order.payment().reference.clone().unwrap_or_default();

        tracing::info!(%order_id, %reference, attempt = order.payment().attempts, "Payment attempt started");

        let request = ChargeRequest {
            reference: reference.clone(),
            amount: order.total(),
            details,
        };
        let outcome = match tokio::time::timeout(self.timeout, provider.charge(&request)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                metrics::counter!("payments_processed_total", "method" => method.as_str(), "outcome" => "error")
                    .increment(1);
                tracing::warn!(%order_id, %reference, error = %e, "Provider failed; attempt left in processing");
                return Err(e);
            }
            Err(_) => {
                metrics::counter!("payments_processed_total", "method" => method.as_str(), "outcome" => "unknown")
                    .increment(1);
                tracing::warn!(
                    %order_id,
                    %reference,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Provider timed out; attempt left in processing"
                );
                return Err(PaymentError::OutcomeUnknown { reference });
            }
        };

        let label = if outcome.is_approved() {
            "approved"
        } else {
            "rejected"
        };
        metrics::counter!("payments_processed_total", "method" => method.as_str(), "outcome" => label)
            .increment(1);

        let notice = notice_from(reference, outcome);
        let (order, result) = self.merge(order_id, &notice).await?;
        tracing::info!(%order_id, result = result.as_str(), status = %order.payment().status, "Payment outcome merged");

        Ok(PaymentOutcome::from_order(order))
    }

    /// Applies an out-of-band payment notification.
    ///
    /// Redelivery of an already recorded outcome is acknowledged without
    /// change.
    #[tracing::instrument(skip(self, webhook), fields(order_id = %webhook.order_id, reference = %webhook.reference))]
    pub async fn payment_webhook(&self, webhook: PaymentWebhook) -> Result<WebhookReceipt> {
        let notice = PaymentNotice {
            reference: webhook.reference,
            transaction_id: webhook.transaction_id,
            approved: webhook.status == WebhookStatus::Approved,
            reason: webhook.reason,
            at: Utc::now(),
        };

        let merged = self.merge(webhook.order_id, &notice).await;
        let outcome_label = match &merged {
            Ok((_, result)) => result.as_str(),
            Err(_) => "rejected",
        };
        metrics::counter!("payment_webhooks_total", "outcome" => outcome_label).increment(1);

        let (order, result) = merged?;
        if let MergeResult::Ignored(why) = result {
            tracing::warn!(transaction_id = %notice.transaction_id, reason = why, "Webhook ignored");
        }

        Ok(WebhookReceipt {
            order_id: webhook.order_id,
            result,
            payment_status: order.payment().status,
            order_status: order.status(),
        })
    }

    /// Merges an outcome, retrying when a concurrent writer got there first.
    async fn merge(&self, order_id: OrderId, notice: &PaymentNotice) -> Result<(Order, MergeResult)> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut result = MergeResult::Applied;
            let executed = self
                .handler
                .execute(order_id, |order| match order.resolve_payment(notice)? {
                    NoticeDisposition::Apply(event) => Ok(vec![event]),
                    NoticeDisposition::Duplicate => {
                        result = MergeResult::Duplicate;
                        Ok(vec![])
                    }
                    NoticeDisposition::Ignored(why) => {
                        result = MergeResult::Ignored(why);
                        Ok(vec![])
                    }
                })
                .await;

            match executed {
                Ok(executed) => {
                    if result == MergeResult::Applied {
                        self.announce(&executed.order, notice);
                    }
                    return Ok((executed.order, result));
                }
                Err(CheckoutError::Store(StoreError::ConcurrencyConflict { .. }))
                    if attempt < MERGE_ATTEMPTS =>
                {
                    tracing::debug!(%order_id, attempt, "Outcome merge lost a write race, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn announce(&self, order: &Order, notice: &PaymentNotice) {
        let Some(customer_id) = order.customer_id() else {
            return;
        };
        let mut payload = order_payload(order);
        payload["transaction_id"] = json!(notice.transaction_id);

        let notifications = if notice.approved {
            std::iter::once(customer_id)
                .chain(order.merchant_ids())
                .map(|recipient| {
                    Notification::new(recipient, NotificationKind::PaymentApproved, payload.clone())
                })
                .collect()
        } else {
            payload["reason"] = json!(notice.reason);
            vec![Notification::new(
                customer_id,
                NotificationKind::PaymentRejected,
                payload,
            )]
        };
        self.notifier.send(notifications);
    }
}

impl<R> std::fmt::Debug for PaymentOrchestrator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods: Vec<&str> = self.providers.keys().map(|m| m.as_str()).collect();
        methods.sort_unstable();
        f.debug_struct("PaymentOrchestrator")
            .field("methods", &methods)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn notice_from(reference: String, outcome: ChargeOutcome) -> PaymentNotice {
    match outcome {
        ChargeOutcome::Approved { transaction_id } => PaymentNotice {
            reference,
            transaction_id,
            approved: true,
            reason: None,
            at: Utc::now(),
        },
        ChargeOutcome::Rejected {
            transaction_id,
            reason,
        } => PaymentNotice {
            reference,
            transaction_id,
            approved: false,
            reason: Some(reason.as_str().to_string()),
            at: Utc::now(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use checkout::InMemoryNotificationDispatcher;
    use common::{Money, ProductId, UserId};
    use domain::{AddressSnapshot, Classify, ErrorKind, PlaceOrder, PriceableLine, PricingEngine};
    use order_store::InMemoryOrderRepository;

    use super::*;
    use crate::nequi::NequiDetails;
    use crate::provider::RejectionReason;

    /// Provider that answers from a script and counts charges.
    struct ScriptedProvider {
        outcome: Option<ChargeOutcome>,
        delay: Duration,
        charges: AtomicUsize,
    }

    impl ScriptedProvider {
        fn answering(outcome: ChargeOutcome) -> Self {
            Self {
                outcome: Some(outcome),
                delay: Duration::ZERO,
                charges: AtomicUsize::new(0),
            }
        }

        fn hanging(delay: Duration) -> Self {
            Self {
                outcome: None,
                delay,
                charges: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PaymentProvider for ScriptedProvider {
        fn method(&self) -> PaymentMethod {
            PaymentMethod::Nequi
        }

        fn validate(&self, details: &MethodDetails) -> Result<()> {
            NequiProvider::default().validate(details)
        }

        async fn charge(&self, _request: &ChargeRequest) -> Result<ChargeOutcome> {
            self.charges.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.outcome
                .clone()
                .ok_or_else(|| PaymentError::Provider("no answer".to_string()))
        }
    }

    fn nequi() -> MethodDetails {
        MethodDetails::Nequi(NequiDetails {
            phone_number: "3157654321".to_string(),
        })
    }

    async fn pending_order(repo: &InMemoryOrderRepository) -> (Actor, OrderId) {
        let customer = UserId::new();
        let order_id = OrderId::new();
        let cart = PricingEngine::default()
            .price(&[PriceableLine {
                product_id: ProductId::new("BOCADILLO"),
                merchant_id: UserId::new(),
                name: "Bocadillo veleño".to_string(),
                image_url: None,
                list_price: Money::new(12_000),
                discounted_price: None,
                quantity: 4,
            }])
            .unwrap();
        let mut order = Order::default();
        let events = order
            .place(PlaceOrder::new(
                order_id,
                customer,
                cart,
                AddressSnapshot {
                    recipient_name: "Sofía".to_string(),
                    phone: "3157654321".to_string(),
                    street: "Cl. 35 # 27-16".to_string(),
                    city: "Bucaramanga".to_string(),
                    region: "Santander".to_string(),
                    postal_code: None,
                    country: "CO".to_string(),
                    notes: None,
                },
                PaymentMethod::Nequi,
            ))
            .unwrap();
        order.apply_events(events);
        repo.insert(&order).await.unwrap();
        (Actor::customer(customer), order_id)
    }

    fn orchestrator(
        repo: &InMemoryOrderRepository,
        provider: Arc<dyn PaymentProvider>,
        timeout: Duration,
    ) -> PaymentOrchestrator<InMemoryOrderRepository> {
        let notifier = Notifier::new(Arc::new(InMemoryNotificationDispatcher::new()));
        PaymentOrchestrator::new(repo.clone(), notifier, timeout).with_provider(provider)
    }

    #[tokio::test]
    async fn test_approval_confirms_order_in_one_write() {
        let repo = InMemoryOrderRepository::new();
        let (customer, order_id) = pending_order(&repo).await;
        let provider = Arc::new(ScriptedProvider::answering(ChargeOutcome::Approved {
            transaction_id: "TX-1".to_string(),
        }));
        let payments = orchestrator(&repo, provider, DEFAULT_PAYMENT_TIMEOUT);

        let outcome = payments
            .process_payment(&customer, order_id, nequi())
            .await
            .unwrap();

        assert_eq!(outcome.status, PaymentStatus::Approved);
        assert_eq!(outcome.transaction_id.as_deref(), Some("TX-1"));
        assert_eq!(outcome.order.status(), OrderStatus::Confirmed);

        // insert, attempt start, outcome
        let stored = repo.get(order_id).await.unwrap().unwrap();
        assert_eq!(stored.version(), domain::Version::new(3));
        assert!(stored.payment().paid_at.is_some());
    }

    #[tokio::test]
    async fn test_rejection_keeps_order_pending() {
        let repo = InMemoryOrderRepository::new();
        let (customer, order_id) = pending_order(&repo).await;
        let provider = Arc::new(ScriptedProvider::answering(ChargeOutcome::Rejected {
            transaction_id: "TX-2".to_string(),
            reason: RejectionReason::InsufficientFunds,
        }));
        let payments = orchestrator(&repo, provider, DEFAULT_PAYMENT_TIMEOUT);

        let outcome = payments
            .process_payment(&customer, order_id, nequi())
            .await
            .unwrap();

        assert_eq!(outcome.status, PaymentStatus::Rejected);
        assert_eq!(outcome.reason.as_deref(), Some("insufficient_funds"));
        assert_eq!(outcome.transaction_id.as_deref(), Some("TX-2"));
        assert_eq!(outcome.order.status(), OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_invalid_details_write_nothing() {
        let repo = InMemoryOrderRepository::new();
        let (customer, order_id) = pending_order(&repo).await;
        let provider = Arc::new(ScriptedProvider::answering(ChargeOutcome::Approved {
            transaction_id: "TX-3".to_string(),
        }));
        let payments = orchestrator(&repo, provider.clone(), DEFAULT_PAYMENT_TIMEOUT);

        let err = payments
            .process_payment(
                &customer,
                order_id,
                MethodDetails::Nequi(NequiDetails {
                    phone_number: "12345".to_string(),
                }),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(provider.charges.load(Ordering::SeqCst), 0);
        let stored = repo.get(order_id).await.unwrap().unwrap();
        assert_eq!(stored.payment().status, PaymentStatus::Pending);
        assert_eq!(stored.payment().attempts, 0);
    }

    #[tokio::test]
    async fn test_only_the_owner_pays() {
        let repo = InMemoryOrderRepository::new();
        let (_, order_id) = pending_order(&repo).await;
        let provider = Arc::new(ScriptedProvider::answering(ChargeOutcome::Approved {
            transaction_id: "TX-4".to_string(),
        }));
        let payments = orchestrator(&repo, provider, DEFAULT_PAYMENT_TIMEOUT);

        let err = payments
            .process_payment(&Actor::customer(UserId::new()), order_id, nequi())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_unregistered_method() {
        let repo = InMemoryOrderRepository::new();
        let (customer, order_id) = pending_order(&repo).await;
        let notifier = Notifier::new(Arc::new(InMemoryNotificationDispatcher::new()));
        let payments = PaymentOrchestrator::new(repo, notifier, DEFAULT_PAYMENT_TIMEOUT);

        let err = payments
            .process_payment(&customer, order_id, nequi())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_PAYMENT_METHOD");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_attempt_processing() {
        let repo = InMemoryOrderRepository::new();
        let (customer, order_id) = pending_order(&repo).await;
        let provider = Arc::new(ScriptedProvider::hanging(Duration::from_secs(60)));
        let payments = orchestrator(&repo, provider, Duration::from_secs(5));

        let err = payments
            .process_payment(&customer, order_id, nequi())
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::OutcomeUnknown { ref reference } if reference.ends_with("-1")));
        let stored = repo.get(order_id).await.unwrap().unwrap();
        assert_eq!(stored.payment().status, PaymentStatus::Processing);

        let retry = payments
            .process_payment(&customer, order_id, nequi())
            .await
            .unwrap_err();
        assert_eq!(retry.code(), "ALREADY_PROCESSED");
    }

    #[tokio::test(start_paused = true)]
    async fn test_webhook_settles_unknown_outcome() {
        let repo = InMemoryOrderRepository::new();
        let (customer, order_id) = pending_order(&repo).await;
        let provider = Arc::new(ScriptedProvider::hanging(Duration::from_secs(60)));
        let payments = orchestrator(&repo, provider, Duration::from_secs(1));

        let PaymentError::OutcomeUnknown { reference } = payments
            .process_payment(&customer, order_id, nequi())
            .await
            .unwrap_err()
        else {
            panic!("expected unknown outcome");
        };

        let webhook = PaymentWebhook {
            order_id,
            reference,
            transaction_id: "TX-LATE".to_string(),
            status: WebhookStatus::Approved,
            reason: None,
        };
        let receipt = payments.payment_webhook(webhook.clone()).await.unwrap();
        assert_eq!(receipt.result, MergeResult::Applied);
        assert_eq!(receipt.order_status, OrderStatus::Confirmed);

        let replay = payments.payment_webhook(webhook).await.unwrap();
        assert_eq!(replay.result, MergeResult::Duplicate);

        let stored = repo.get(order_id).await.unwrap().unwrap();
        assert_eq!(stored.version(), domain::Version::new(3));
    }

    #[tokio::test]
    async fn test_webhook_for_stale_attempt_is_rejected() {
        let repo = InMemoryOrderRepository::new();
        let (customer, order_id) = pending_order(&repo).await;
        let provider = Arc::new(ScriptedProvider::answering(ChargeOutcome::Rejected {
            transaction_id: "TX-5".to_string(),
            reason: RejectionReason::DeclinedByIssuer,
        }));
        let payments = orchestrator(&repo, provider, DEFAULT_PAYMENT_TIMEOUT);
        payments
            .process_payment(&customer, order_id, nequi())
            .await
            .unwrap();

        let err = payments
            .payment_webhook(PaymentWebhook {
                order_id,
                reference: "PAY-SOMETHING-ELSE-9".to_string(),
                transaction_id: "TX-6".to_string(),
                status: WebhookStatus::Approved,
                reason: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PAYMENT_REFERENCE_MISMATCH");
    }

    #[test]
    fn test_webhook_status_wire_format() {
        let webhook: PaymentWebhook = serde_json::from_value(json!({
            "order_id": OrderId::new(),
            "reference": "PAY-ORD-1-1",
            "transaction_id": "TX-9",
            "status": "rejected"
        }))
        .unwrap();
        assert_eq!(webhook.status, WebhookStatus::Rejected);
        assert!(webhook.reason.is_none());
    }
}
