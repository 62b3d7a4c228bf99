//! Payment flows end to end: checkout, provider outcome, webhooks and the
//! state machine sharing one order store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use checkout::{
    CartItem, Collaborators, CreateOrderRequest, InMemoryAddressBook, InMemoryCartStore,
    InMemoryCatalog, InMemoryMerchantStats, InMemoryNotificationDispatcher, NotificationKind,
    OrderCreationService, OrderStateService, Product,
};
use common::{Actor, Money, OrderId, ProductId, UserId};
use domain::{
    AddressSnapshot, Aggregate, Classify, ErrorKind, OrderStatus, PaymentMethod, PaymentStatus,
    PricingEngine,
};
use order_store::{InMemoryOrderRepository, InMemoryStockLedger, OrderRepository, StockLedger};
use payments::{
    CardDetails, ChargeOutcome, ChargeRequest, MergeResult, MethodDetails, NequiDetails,
    NequiProvider, PaymentError, PaymentOrchestrator, PaymentProvider, PaymentWebhook,
    PersonType, PseDetails, SimulationSettings, WebhookStatus,
};

/// Provider that never answers within any sane timeout.
struct SilentProvider;

#[async_trait]
impl PaymentProvider for SilentProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Nequi
    }

    fn validate(&self, details: &MethodDetails) -> payments::Result<()> {
        NequiProvider::default().validate(details)
    }

    async fn charge(&self, _request: &ChargeRequest) -> payments::Result<ChargeOutcome> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(PaymentError::Provider("gave up".to_string()))
    }
}

struct Marketplace {
    creation: OrderCreationService<InMemoryOrderRepository, InMemoryStockLedger>,
    states: OrderStateService<InMemoryOrderRepository, InMemoryStockLedger>,
    repo: InMemoryOrderRepository,
    ledger: InMemoryStockLedger,
    notifications: InMemoryNotificationDispatcher,
    collaborators: Collaborators,
    merchant: UserId,
    customer: Actor,
    address: common::AddressId,
}

impl Marketplace {
    async fn new() -> Self {
        let repo = InMemoryOrderRepository::new();
        let ledger = InMemoryStockLedger::new();
        let catalog = InMemoryCatalog::new();
        let addresses = InMemoryAddressBook::new();
        let notifications = InMemoryNotificationDispatcher::new();

        let merchant = UserId::new();
        catalog
            .upsert(Product {
                id: ProductId::new("SOMBRERO-VUELTIAO"),
                merchant_id: merchant,
                name: "Sombrero vueltiao".to_string(),
                image_url: None,
                price: Money::new(180_000),
                discounted_price: None,
            })
            .await;
        ledger
            .set_stock(&ProductId::new("SOMBRERO-VUELTIAO"), 20)
            .await
            .unwrap();

        let customer_id = UserId::new();
        let address = addresses
            .add(
                customer_id,
                AddressSnapshot {
                    recipient_name: "Camilo".to_string(),
                    phone: "3204445566".to_string(),
                    street: "Av. San Martín # 5-40".to_string(),
                    city: "Cartagena".to_string(),
                    region: "Bolívar".to_string(),
                    postal_code: None,
                    country: "CO".to_string(),
                    notes: Some("Torre 2".to_string()),
                },
            )
            .await;

        let collaborators = Collaborators::new(
            Arc::new(catalog),
            Arc::new(addresses),
            Arc::new(InMemoryCartStore::new()),
            Arc::new(InMemoryMerchantStats::new()),
            Arc::new(notifications.clone()),
        );
        let pricing = PricingEngine::default();

        Self {
            creation: OrderCreationService::new(
                repo.clone(),
                ledger.clone(),
                pricing,
                collaborators.clone(),
            ),
            states: OrderStateService::new(
                repo.clone(),
                ledger.clone(),
                pricing,
                collaborators.clone(),
            ),
            repo,
            ledger,
            notifications,
            collaborators,
            merchant,
            customer: Actor::customer(customer_id),
            address,
        }
    }

    fn payments(&self, settings: SimulationSettings) -> PaymentOrchestrator<InMemoryOrderRepository> {
        PaymentOrchestrator::with_simulated_providers(
            self.repo.clone(),
            self.collaborators.notifier.clone(),
            Duration::from_secs(5),
            settings,
        )
    }

    async fn place(&self) -> OrderId {
        let order = self
            .creation
            .create_order(
                &self.customer,
                CreateOrderRequest {
                    items: vec![CartItem::new("SOMBRERO-VUELTIAO", 1)],
                    shipping_address_id: self.address,
                    payment_method: PaymentMethod::Nequi,
                },
            )
            .await
            .unwrap();
        order.id().unwrap()
    }
}

fn nequi() -> MethodDetails {
    MethodDetails::Nequi(NequiDetails {
        phone_number: "3204445566".to_string(),
    })
}

fn webhook(order_id: OrderId, reference: &str, tx: &str, status: WebhookStatus) -> PaymentWebhook {
    PaymentWebhook {
        order_id,
        reference: reference.to_string(),
        transaction_id: tx.to_string(),
        status,
        reason: None,
    }
}

mod provider_outcome {
    use super::*;

    #[tokio::test]
    async fn approval_confirms_the_order_and_notifies() {
        let market = Marketplace::new().await;
        let order_id = market.place().await;
        let payments = market.payments(SimulationSettings::always_approve());

        let outcome = payments
            .process_payment(&market.customer, order_id, nequi())
            .await
            .unwrap();

        assert_eq!(outcome.status, PaymentStatus::Approved);
        assert!(outcome.transaction_id.as_deref().unwrap().starts_with("TX-NEQUI-"));
        assert_eq!(outcome.order.status(), OrderStatus::Confirmed);
        assert_eq!(
            outcome.order.payment().method,
            Some(PaymentMethod::Nequi)
        );

        let stored = market.repo.get(order_id).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Confirmed);
        assert_eq!(stored.payment().status, PaymentStatus::Approved);
        let history: Vec<&str> = stored
            .status_history()
            .iter()
            .map(|entry| entry.status.as_str())
            .collect();
        assert_eq!(history, ["pending", "confirmed"]);

        // order placed + new sale, then approval to customer and merchant
        assert!(
            market
                .notifications
                .wait_for(4, Duration::from_secs(2))
                .await
        );
        let approvals = market
            .notifications
            .sent_of_kind(NotificationKind::PaymentApproved)
            .await;
        let mut recipients: Vec<UserId> = approvals.iter().map(|n| n.recipient_id).collect();
        recipients.sort();
        let mut expected = vec![market.customer.id, market.merchant];
        expected.sort();
        assert_eq!(recipients, expected);
    }

    #[tokio::test]
    async fn paying_twice_is_already_processed() {
        let market = Marketplace::new().await;
        let order_id = market.place().await;
        let payments = market.payments(SimulationSettings::always_approve());

        payments
            .process_payment(&market.customer, order_id, nequi())
            .await
            .unwrap();
        let err = payments
            .process_payment(&market.customer, order_id, nequi())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.code(), "ALREADY_PROCESSED");
    }

    #[tokio::test]
    async fn rejected_attempt_can_be_retried_with_another_method() {
        let market = Marketplace::new().await;
        let order_id = market.place().await;

        let rejected = market
            .payments(SimulationSettings::always_reject())
            .process_payment(&market.customer, order_id, nequi())
            .await
            .unwrap();
        assert_eq!(rejected.status, PaymentStatus::Rejected);
        assert!(rejected.reason.is_some());
        assert_eq!(rejected.order.status(), OrderStatus::Pending);

        let card = MethodDetails::Card(CardDetails {
            number: "4111 1111 1111 1111".to_string(),
            holder_name: "CAMILO ROJAS".to_string(),
            expiry_month: 12,
            expiry_year: 2099,
            cvv: "321".to_string(),
        });
        let approved = market
            .payments(SimulationSettings::always_approve())
            .process_payment(&market.customer, order_id, card)
            .await
            .unwrap();

        assert_eq!(approved.status, PaymentStatus::Approved);
        assert!(approved.reason.is_none());
        assert_eq!(approved.order.payment().attempts, 2);
        assert_eq!(approved.order.payment().method, Some(PaymentMethod::Card));
        assert!(approved.order.payment().reference.as_deref().unwrap().ends_with("-2"));
    }

    #[tokio::test]
    async fn invalid_pse_details_leave_the_order_untouched() {
        let market = Marketplace::new().await;
        let order_id = market.place().await;
        let payments = market.payments(SimulationSettings::always_approve());

        let err = payments
            .process_payment(
                &market.customer,
                order_id,
                MethodDetails::Pse(PseDetails {
                    bank_code: "0000".to_string(),
                    person_type: PersonType::Natural,
                    document_number: "1020304050".to_string(),
                }),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), "INVALID_PAYMENT_DETAILS");
        let stored = market.repo.get(order_id).await.unwrap().unwrap();
        assert_eq!(stored.payment().status, PaymentStatus::Pending);
        assert_eq!(stored.payment().attempts, 0);
    }

    #[tokio::test]
    async fn cancelled_order_cannot_be_paid() {
        let market = Marketplace::new().await;
        let order_id = market.place().await;
        market
            .states
            .cancel_order(&market.customer, order_id, None)
            .await
            .unwrap();

        let err = market
            .payments(SimulationSettings::always_approve())
            .process_payment(&market.customer, order_id, nequi())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ORDER_NOT_PAYABLE");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_attempts_approve_once() {
        let market = Marketplace::new().await;
        let order_id = market.place().await;
        let payments = Arc::new(market.payments(SimulationSettings::always_approve()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let payments = payments.clone();
                let customer = market.customer;
                tokio::spawn(async move {
                    payments.process_payment(&customer, order_id, nequi()).await
                })
            })
            .collect();

        let mut approved = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(outcome) => approved.push(outcome),
                Err(err) => assert_eq!(err.code(), "ALREADY_PROCESSED"),
            }
        }

        assert_eq!(approved.len(), 1);
        let stored = market.repo.get(order_id).await.unwrap().unwrap();
        assert_eq!(stored.payment().attempts, 1);
        assert_eq!(stored.payment().transaction_id, approved[0].transaction_id);
        assert_eq!(stored.status(), OrderStatus::Confirmed);
    }
}

mod webhooks {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn unknown_outcome_blocks_cancel_until_webhook_settles_it() {
        let market = Marketplace::new().await;
        let order_id = market.place().await;
        let payments = PaymentOrchestrator::new(
            market.repo.clone(),
            market.collaborators.notifier.clone(),
            Duration::from_secs(2),
        )
        .with_provider(Arc::new(SilentProvider));

        let err = payments
            .process_payment(&market.customer, order_id, nequi())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        let PaymentError::OutcomeUnknown { reference } = err else {
            panic!("expected unknown outcome");
        };

        let blocked = market
            .states
            .cancel_order(&market.customer, order_id, None)
            .await
            .unwrap_err();
        assert_eq!(blocked.code(), "PAYMENT_IN_FLIGHT");

        let admin = Actor::administrator(UserId::new());
        let forced = market
            .states
            .transition_order_status(&admin, order_id, OrderStatus::Confirmed, None)
            .await
            .unwrap_err();
        assert_eq!(forced.code(), "PAYMENT_IN_FLIGHT");

        let receipt = payments
            .payment_webhook(webhook(order_id, &reference, "TX-EXT-1", WebhookStatus::Approved))
            .await
            .unwrap();
        assert_eq!(receipt.result, MergeResult::Applied);
        assert_eq!(receipt.payment_status, PaymentStatus::Approved);
        assert_eq!(receipt.order_status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn replayed_webhook_is_acknowledged_without_change() {
        let market = Marketplace::new().await;
        let order_id = market.place().await;
        let payments = market.payments(SimulationSettings::always_approve());
        let outcome = payments
            .process_payment(&market.customer, order_id, nequi())
            .await
            .unwrap();
        let reference = outcome.order.payment().reference.clone().unwrap();
        let tx = outcome.transaction_id.unwrap();
        let before = market.repo.get(order_id).await.unwrap().unwrap();

        let receipt = payments
            .payment_webhook(webhook(order_id, &reference, &tx, WebhookStatus::Approved))
            .await
            .unwrap();

        assert_eq!(receipt.result, MergeResult::Duplicate);
        let after = market.repo.get(order_id).await.unwrap().unwrap();
        assert_eq!(after.version(), before.version());
    }

    #[tokio::test]
    async fn approval_supersedes_earlier_rejection() {
        let market = Marketplace::new().await;
        let order_id = market.place().await;
        let payments = market.payments(SimulationSettings::always_reject());
        let rejected = payments
            .process_payment(&market.customer, order_id, nequi())
            .await
            .unwrap();
        let reference = rejected.order.payment().reference.clone().unwrap();

        let receipt = payments
            .payment_webhook(webhook(order_id, &reference, "TX-LATE-OK", WebhookStatus::Approved))
            .await
            .unwrap();
        assert_eq!(receipt.result, MergeResult::Applied);
        assert_eq!(receipt.order_status, OrderStatus::Confirmed);

        // A rejection arriving after the approval changes nothing
        let late = payments
            .payment_webhook(webhook(order_id, &reference, "TX-LATE-NO", WebhookStatus::Rejected))
            .await
            .unwrap();
        assert!(matches!(late.result, MergeResult::Ignored(_)));
        assert_eq!(late.payment_status, PaymentStatus::Approved);

        let stored = market.repo.get(order_id).await.unwrap().unwrap();
        assert_eq!(stored.payment().transaction_id.as_deref(), Some("TX-LATE-OK"));
    }

    #[tokio::test]
    async fn approval_after_cancel_is_ignored() {
        let market = Marketplace::new().await;
        let order_id = market.place().await;
        let payments = market.payments(SimulationSettings::always_reject());
        let rejected = payments
            .process_payment(&market.customer, order_id, nequi())
            .await
            .unwrap();
        let reference = rejected.order.payment().reference.clone().unwrap();

        market
            .states
            .cancel_order(&market.customer, order_id, Some("changed my mind".to_string()))
            .await
            .unwrap();
        assert_eq!(
            market
                .ledger
                .available(&ProductId::new("SOMBRERO-VUELTIAO"))
                .await
                .unwrap(),
            20
        );

        let receipt = payments
            .payment_webhook(webhook(order_id, &reference, "TX-TOO-LATE", WebhookStatus::Approved))
            .await
            .unwrap();

        assert_eq!(
            receipt.result,
            MergeResult::Ignored("order no longer awaiting payment")
        );
        assert_eq!(receipt.order_status, OrderStatus::Cancelled);
        assert_eq!(receipt.payment_status, PaymentStatus::Rejected);
    }

    #[tokio::test]
    async fn webhook_for_unknown_order_is_not_found() {
        let market = Marketplace::new().await;
        let payments = market.payments(SimulationSettings::always_approve());

        let err = payments
            .payment_webhook(webhook(OrderId::new(), "PAY-X-1", "TX-1", WebhookStatus::Approved))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn webhook_with_stale_reference_is_rejected() {
        let market = Marketplace::new().await;
        let order_id = market.place().await;
        let payments = market.payments(SimulationSettings::always_reject());
        payments
            .process_payment(&market.customer, order_id, nequi())
            .await
            .unwrap();

        let err = payments
            .payment_webhook(webhook(order_id, "PAY-OLD-1", "TX-2", WebhookStatus::Approved))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
