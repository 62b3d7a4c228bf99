//! Order creation.
//!
//! Everything up to the order insert must leave no trace on failure; the
//! only durable outcomes are "nothing happened" or "order exists in
//! pending with its stock held". Work after the insert (sale commit,
//! merchant statistics, cart clearing, notifications) is best-effort.

use std::time::Instant;

use chrono::{DateTime, Utc};
use common::{Actor, ActorRole, AddressId, OrderId, ProductId};
use domain::{
    Aggregate, Classify, Order, OrderError, OrderStatus, PaymentMethod, PlaceOrder,
    PriceableLine, PricingEngine,
};
use order_store::{OrderRepository, ReservationLine, StockLedger};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{CheckoutError, Result};
use crate::notifier::order_payload;
use crate::services::{CartItem, Collaborators, Notification, NotificationKind, sales_by_merchant};

/// Input of a checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<CartItem>,
    pub shipping_address_id: AddressId,
    pub payment_method: PaymentMethod,
}

/// Outcome of a stale reservation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Holds whose order exists, now committed as sales.
    pub committed: usize,

    /// Holds with no live order, now released back to stock.
    pub released: usize,

    /// Committed sales of cancelled orders, now released back to stock.
    pub restocked: usize,
}

/// Turns a customer's cart into a pending order.
#[derive(Debug, Clone)]
pub struct OrderCreationService<R, L> {
    repository: R,
    ledger: L,
    pricing: PricingEngine,
    collaborators: Collaborators,
}

impl<R, L> OrderCreationService<R, L>
where
    R: OrderRepository,
    L: StockLedger,
{
    pub fn new(
        repository: R,
        ledger: L,
        pricing: PricingEngine,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            repository,
            ledger,
            pricing,
            collaborators,
        }
    }

    pub fn pricing(&self) -> &PricingEngine {
        &self.pricing
    }

    /// Creates an order from the given cart lines.
    ///
    /// Fails before any mutation on bad input, unknown products or short
    /// stock. A lost race for the last units fails at reservation with
    /// nothing held.
    #[tracing::instrument(skip(self, request), fields(customer_id = %actor.id))]
    pub async fn create_order(&self, actor: &Actor, request: CreateOrderRequest) -> Result<Order> {
        let started = Instant::now();
        let result = self.place_order(actor, request).await;
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(
                    order_id = ?order.id(),
                    order_number = ?order.order_number().map(|n| n.as_str()),
                    total = %order.total(),
                    "Order created"
                );
            }
            Err(e) => {
                metrics::counter!("order_creation_failures_total", "reason" => e.code())
                    .increment(1);
                tracing::info!(error = %e, code = e.code(), "Order creation rejected");
            }
        }

        result
    }

    async fn place_order(&self, actor: &Actor, request: CreateOrderRequest) -> Result<Order> {
        if actor.role != ActorRole::Customer {
            return Err(OrderError::Forbidden { action: "place" }.into());
        }
        let customer_id = actor.id;

        // 1. Address snapshot
        let address = self
            .collaborators
            .address_book
            .resolve(customer_id, request.shipping_address_id)
            .await?
            .ok_or(CheckoutError::AddressNotFound(request.shipping_address_id))?;

        // 2. Cart shape
        if request.items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let lines = merge_cart(&request.items)?;

        // 3. Products and stock, before any mutation
        let mut priceable = Vec::with_capacity(lines.len());
        for (product_id, quantity) in &lines {
            let product = self
                .collaborators
                .catalog
                .get_product(product_id)
                .await?
                .ok_or_else(|| CheckoutError::ProductNotFound(product_id.clone()))?;

            let available = self.ledger.available(product_id).await?;
            if available < i64::from(*quantity) {
                metrics::counter!("stock_reservation_failures_total").increment(1);
                return Err(CheckoutError::InsufficientStock {
                    product_id: product_id.clone(),
                    requested: *quantity,
                    available,
                });
            }

            priceable.push(PriceableLine {
                product_id: product.id,
                merchant_id: product.merchant_id,
                name: product.name,
                image_url: product.image_url,
                list_price: product.price,
                discounted_price: product.discounted_price,
                quantity: *quantity,
            });
        }

        // 4. Pricing and the order itself, still side-effect free
        let cart = self.pricing.price(&priceable)?;
        let order_id = OrderId::new();
        let mut order = Order::default();
        let events = order.place(PlaceOrder::new(
            order_id,
            customer_id,
            cart,
            address,
            request.payment_method,
        ))?;
        order.apply_events(events);

        // 5. Reserve
        let reservation: Vec<ReservationLine> = lines
            .iter()
            .map(|(product_id, quantity)| ReservationLine::new(product_id.clone(), *quantity))
            .collect();
        if let Err(e) = self.ledger.reserve(order_id, &reservation).await {
            metrics::counter!("stock_reservation_failures_total").increment(1);
            return Err(e.into());
        }

        // 6. Persist: the commit point
        match self.repository.insert(&order).await {
            Ok(version) => order.set_version(version),
            Err(e) => {
                tracing::error!(%order_id, error = %e, "Order insert failed, releasing stock");
                if let Err(release_err) = self.ledger.release(order_id).await {
                    tracing::error!(
                        %order_id,
                        error = %release_err,
                        "Stock release failed; hold left for recovery"
                    );
                }
                return Err(e.into());
            }
        }

        if let Err(e) = self.ledger.commit_sale(order_id).await {
            tracing::warn!(%order_id, error = %e, "Sale commit failed; hold left for recovery");
        }

        // 7-8. Best-effort
        self.record_sale(&order).await;
        if let Err(e) = self.collaborators.carts.clear(customer_id).await {
            tracing::warn!(%customer_id, error = %e, "Cart clear failed");
        }
        self.announce(&order);

        Ok(order)
    }

    async fn record_sale(&self, order: &Order) {
        for (merchant_id, delta) in sales_by_merchant(order) {
            if let Err(e) = self
                .collaborators
                .merchant_stats
                .increment(merchant_id, delta)
                .await
            {
                tracing::warn!(%merchant_id, error = %e, "Merchant stats update failed");
            }
        }
    }

    fn announce(&self, order: &Order) {
        let mut notifications: Vec<Notification> = sales_by_merchant(order)
            .into_iter()
            .map(|(merchant_id, sale)| {
                let mut payload = order_payload(order);
                payload["units"] = json!(sale.units_sold);
                payload["revenue"] = json!(sale.revenue);
                Notification::new(merchant_id, NotificationKind::NewSale, payload)
            })
            .collect();
        if let Some(customer_id) = order.customer_id() {
            notifications.push(Notification::new(
                customer_id,
                NotificationKind::OrderPlaced,
                order_payload(order),
            ));
        }
        self.collaborators.notifier.send(notifications);
    }

    /// Settles reservations left behind by a crash or a failed release.
    ///
    /// A held reservation is committed when its order is live and released
    /// when the order is missing or cancelled. A committed reservation
    /// whose order is cancelled is released.
    #[tracing::instrument(skip(self))]
    pub async fn recover_stale_reservations(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for hold in self.ledger.stale_holds(older_than).await? {
            let live = self
                .repository
                .get(hold.id)
                .await?
                .is_some_and(|order| order.status() != OrderStatus::Cancelled);
            if live {
                if self.ledger.commit_sale(hold.id).await? {
                    report.committed += 1;
                }
            } else if self.ledger.release(hold.id).await? {
                report.released += 1;
            }
        }

        for sale in self.ledger.committed_before(older_than).await? {
            let cancelled = self
                .repository
                .get(sale.id)
                .await?
                .is_some_and(|order| order.status() == OrderStatus::Cancelled);
            if cancelled && self.ledger.release(sale.id).await? {
                report.restocked += 1;
            }
        }

        if report != RecoveryReport::default() {
            tracing::warn!(
                committed = report.committed,
                released = report.released,
                restocked = report.restocked,
                "Recovered stale stock reservations"
            );
        }

        Ok(report)
    }
}

/// Merges duplicate product lines, keeping first-seen order.
fn merge_cart(items: &[CartItem]) -> Result<Vec<(ProductId, u32)>> {
    let mut lines: Vec<(ProductId, u32)> = Vec::with_capacity(items.len());
    for item in items {
        if item.quantity == 0 {
            return Err(CheckoutError::InvalidQuantity {
                product_id: item.product_id.clone(),
            });
        }
        match lines.iter_mut().find(|(id, _)| *id == item.product_id) {
            Some((_, quantity)) => {
                *quantity = quantity.checked_add(item.quantity).ok_or_else(|| {
                    CheckoutError::InvalidQuantity {
                        product_id: item.product_id.clone(),
                    }
                })?;
            }
            None => lines.push((item.product_id.clone(), item.quantity)),
        }
    }
    Ok(lines)
}
