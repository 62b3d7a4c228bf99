//! Applying the order state machine: transitions, cancellation, delivery
//! confirmation and reads.

use common::{Actor, ActorRole, OrderId, UserId};
use domain::{Aggregate, CommissionSplit, Order, OrderError, OrderStatus, PricingEngine};
use order_store::{OrderQuery, OrderRepository, StockLedger};
use serde::Serialize;
use serde_json::json;

use crate::command::OrderCommandHandler;
use crate::error::Result;
use crate::notifier::order_payload;
use crate::services::{
    Collaborators, MerchantStatsDelta, Notification, NotificationKind, sales_by_merchant,
};

/// An order as seen by one merchant, with that merchant's share of it.
#[derive(Debug, Clone, Serialize)]
pub struct MerchantOrderView {
    pub order: Order,
    pub earnings: CommissionSplit,
}

/// Moves orders through their lifecycle and serves order reads.
#[derive(Debug, Clone)]
pub struct OrderStateService<R, L> {
    handler: OrderCommandHandler<R>,
    ledger: L,
    pricing: PricingEngine,
    collaborators: Collaborators,
}

impl<R, L> OrderStateService<R, L>
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
            handler: OrderCommandHandler::new(repository),
            ledger,
            pricing,
            collaborators,
        }
    }

    /// Returns a reference to the underlying command handler.
    pub fn handler(&self) -> &OrderCommandHandler<R> {
        &self.handler
    }

    /// Moves an order to `to` on behalf of `actor`.
    ///
    /// The stored order is only replaced if nobody wrote it since it was
    /// read, so of two racing transitions at most one lands.
    #[tracing::instrument(skip(self, comment), fields(actor_id = %actor.id, role = %actor.role))]
    pub async fn transition_order_status(
        &self,
        actor: &Actor,
        order_id: OrderId,
        to: OrderStatus,
        comment: Option<String>,
    ) -> Result<Order> {
        let result = self
            .handler
            .execute(order_id, |order| order.transition(actor, to, comment))
            .await?;
        let order = result.order;

        metrics::counter!("order_transitions_total", "to" => to.as_str()).increment(1);
        tracing::info!(%order_id, status = %to, "Order status changed");

        match to {
            OrderStatus::Cancelled => self.after_cancel(&order).await,
            OrderStatus::Shipped => self.notify_customer(&order, NotificationKind::OrderShipped),
            OrderStatus::Delivered => {
                self.notify_customer(&order, NotificationKind::OrderDelivered)
            }
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Processing => {}
        }

        Ok(order)
    }

    /// Cancels an order. Stock is returned to the ledger.
    pub async fn cancel_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
        reason: Option<String>,
    ) -> Result<Order> {
        self.transition_order_status(actor, order_id, OrderStatus::Cancelled, reason)
            .await
    }

    /// Records the customer's confirmation of receipt. Succeeds once.
    #[tracing::instrument(skip(self, comment), fields(actor_id = %actor.id))]
    pub async fn confirm_delivery(
        &self,
        actor: &Actor,
        order_id: OrderId,
        rating: u8,
        comment: Option<String>,
    ) -> Result<Order> {
        let result = self
            .handler
            .execute(order_id, |order| {
                order.confirm_delivery(actor, rating, comment)
            })
            .await?;
        let order = result.order;

        tracing::info!(%order_id, rating, "Delivery confirmed");

        let merchants = order.merchant_ids();
        for merchant_id in &merchants {
            if let Err(e) = self
                .collaborators
                .merchant_stats
                .increment(*merchant_id, MerchantStatsDelta::delivered())
                .await
            {
                tracing::warn!(%merchant_id, error = %e, "Merchant stats update failed");
            }
        }

        let notifications = merchants
            .into_iter()
            .map(|merchant_id| {
                let mut payload = order_payload(&order);
                payload["rating"] = json!(rating);
                Notification::new(merchant_id, NotificationKind::DeliveryConfirmed, payload)
            })
            .collect();
        self.collaborators.notifier.send(notifications);

        Ok(order)
    }

    /// Loads an order the actor is allowed to see.
    ///
    /// An order that exists but is not the actor's is `Forbidden`, not
    /// `NotFound`.
    pub async fn get_order(&self, actor: &Actor, order_id: OrderId) -> Result<Order> {
        let order = self.handler.load(order_id).await?;
        if !order.is_visible_to(actor) {
            return Err(OrderError::Forbidden { action: "view" }.into());
        }
        Ok(order)
    }

    /// Orders placed by `customer_id`, newest first. Customers may list only
    /// their own orders; administrators may list anyone's.
    pub async fn list_orders_for_customer(
        &self,
        actor: &Actor,
        customer_id: UserId,
        query: &OrderQuery,
    ) -> Result<Vec<Order>> {
        let allowed = match actor.role {
            ActorRole::Customer => actor.id == customer_id,
            ActorRole::Administrator | ActorRole::System => true,
            ActorRole::Merchant => false,
        };
        if !allowed {
            return Err(OrderError::Forbidden { action: "list" }.into());
        }
        Ok(self
            .handler
            .repository()
            .list_for_customer(customer_id, query)
            .await?)
    }

    /// Orders containing the merchant's products, each with the merchant's
    /// 85/15 earnings split for its own lines.
    pub async fn list_orders_for_merchant(
        &self,
        actor: &Actor,
        merchant_id: UserId,
        query: &OrderQuery,
    ) -> Result<Vec<MerchantOrderView>> {
        let allowed = match actor.role {
            ActorRole::Merchant => actor.id == merchant_id,
            ActorRole::Administrator | ActorRole::System => true,
            ActorRole::Customer => false,
        };
        if !allowed {
            return Err(OrderError::Forbidden { action: "list" }.into());
        }

        let orders = self
            .handler
            .repository()
            .list_for_merchant(merchant_id, query)
            .await?;
        Ok(orders
            .into_iter()
            .map(|order| {
                let earnings = order.merchant_earnings(merchant_id, &self.pricing);
                MerchantOrderView { order, earnings }
            })
            .collect())
    }

    async fn after_cancel(&self, order: &Order) {
        let Some(order_id) = order.id() else {
            return;
        };

        match self.ledger.release(order_id).await {
            Ok(true) => tracing::debug!(%order_id, "Stock released"),
            Ok(false) => tracing::debug!(%order_id, "Stock already released"),
            Err(e) => {
                tracing::error!(%order_id, error = %e, "Stock release failed for cancelled order")
            }
        }

        let sales = sales_by_merchant(order);
        for (merchant_id, sale) in &sales {
            if let Err(e) = self
                .collaborators
                .merchant_stats
                .increment(*merchant_id, sale.reversed())
                .await
            {
                tracing::warn!(%merchant_id, error = %e, "Merchant stats reversal failed");
            }
        }

        let mut notifications: Vec<Notification> = sales
            .into_keys()
            .map(|merchant_id| {
                Notification::new(
                    merchant_id,
                    NotificationKind::OrderCancelled,
                    order_payload(order),
                )
            })
            .collect();
        if let Some(customer_id) = order.customer_id() {
            notifications.push(Notification::new(
                customer_id,
                NotificationKind::OrderCancelled,
                order_payload(order),
            ));
        }
        self.collaborators.notifier.send(notifications);
    }

    fn notify_customer(&self, order: &Order, kind: NotificationKind) {
        if let Some(customer_id) = order.customer_id() {
            self.collaborators.notifier.send(vec![Notification::new(
                customer_id,
                kind,
                order_payload(order),
            )]);
        }
    }
}
