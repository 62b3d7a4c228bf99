//! Order aggregate implementation.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use common::{Actor, ActorRole, Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, Version};
use crate::pricing::{CommissionSplit, PricingEngine};

use super::{
    AddressSnapshot, DeliveryRecord, LineItem, Milestone, OrderError, OrderEvent, OrderNumber,
    OrderStatus, PaymentMethod, PaymentNotice, PaymentRecord, PaymentStatus, PlaceOrder,
    StatusHistoryEntry,
    events::{
        DeliveryConfirmedData, OrderPlacedData, PaymentApprovedData, PaymentAttemptStartedData,
        PaymentRejectedData, StatusChangedData,
    },
    permitted_roles,
};

/// How a payment notice was handled.
#[derive(Debug, Clone)]
pub enum NoticeDisposition {
    /// The notice changes state; persist the event.
    Apply(OrderEvent),

    /// Same transaction and outcome already recorded.
    Duplicate,

    /// The notice conflicts with a final state and is dropped.
    Ignored(&'static str),
}

/// Order aggregate root.
///
/// Created once at checkout, then mutated only by status transitions and
/// payment outcomes. Never deleted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<OrderId>,

    /// Stored version for optimistic concurrency.
    #[serde(default)]
    version: Version,

    order_number: Option<OrderNumber>,
    customer_id: Option<UserId>,
    line_items: Vec<LineItem>,
    subtotal: Money,
    taxes: Money,
    shipping_cost: Money,
    discounts: Money,
    total: Money,
    status: OrderStatus,

    /// Append-only audit trail.
    status_history: Vec<StatusHistoryEntry>,

    payment: PaymentRecord,
    shipping_address: Option<AddressSnapshot>,
    delivery: Option<DeliveryRecord>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Aggregate for Order {
    type Id = OrderId;
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<OrderId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderPlaced(data) => self.apply_order_placed(*data),
            OrderEvent::StatusChanged(data) => self.apply_status_changed(data),
            OrderEvent::PaymentAttemptStarted(data) => self.apply_payment_attempt_started(data),
            OrderEvent::PaymentApproved(data) => self.apply_payment_approved(data),
            OrderEvent::PaymentRejected(data) => self.apply_payment_rejected(data),
            OrderEvent::DeliveryConfirmed(data) => self.apply_delivery_confirmed(data),
        }
    }
}

// Query methods
impl Order {
    pub fn order_number(&self) -> Option<&OrderNumber> {
        self.order_number.as_ref()
    }

    pub fn customer_id(&self) -> Option<UserId> {
        self.customer_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn taxes(&self) -> Money {
        self.taxes
    }

    pub fn shipping_cost(&self) -> Money {
        self.shipping_cost
    }

    pub fn discounts(&self) -> Money {
        self.discounts
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn status_history(&self) -> &[StatusHistoryEntry] {
        &self.status_history
    }

    pub fn payment(&self) -> &PaymentRecord {
        &self.payment
    }

    pub fn shipping_address(&self) -> Option<&AddressSnapshot> {
        self.shipping_address.as_ref()
    }

    pub fn delivery(&self) -> Option<&DeliveryRecord> {
        self.delivery.as_ref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Returns true if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Distinct merchants with at least one line in this order.
    pub fn merchant_ids(&self) -> BTreeSet<UserId> {
        self.line_items.iter().map(|l| l.merchant_id).collect()
    }

    /// Returns true if the merchant sells at least one line of this order.
    pub fn has_merchant(&self, merchant_id: UserId) -> bool {
        self.line_items.iter().any(|l| l.merchant_id == merchant_id)
    }

    /// Line items sold by one merchant.
    pub fn lines_for(&self, merchant_id: UserId) -> impl Iterator<Item = &LineItem> {
        self.line_items
            .iter()
            .filter(move |l| l.merchant_id == merchant_id)
    }

    /// Merchant/platform split of one merchant's lines, computed from the
    /// stored line totals.
    pub fn merchant_earnings(&self, merchant_id: UserId, engine: &PricingEngine) -> CommissionSplit {
        self.lines_for(merchant_id)
            .map(|line| engine.commission(line.subtotal))
            .fold(CommissionSplit::default(), |acc, split| acc + split)
    }

    /// Returns true if the actor may see this order.
    pub fn is_visible_to(&self, actor: &Actor) -> bool {
        self.authorize(actor, "view").is_ok()
    }

    /// Ownership check, run before the transition table.
    ///
    /// Customers must own the order, merchants must sell one of its lines.
    fn authorize(&self, actor: &Actor, action: &'static str) -> Result<(), OrderError> {
        let owns = match actor.role {
            ActorRole::Customer => self.customer_id == Some(actor.id),
            ActorRole::Merchant => self.has_merchant(actor.id),
            ActorRole::Administrator | ActorRole::System => true,
        };
        if owns {
            Ok(())
        } else {
            Err(OrderError::Forbidden { action })
        }
    }

    fn ensure_placed(&self) -> Result<(), OrderError> {
        if self.id.is_none() {
            return Err(OrderError::NotPlaced);
        }
        Ok(())
    }
}

// Command methods (return events)
impl Order {
    /// Places the order in `pending`.
    pub fn place(&self, cmd: PlaceOrder) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyPlaced);
        }
        if cmd.cart.lines.is_empty() {
            return Err(OrderError::NoItems);
        }

        Ok(vec![OrderEvent::OrderPlaced(Box::new(OrderPlacedData {
            order_id: cmd.order_id,
            order_number: cmd.order_number,
            customer_id: cmd.customer_id,
            line_items: cmd.cart.lines,
            subtotal: cmd.cart.subtotal,
            taxes: cmd.cart.taxes,
            shipping_cost: cmd.cart.shipping,
            discounts: cmd.cart.discounts,
            total: cmd.cart.total,
            shipping_address: cmd.shipping_address,
            payment_method: cmd.payment_method,
            placed_at: cmd.placed_at,
        }))])
    }

    /// Moves the order along the transition table.
    ///
    /// Checks run in order: ownership, edge legality, role for the edge.
    pub fn transition(
        &self,
        actor: &Actor,
        to: OrderStatus,
        comment: Option<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;
        self.authorize(actor, "update")?;

        let roles = permitted_roles(self.status, to).ok_or(OrderError::IllegalTransition {
            from: self.status,
            to: to.into(),
        })?;
        if !roles.contains(&actor.role) {
            return Err(OrderError::Forbidden {
                action: "perform this transition on",
            });
        }

        // Only the payment outcome may settle a pending order with an attempt in flight
        if self.status == OrderStatus::Pending && self.payment.status == PaymentStatus::Processing
        {
            return Err(OrderError::PaymentInFlight);
        }

        Ok(vec![OrderEvent::StatusChanged(StatusChangedData {
            from: self.status,
            to,
            actor_id: actor.id,
            comment,
            changed_at: Utc::now(),
        })])
    }

    /// Starts a payment attempt. Only the owning customer may pay, only
    /// while the order is pending and no attempt is in flight or approved.
    pub fn begin_payment(
        &self,
        actor: &Actor,
        method: PaymentMethod,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;
        if actor.role != ActorRole::Customer || self.customer_id != Some(actor.id) {
            return Err(OrderError::Forbidden { action: "pay for" });
        }
        if !self.payment.status.accepts_new_attempt() {
            return Err(OrderError::PaymentAlreadyProcessed {
                status: self.payment.status,
            });
        }
        if self.status != OrderStatus::Pending {
            return Err(OrderError::NotAwaitingPayment {
                status: self.status,
            });
        }

        Ok(vec![OrderEvent::PaymentAttemptStarted(
            PaymentAttemptStartedData {
                method,
                reference: self.next_payment_reference(),
                started_at: Utc::now(),
            },
        )])
    }

    /// Merges a payment outcome, from the provider call or a webhook.
    ///
    /// Approved is absorbing. An approval wins over a rejection as long as
    /// the order is still pending. Redelivery of an already recorded
    /// transaction and outcome is a no-op.
    pub fn resolve_payment(&self, notice: &PaymentNotice) -> Result<NoticeDisposition, OrderError> {
        self.ensure_placed()?;
        if self.payment.reference.as_deref() != Some(notice.reference.as_str()) {
            return Err(OrderError::PaymentReferenceMismatch {
                received: notice.reference.clone(),
            });
        }

        let same_transaction =
            self.payment.transaction_id.as_deref() == Some(notice.transaction_id.as_str());

        let disposition = match (self.payment.status, notice.approved) {
            (PaymentStatus::Approved, true) if same_transaction => NoticeDisposition::Duplicate,
            (PaymentStatus::Approved, _) => NoticeDisposition::Ignored("payment already approved"),
            (PaymentStatus::Rejected, false) if same_transaction => NoticeDisposition::Duplicate,
            (_, true) if self.status != OrderStatus::Pending => {
                NoticeDisposition::Ignored("order no longer awaiting payment")
            }
            (_, true) => NoticeDisposition::Apply(OrderEvent::PaymentApproved(PaymentApprovedData {
                transaction_id: notice.transaction_id.clone(),
                reference: notice.reference.clone(),
                paid_at: notice.at,
            })),
            (_, false) => NoticeDisposition::Apply(OrderEvent::PaymentRejected(PaymentRejectedData {
                transaction_id: notice.transaction_id.clone(),
                reference: notice.reference.clone(),
                reason: notice.reason.clone(),
                rejected_at: notice.at,
            })),
        };

        Ok(disposition)
    }

    /// Customer confirms receipt. Allowed once, from shipped or delivered.
    pub fn confirm_delivery(
        &self,
        actor: &Actor,
        rating: u8,
        comment: Option<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;
        if actor.role != ActorRole::Customer {
            return Err(OrderError::Forbidden {
                action: "confirm delivery of",
            });
        }
        self.authorize(actor, "confirm delivery of")?;

        if self.delivery.is_some() {
            return Err(OrderError::AlreadyConfirmed);
        }
        if !self.status.accepts_delivery_confirmation() {
            return Err(OrderError::IllegalTransition {
                from: self.status,
                to: Milestone::DeliveryConfirmed,
            });
        }
        DeliveryRecord::validate_rating(rating)?;

        Ok(vec![OrderEvent::DeliveryConfirmed(DeliveryConfirmedData {
            actor_id: actor.id,
            rating,
            comment,
            confirmed_at: Utc::now(),
        })])
    }

    fn next_payment_reference(&self) -> String {
        let number = self
            .order_number
            .as_ref()
            .map(OrderNumber::as_str)
            .unwrap_or_default();
        format!("PAY-{}-{}", number, self.payment.attempts + 1)
    }
}

// Apply event helpers
impl Order {
    fn record(&mut self, status: Milestone, at: DateTime<Utc>, comment: Option<String>, actor_id: UserId) {
        self.status_history.push(StatusHistoryEntry {
            status,
            timestamp: at,
            comment,
            actor_id,
        });
        self.updated_at = Some(at);
    }

    fn apply_order_placed(&mut self, data: OrderPlacedData) {
        self.id = Some(data.order_id);
        self.order_number = Some(data.order_number);
        self.customer_id = Some(data.customer_id);
        self.line_items = data.line_items;
        self.subtotal = data.subtotal;
        self.taxes = data.taxes;
        self.shipping_cost = data.shipping_cost;
        self.discounts = data.discounts;
        self.total = data.total;
        self.shipping_address = Some(data.shipping_address);
        self.payment = PaymentRecord {
            method: Some(data.payment_method),
            ..PaymentRecord::default()
        };
        self.status = OrderStatus::Pending;
        self.created_at = Some(data.placed_at);
        self.record(
            Milestone::Pending,
            data.placed_at,
            Some("Order placed".to_string()),
            data.customer_id,
        );
    }

    fn apply_status_changed(&mut self, data: StatusChangedData) {
        self.status = data.to;
        self.record(data.to.into(), data.changed_at, data.comment, data.actor_id);
    }

    fn apply_payment_attempt_started(&mut self, data: PaymentAttemptStartedData) {
        self.payment.method = Some(data.method);
        self.payment.status = PaymentStatus::Processing;
        self.payment.reference = Some(data.reference);
        self.payment.transaction_id = None;
        self.payment.rejection_reason = None;
        self.payment.attempts += 1;
        self.updated_at = Some(data.started_at);
    }

    /// Payment and order status change together.
    fn apply_payment_approved(&mut self, data: PaymentApprovedData) {
        self.payment.status = PaymentStatus::Approved;
        self.payment.transaction_id = Some(data.transaction_id);
        self.payment.paid_at = Some(data.paid_at);
        self.payment.rejection_reason = None;
        self.status = OrderStatus::Confirmed;
        self.record(
            Milestone::Confirmed,
            data.paid_at,
            Some(format!("Payment approved ({})", data.reference)),
            Actor::system().id,
        );
    }

    fn apply_payment_rejected(&mut self, data: PaymentRejectedData) {
        self.payment.status = PaymentStatus::Rejected;
        self.payment.transaction_id = Some(data.transaction_id);
        self.payment.rejection_reason = data.reason;
        self.updated_at = Some(data.rejected_at);
    }

    fn apply_delivery_confirmed(&mut self, data: DeliveryConfirmedData) {
        self.delivery = Some(DeliveryRecord {
            confirmed: true,
            confirmed_at: data.confirmed_at,
            customer_comment: data.comment.clone(),
            rating: data.rating,
        });
        self.record(
            Milestone::DeliveryConfirmed,
            data.confirmed_at,
            data.comment,
            data.actor_id,
        );
    }
}
