//! Integration tests for the Order aggregate.
//!
//! These tests drive the public command API through full lifecycles and
//! check the transition table against every actor role.

use chrono::Utc;
use common::{Actor, ActorRole, Money, OrderId, ProductId, UserId};
use domain::{
    AddressSnapshot, Aggregate, Classify, ErrorKind, Milestone, NoticeDisposition, Order,
    OrderError, OrderStatus, PaymentMethod, PaymentNotice, PaymentStatus, PlaceOrder,
    PriceableLine, PricingEngine, permitted_roles,
};

struct Parties {
    customer: Actor,
    merchant: Actor,
    admin: Actor,
}

fn parties() -> Parties {
    Parties {
        customer: Actor::customer(UserId::new()),
        merchant: Actor::merchant(UserId::new()),
        admin: Actor::administrator(UserId::new()),
    }
}

fn place(parties: &Parties) -> Order {
    let cart = PricingEngine::default()
        .price(&[PriceableLine {
            product_id: ProductId::new("SKU-001"),
            merchant_id: parties.merchant.id,
            name: "Hamaca".to_string(),
            image_url: Some("https://cdn.example/hamaca.jpg".to_string()),
            list_price: Money::new(80_000),
            discounted_price: Some(Money::new(72_000)),
            quantity: 1,
        }])
        .unwrap();

    let mut order = Order::default();
    let cmd = PlaceOrder::new(
        OrderId::new(),
        parties.customer.id,
        cart,
        AddressSnapshot {
            recipient_name: "Luis Pérez".to_string(),
            phone: "3109876543".to_string(),
            street: "Carrera 7 # 12-40".to_string(),
            city: "Cali".to_string(),
            region: "Valle del Cauca".to_string(),
            postal_code: Some("760001".to_string()),
            country: "CO".to_string(),
            notes: None,
        },
        PaymentMethod::Nequi,
    );
    order.apply_events(order.place(cmd).unwrap());
    order
}

/// Drives the order to `target` along the only legal path, as administrator.
fn drive_to(order: &mut Order, admin: &Actor, target: OrderStatus) {
    let path: &[OrderStatus] = match target {
        OrderStatus::Pending => &[],
        OrderStatus::Confirmed => &[OrderStatus::Confirmed],
        OrderStatus::Processing => &[OrderStatus::Confirmed, OrderStatus::Processing],
        OrderStatus::Shipped => &[
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
        ],
        OrderStatus::Delivered => &[
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ],
        OrderStatus::Cancelled => &[OrderStatus::Cancelled],
    };
    for to in path {
        order.apply_events(order.transition(admin, *to, None).unwrap());
    }
}

mod order_lifecycle {
    use super::*;

    #[test]
    fn paid_order_is_delivered_and_confirmed_by_customer() {
        let p = parties();
        let mut order = place(&p);
        assert_eq!(order.subtotal(), Money::new(72_000));
        assert_eq!(order.discounts(), Money::new(8_000));
        assert_eq!(order.shipping_cost(), Money::new(15_000));

        order.apply_events(order.begin_payment(&p.customer, PaymentMethod::Nequi).unwrap());
        let notice = PaymentNotice {
            reference: order.payment().reference.clone().unwrap(),
            transaction_id: "NEQ-123".to_string(),
            approved: true,
            reason: None,
            at: Utc::now(),
        };
        let NoticeDisposition::Apply(event) = order.resolve_payment(&notice).unwrap() else {
            panic!("approval should apply");
        };
        order.apply(event);
        assert_eq!(order.status(), OrderStatus::Confirmed);

        for to in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
            order.apply_events(order.transition(&p.merchant, to, None).unwrap());
        }
        order.apply_events(order.confirm_delivery(&p.customer, 4, None).unwrap());

        let milestones: Vec<Milestone> = order.status_history().iter().map(|h| h.status).collect();
        assert_eq!(
            milestones,
            vec![
                Milestone::Pending,
                Milestone::Confirmed,
                Milestone::Processing,
                Milestone::Shipped,
                Milestone::Delivered,
                Milestone::DeliveryConfirmed,
            ]
        );
        assert_eq!(order.status(), OrderStatus::Delivered);
        assert_eq!(order.delivery().unwrap().rating, 4);
    }

    #[test]
    fn history_timestamps_never_decrease() {
        let p = parties();
        let mut order = place(&p);
        drive_to(&mut order, &p.admin, OrderStatus::Delivered);

        let stamps: Vec<_> = order.status_history().iter().map(|h| h.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }
}

mod transition_table {
    use super::*;

    fn actor_for(p: &Parties, role: ActorRole) -> Actor {
        match role {
            ActorRole::Customer => p.customer,
            ActorRole::Merchant => p.merchant,
            ActorRole::Administrator => p.admin,
            ActorRole::System => Actor::system(),
        }
    }

    #[test]
    fn every_pair_follows_the_table() {
        let p = parties();
        let roles = [
            ActorRole::Customer,
            ActorRole::Merchant,
            ActorRole::Administrator,
            ActorRole::System,
        ];

        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                for role in roles {
                    let mut order = place(&p);
                    drive_to(&mut order, &p.admin, from);
                    let before = order.status_history().len();

                    let result = order.transition(&actor_for(&p, role), to, None);
                    match permitted_roles(from, to) {
                        None => assert!(
                            matches!(result, Err(OrderError::IllegalTransition { .. })),
                            "{from} -> {to} as {role:?} should be illegal"
                        ),
                        Some(allowed) if allowed.contains(&role) => {
                            order.apply_events(result.unwrap());
                            assert_eq!(order.status(), to);
                            assert_eq!(order.status_history().len(), before + 1);
                        }
                        Some(_) => {
                            let err = result.unwrap_err();
                            assert_eq!(err.kind(), ErrorKind::Forbidden, "{from} -> {to} as {role:?}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn rejected_transition_leaves_order_untouched() {
        let p = parties();
        let mut order = place(&p);
        drive_to(&mut order, &p.admin, OrderStatus::Shipped);

        let result = order.transition(&p.admin, OrderStatus::Cancelled, None);
        assert!(matches!(
            result,
            Err(OrderError::IllegalTransition {
                from: OrderStatus::Shipped,
                to: Milestone::Cancelled
            })
        ));
        assert_eq!(order.status(), OrderStatus::Shipped);
        assert_eq!(order.status_history().len(), 4);
    }
}

mod payments {
    use super::*;

    #[test]
    fn cancelled_order_ignores_late_approval() {
        let p = parties();
        let mut order = place(&p);
        order.apply_events(order.begin_payment(&p.customer, PaymentMethod::Card).unwrap());
        let reference = order.payment().reference.clone().unwrap();

        let rejection = PaymentNotice {
            reference: reference.clone(),
            transaction_id: "TX-A".to_string(),
            approved: false,
            reason: Some("card_declined".to_string()),
            at: Utc::now(),
        };
        if let NoticeDisposition::Apply(event) = order.resolve_payment(&rejection).unwrap() {
            order.apply(event);
        }
        drive_to(&mut order, &p.admin, OrderStatus::Cancelled);

        let late = PaymentNotice {
            reference,
            transaction_id: "TX-B".to_string(),
            approved: true,
            reason: None,
            at: Utc::now(),
        };
        assert!(matches!(
            order.resolve_payment(&late).unwrap(),
            NoticeDisposition::Ignored(_)
        ));
        assert_eq!(order.payment().status, PaymentStatus::Rejected);
        assert_eq!(order.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn approval_overrides_earlier_rejection_while_pending() {
        let p = parties();
        let mut order = place(&p);
        order.apply_events(order.begin_payment(&p.customer, PaymentMethod::Pse).unwrap());
        let reference = order.payment().reference.clone().unwrap();

        for (tx, approved) in [("TX-1", false), ("TX-2", true)] {
            let notice = PaymentNotice {
                reference: reference.clone(),
                transaction_id: tx.to_string(),
                approved,
                reason: None,
                at: Utc::now(),
            };
            if let NoticeDisposition::Apply(event) = order.resolve_payment(&notice).unwrap() {
                order.apply(event);
            }
        }

        assert_eq!(order.payment().status, PaymentStatus::Approved);
        assert_eq!(order.payment().transaction_id.as_deref(), Some("TX-2"));
        assert_eq!(order.status(), OrderStatus::Confirmed);
    }

    #[test]
    fn payment_on_cancelled_order_is_refused() {
        let p = parties();
        let mut order = place(&p);
        drive_to(&mut order, &p.admin, OrderStatus::Cancelled);

        let err = order.begin_payment(&p.customer, PaymentMethod::Card).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.code(), "ORDER_NOT_PAYABLE");
    }
}
