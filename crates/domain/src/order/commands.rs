//! Order commands.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};

use crate::pricing::PricedCart;

use super::{AddressSnapshot, OrderNumber, PaymentMethod};

/// Command to place a new order from a priced cart.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub customer_id: UserId,
    pub cart: PricedCart,
    pub shipping_address: AddressSnapshot,
    pub payment_method: PaymentMethod,
    pub placed_at: DateTime<Utc>,
}

impl PlaceOrder {
    /// Creates a PlaceOrder command with a generated order number.
    pub fn new(
        order_id: OrderId,
        customer_id: UserId,
        cart: PricedCart,
        shipping_address: AddressSnapshot,
        payment_method: PaymentMethod,
    ) -> Self {
        let placed_at = Utc::now();
        Self {
            order_id,
            order_number: OrderNumber::generate(placed_at),
            customer_id,
            cart,
            shipping_address,
            payment_method,
            placed_at,
        }
    }
}
