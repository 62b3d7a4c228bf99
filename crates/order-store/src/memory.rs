use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use domain::{Aggregate, Order, Version};
use tokio::sync::RwLock;

use crate::{
    OrderQuery, OrderRepository, Reservation, ReservationLine, ReservationState, Result,
    StockLedger, StockRecord, StoreError, ledger::merge_lines,
};

/// In-memory order repository for testing and database-less runs.
///
/// Provides the same semantics as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Clears all orders.
    pub async fn clear(&self) {
        self.orders.write().await.clear();
    }

    fn page(mut orders: Vec<Order>, query: &OrderQuery) -> Vec<Order> {
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        orders
            .into_iter()
            .skip(query.effective_offset())
            .take(query.effective_limit())
            .collect()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<Version> {
        let order_id = order.id().ok_or(StoreError::Unplaced)?;
        let number = order.order_number().ok_or(StoreError::Unplaced)?;

        let mut store = self.orders.write().await;
        if store.contains_key(&order_id) {
            return Err(StoreError::DuplicateOrder(order_id));
        }
        if store.values().any(|o| o.order_number() == Some(number)) {
            return Err(StoreError::DuplicateOrderNumber(number.to_string()));
        }

        let mut stored = order.clone();
        stored.set_version(Version::first());
        store.insert(order_id, stored);

        Ok(Version::first())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&order_id).cloned())
    }

    async fn save(&self, order: &Order, expected: Version) -> Result<Version> {
        let order_id = order.id().ok_or(StoreError::Unplaced)?;

        let mut store = self.orders.write().await;
        let current = store
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        if current.version() != expected {
            return Err(StoreError::ConcurrencyConflict {
                order_id,
                expected,
                actual: current.version(),
            });
        }

        let next = expected.next();
        let mut stored = order.clone();
        stored.set_version(next);
        *current = stored;

        Ok(next)
    }

    async fn list_for_customer(
        &self,
        customer_id: UserId,
        query: &OrderQuery,
    ) -> Result<Vec<Order>> {
        let store = self.orders.read().await;
        let matching = store
            .values()
            .filter(|o| o.customer_id() == Some(customer_id))
            .filter(|o| query.status.is_none_or(|s| o.status() == s))
            .cloned()
            .collect();
        Ok(Self::page(matching, query))
    }

    async fn list_for_merchant(
        &self,
        merchant_id: UserId,
        query: &OrderQuery,
    ) -> Result<Vec<Order>> {
        let store = self.orders.read().await;
        let matching = store
            .values()
            .filter(|o| o.has_merchant(merchant_id))
            .filter(|o| query.status.is_none_or(|s| o.status() == s))
            .cloned()
            .collect();
        Ok(Self::page(matching, query))
    }
}

#[derive(Default)]
struct LedgerState {
    records: HashMap<ProductId, StockRecord>,
    reservations: HashMap<OrderId, Reservation>,
}

/// In-memory stock ledger.
///
/// One lock guards every record, so a cart reservation is trivially
/// all-or-nothing.
#[derive(Clone, Default)]
pub struct InMemoryStockLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryStockLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger seeded with available quantities.
    pub fn with_stock(stock: impl IntoIterator<Item = (ProductId, i64)>) -> Self {
        let records = stock
            .into_iter()
            .map(|(id, qty)| (id.clone(), StockRecord::new(id, qty)))
            .collect();
        Self {
            state: Arc::new(RwLock::new(LedgerState {
                records,
                reservations: HashMap::new(),
            })),
        }
    }

    /// Returns a reservation by id.
    pub async fn reservation(&self, reservation_id: OrderId) -> Option<Reservation> {
        self.state
            .read()
            .await
            .reservations
            .get(&reservation_id)
            .cloned()
    }

    /// Backdates a reservation, simulating a hold left behind by a crash.
    pub async fn backdate(&self, reservation_id: OrderId, created_at: DateTime<Utc>) {
        if let Some(r) = self
            .state
            .write()
            .await
            .reservations
            .get_mut(&reservation_id)
        {
            r.created_at = created_at;
        }
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn reserve(&self, reservation_id: OrderId, lines: &[ReservationLine]) -> Result<()> {
        let merged = merge_lines(lines)?;
        let mut state = self.state.write().await;

        if state.reservations.contains_key(&reservation_id) {
            return Err(StoreError::DuplicateReservation(reservation_id));
        }

        // Check every line before touching any record
        for (product_id, &quantity) in &merged {
            let available = state
                .records
                .get(product_id)
                .map_or(0, |r| r.available);
            if available < i64::from(quantity) {
                tracing::debug!(%product_id, quantity, available, "reservation rejected");
                return Err(StoreError::InsufficientStock {
                    product_id: product_id.clone(),
                    requested: quantity,
                    available,
                });
            }
        }

        for (product_id, &quantity) in &merged {
            if let Some(record) = state.records.get_mut(product_id) {
                record.available -= i64::from(quantity);
                record.reserved_total += i64::from(quantity);
            }
        }

        state.reservations.insert(
            reservation_id,
            Reservation {
                id: reservation_id,
                lines: lines.to_vec(),
                state: ReservationState::Held,
                created_at: Utc::now(),
            },
        );

        Ok(())
    }

    async fn commit_sale(&self, reservation_id: OrderId) -> Result<bool> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let Some(reservation) = state.reservations.get_mut(&reservation_id) else {
            return Ok(false);
        };
        if reservation.state != ReservationState::Held {
            return Ok(false);
        }

        for (product_id, quantity) in merge_lines(&reservation.lines)? {
            if let Some(record) = state.records.get_mut(&product_id) {
                record.sold_total += i64::from(quantity);
            }
        }
        reservation.state = ReservationState::Committed;

        Ok(true)
    }

    async fn release(&self, reservation_id: OrderId) -> Result<bool> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let Some(reservation) = state.reservations.get_mut(&reservation_id) else {
            return Ok(false);
        };
        let was_committed = match reservation.state {
            ReservationState::Released => return Ok(false),
            ReservationState::Held => false,
            ReservationState::Committed => true,
        };

        for (product_id, quantity) in merge_lines(&reservation.lines)? {
            if let Some(record) = state.records.get_mut(&product_id) {
                record.available += i64::from(quantity);
                if was_committed {
                    record.sold_total -= i64::from(quantity);
                }
            }
        }
        reservation.state = ReservationState::Released;

        Ok(true)
    }

    async fn stale_holds(&self, older_than: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let state = self.state.read().await;
        let mut holds: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.state == ReservationState::Held && r.created_at < older_than)
            .cloned()
            .collect();
        holds.sort_by_key(|r| r.created_at);
        Ok(holds)
    }

    async fn committed_before(&self, older_than: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let state = self.state.read().await;
        let mut committed: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.state == ReservationState::Committed && r.created_at < older_than)
            .cloned()
            .collect();
        committed.sort_by_key(|r| r.created_at);
        Ok(committed)
    }

    async fn available(&self, product_id: &ProductId) -> Result<i64> {
        Ok(self
            .state
            .read()
            .await
            .records
            .get(product_id)
            .map_or(0, |r| r.available))
    }

    async fn record(&self, product_id: &ProductId) -> Result<Option<StockRecord>> {
        Ok(self.state.read().await.records.get(product_id).cloned())
    }

    async fn set_stock(&self, product_id: &ProductId, available: i64) -> Result<()> {
        if available < 0 {
            return Err(StoreError::InvalidStockLevel {
                product_id: product_id.clone(),
                quantity: available,
            });
        }
        let mut state = self.state.write().await;
        state
            .records
            .entry(product_id.clone())
            .or_insert_with(|| StockRecord::new(product_id.clone(), 0))
            .available = available;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Actor, Money};
    use domain::{
        AddressSnapshot, OrderStatus, PaymentMethod, PlaceOrder, PriceableLine, PricingEngine,
    };

    fn sku(id: &str) -> ProductId {
        ProductId::new(id)
    }

    fn placed_order(customer_id: UserId, merchant_id: UserId) -> Order {
        let cart = PricingEngine::default()
            .price(&[PriceableLine {
                product_id: sku("SKU-1"),
                merchant_id,
                name: "Sombrero".to_string(),
                image_url: None,
                list_price: Money::new(45_000),
                discounted_price: None,
                quantity: 1,
            }])
            .unwrap();
        let address = AddressSnapshot {
            recipient_name: "Test".to_string(),
            phone: "3000000000".to_string(),
            street: "Calle 1".to_string(),
            city: "Bogotá".to_string(),
            region: "Cundinamarca".to_string(),
            postal_code: None,
            country: "CO".to_string(),
            notes: None,
        };
        let mut order = Order::default();
        let cmd = PlaceOrder::new(OrderId::new(), customer_id, cart, address, PaymentMethod::Pse);
        order.apply_events(order.place(cmd).unwrap());
        order
    }

    #[tokio::test]
    async fn insert_and_get_order() {
        let repo = InMemoryOrderRepository::new();
        let order = placed_order(UserId::new(), UserId::new());

        let version = repo.insert(&order).await.unwrap();
        assert_eq!(version, Version::first());

        let loaded = repo.get(order.id().unwrap()).await.unwrap().unwrap();
        assert_eq!(loaded.version(), Version::first());
        assert_eq!(loaded.order_number(), order.order_number());
    }

    #[tokio::test]
    async fn duplicate_insert_fails() {
        let repo = InMemoryOrderRepository::new();
        let order = placed_order(UserId::new(), UserId::new());
        repo.insert(&order).await.unwrap();

        let result = repo.insert(&order).await;
        assert!(matches!(result, Err(StoreError::DuplicateOrder(_))));
    }

    #[tokio::test]
    async fn concurrency_conflict_on_stale_version() {
        let repo = InMemoryOrderRepository::new();
        let order = placed_order(UserId::new(), UserId::new());
        repo.insert(&order).await.unwrap();

        let admin = Actor::administrator(UserId::new());
        let mut first = repo.get(order.id().unwrap()).await.unwrap().unwrap();
        let second = first.clone();

        first.apply_events(first.transition(&admin, OrderStatus::Confirmed, None).unwrap());
        let v2 = repo.save(&first, Version::first()).await.unwrap();
        assert_eq!(v2, Version::new(2));

        let result = repo.save(&second, second.version()).await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { expected, actual, .. })
                if expected == Version::first() && actual == Version::new(2)
        ));
    }

    #[tokio::test]
    async fn save_unknown_order_fails() {
        let repo = InMemoryOrderRepository::new();
        let order = placed_order(UserId::new(), UserId::new());
        let result = repo.save(&order, Version::first()).await;
        assert!(matches!(result, Err(StoreError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn list_by_customer_and_merchant() {
        let repo = InMemoryOrderRepository::new();
        let customer = UserId::new();
        let merchant = UserId::new();

        for _ in 0..3 {
            repo.insert(&placed_order(customer, merchant)).await.unwrap();
        }
        repo.insert(&placed_order(UserId::new(), UserId::new()))
            .await
            .unwrap();

        let mine = repo
            .list_for_customer(customer, &OrderQuery::new())
            .await
            .unwrap();
        assert_eq!(mine.len(), 3);

        let sold = repo
            .list_for_merchant(merchant, &OrderQuery::new().limit(2))
            .await
            .unwrap();
        assert_eq!(sold.len(), 2);

        let shipped = repo
            .list_for_customer(customer, &OrderQuery::new().status(OrderStatus::Shipped))
            .await
            .unwrap();
        assert!(shipped.is_empty());
    }

    #[tokio::test]
    async fn reserve_is_all_or_nothing() {
        let ledger = InMemoryStockLedger::with_stock([(sku("A"), 5), (sku("B"), 1)]);
        let lines = vec![
            ReservationLine::new(sku("A"), 3),
            ReservationLine::new(sku("B"), 2),
        ];

        let result = ledger.reserve(OrderId::new(), &lines).await;
        assert!(matches!(
            result,
            Err(StoreError::InsufficientStock { requested: 2, available: 1, .. })
        ));
        assert_eq!(ledger.available(&sku("A")).await.unwrap(), 5);
        assert_eq!(ledger.available(&sku("B")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn overflowing_duplicate_lines_reserve_nothing() {
        let ledger = InMemoryStockLedger::with_stock([(sku("A"), i64::MAX)]);
        let id = OrderId::new();
        let lines = vec![
            ReservationLine::new(sku("A"), u32::MAX),
            ReservationLine::new(sku("A"), 1),
        ];

        let result = ledger.reserve(id, &lines).await;
        assert!(matches!(result, Err(StoreError::QuantityOverflow(_))));
        assert_eq!(ledger.available(&sku("A")).await.unwrap(), i64::MAX);
        assert!(!ledger.release(id).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_lines_are_summed() {
        let ledger = InMemoryStockLedger::with_stock([(sku("A"), 4)]);
        let lines = vec![
            ReservationLine::new(sku("A"), 3),
            ReservationLine::new(sku("A"), 2),
        ];
        let result = ledger.reserve(OrderId::new(), &lines).await;
        assert!(matches!(result, Err(StoreError::InsufficientStock { requested: 5, .. })));
    }

    #[tokio::test]
    async fn unknown_product_has_no_stock() {
        let ledger = InMemoryStockLedger::new();
        assert_eq!(ledger.available(&sku("X")).await.unwrap(), 0);
        let result = ledger
            .reserve(OrderId::new(), &[ReservationLine::new(sku("X"), 1)])
            .await;
        assert!(matches!(result, Err(StoreError::InsufficientStock { available: 0, .. })));
    }

    #[tokio::test]
    async fn reserve_commit_release_lifecycle() {
        let ledger = InMemoryStockLedger::with_stock([(sku("A"), 10)]);
        let id = OrderId::new();
        ledger
            .reserve(id, &[ReservationLine::new(sku("A"), 4)])
            .await
            .unwrap();

        let record = ledger.record(&sku("A")).await.unwrap().unwrap();
        assert_eq!(record.available, 6);
        assert_eq!(record.reserved_total, 4);
        assert_eq!(record.sold_total, 0);

        assert!(ledger.commit_sale(id).await.unwrap());
        assert!(!ledger.commit_sale(id).await.unwrap());
        assert_eq!(ledger.record(&sku("A")).await.unwrap().unwrap().sold_total, 4);

        assert!(ledger.release(id).await.unwrap());
        let record = ledger.record(&sku("A")).await.unwrap().unwrap();
        assert_eq!(record.available, 10);
        assert_eq!(record.sold_total, 0);
        assert_eq!(record.reserved_total, 4);

        // Second release is a no-op, not a double credit.
        assert!(!ledger.release(id).await.unwrap());
        assert_eq!(ledger.available(&sku("A")).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn reservation_id_is_single_use() {
        let ledger = InMemoryStockLedger::with_stock([(sku("A"), 10)]);
        let id = OrderId::new();
        let lines = [ReservationLine::new(sku("A"), 1)];
        ledger.reserve(id, &lines).await.unwrap();

        let result = ledger.reserve(id, &lines).await;
        assert!(matches!(result, Err(StoreError::DuplicateReservation(_))));
        assert_eq!(ledger.available(&sku("A")).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn release_unknown_reservation_is_noop() {
        let ledger = InMemoryStockLedger::new();
        assert!(!ledger.release(OrderId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn stale_holds_lists_only_old_held_reservations() {
        let ledger = InMemoryStockLedger::with_stock([(sku("A"), 10)]);
        let old = OrderId::new();
        let committed = OrderId::new();
        let fresh = OrderId::new();
        for id in [old, committed, fresh] {
            ledger
                .reserve(id, &[ReservationLine::new(sku("A"), 1)])
                .await
                .unwrap();
        }
        ledger.commit_sale(committed).await.unwrap();

        let an_hour_ago = Utc::now() - chrono::Duration::hours(1);
        ledger.backdate(old, an_hour_ago).await;
        ledger.backdate(committed, an_hour_ago).await;

        let cutoff = Utc::now() - chrono::Duration::minutes(15);
        let stale = ledger.stale_holds(cutoff).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, old);

        let committed_list = ledger.committed_before(cutoff).await.unwrap();
        assert_eq!(committed_list.len(), 1);
        assert_eq!(committed_list[0].id, committed);
    }

    #[tokio::test]
    async fn set_stock_rejects_negative() {
        let ledger = InMemoryStockLedger::new();
        ledger.set_stock(&sku("A"), 7).await.unwrap();
        assert_eq!(ledger.available(&sku("A")).await.unwrap(), 7);

        let result = ledger.set_stock(&sku("A"), -1).await;
        assert!(matches!(result, Err(StoreError::InvalidStockLevel { .. })));
    }

    #[tokio::test]
    async fn concurrent_reservations_never_oversell() {
        let ledger = InMemoryStockLedger::with_stock([(sku("LAST"), 1)]);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .reserve(OrderId::new(), &[ReservationLine::new(sku("LAST"), 1)])
                    .await
            }));
        }

        let mut succeeded = 0;
        let mut short = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => succeeded += 1,
                Err(StoreError::InsufficientStock { .. }) => short += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(succeeded, 1);
        assert_eq!(short, 15);
        assert_eq!(ledger.available(&sku("LAST")).await.unwrap(), 0);
    }
}
