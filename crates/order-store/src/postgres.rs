use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use domain::{Aggregate, Order, Version};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OrderQuery, OrderRepository, Reservation, ReservationLine, ReservationState, Result,
    StockLedger, StockRecord, StoreError, ledger::merge_lines,
};

/// Runs the database migrations.
pub async fn run_migrations(pool: &PgPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}

/// PostgreSQL-backed order repository.
///
/// Orders are stored as JSON documents next to the columns used for
/// lookups and the version used for compare-and-swap writes.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    /// Creates a new PostgreSQL order repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let document: serde_json::Value = row.try_get("document")?;
        let mut order: Order = serde_json::from_value(document)?;
        order.set_version(Version::new(row.try_get("version")?));
        Ok(order)
    }

    async fn current_version(&self, order_id: OrderId) -> Result<Option<Version>> {
        let version: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(version.map(Version::new))
    }

    async fn list(
        &self,
        filter: &str,
        owner: UserId,
        query: &OrderQuery,
    ) -> Result<Vec<Order>> {
        let sql = format!(
            r#"
            SELECT document, version
            FROM orders
            WHERE {filter} AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC, order_number DESC
            LIMIT $3 OFFSET $4
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(owner.as_uuid())
            .bind(query.status.map(|s| s.as_str()))
            .bind(query.effective_limit() as i64)
            .bind(query.effective_offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn insert(&self, order: &Order) -> Result<Version> {
        let order_id = order.id().ok_or(StoreError::Unplaced)?;
        let number = order.order_number().ok_or(StoreError::Unplaced)?;
        let customer_id = order.customer_id().ok_or(StoreError::Unplaced)?;
        let merchant_ids: Vec<Uuid> = order.merchant_ids().iter().map(|m| m.as_uuid()).collect();

        let mut stored = order.clone();
        stored.set_version(Version::first());
        let document = serde_json::to_value(&stored)?;
        let created_at = order.created_at().unwrap_or_else(Utc::now);

        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, customer_id, merchant_ids, status, version, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(number.as_str())
        .bind(customer_id.as_uuid())
        .bind(&merchant_ids)
        .bind(order.status().as_str())
        .bind(Version::first().as_i64())
        .bind(&document)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                match db_err.constraint() {
                    Some("orders_pkey") => return StoreError::DuplicateOrder(order_id),
                    Some("unique_order_number") => {
                        return StoreError::DuplicateOrderNumber(number.to_string());
                    }
                    _ => {}
                }
            }
            StoreError::Database(e)
        })?;

        Ok(Version::first())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT document, version FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn save(&self, order: &Order, expected: Version) -> Result<Version> {
        let order_id = order.id().ok_or(StoreError::Unplaced)?;
        let next = expected.next();

        let mut stored = order.clone();
        stored.set_version(next);
        let document = serde_json::to_value(&stored)?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET document = $1, status = $2, version = $3, updated_at = $4
            WHERE id = $5 AND version = $6
            "#,
        )
        .bind(&document)
        .bind(order.status().as_str())
        .bind(next.as_i64())
        .bind(order.updated_at().unwrap_or_else(Utc::now))
        .bind(order_id.as_uuid())
        .bind(expected.as_i64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.current_version(order_id).await? {
                Some(actual) => Err(StoreError::ConcurrencyConflict {
                    order_id,
                    expected,
                    actual,
                }),
                None => Err(StoreError::OrderNotFound(order_id)),
            };
        }

        Ok(next)
    }

    async fn list_for_customer(
        &self,
        customer_id: UserId,
        query: &OrderQuery,
    ) -> Result<Vec<Order>> {
        self.list("customer_id = $1", customer_id, query).await
    }

    async fn list_for_merchant(
        &self,
        merchant_id: UserId,
        query: &OrderQuery,
    ) -> Result<Vec<Order>> {
        self.list("$1 = ANY(merchant_ids)", merchant_id, query).await
    }
}

/// PostgreSQL-backed stock ledger.
///
/// Each reservation runs in one transaction of conditional decrements
/// (`available >= qty`), so a short line rolls back the whole cart.
#[derive(Clone)]
pub struct PostgresStockLedger {
    pool: PgPool,
}

impl PostgresStockLedger {
    /// Creates a new PostgreSQL stock ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: PgRow) -> Result<StockRecord> {
        Ok(StockRecord {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            available: row.try_get("available")?,
            reserved_total: row.try_get("reserved_total")?,
            sold_total: row.try_get("sold_total")?,
        })
    }

    fn row_to_reservation(row: PgRow) -> Result<Reservation> {
        let lines: serde_json::Value = row.try_get("lines")?;
        let state: String = row.try_get("state")?;
        Ok(Reservation {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            lines: serde_json::from_value(lines)?,
            state: state
                .parse()
                .map_err(|e: String| StoreError::Serialization(serde::de::Error::custom(e)))?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    /// Locks a reservation row and returns its lines and state.
    async fn lock_reservation(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        reservation_id: OrderId,
    ) -> Result<Option<Reservation>> {
        let row = sqlx::query(
            "SELECT id, lines, state, created_at FROM stock_reservations WHERE id = $1 FOR UPDATE",
        )
        .bind(reservation_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?;

        row.map(Self::row_to_reservation).transpose()
    }

    async fn set_reservation_state(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        reservation_id: OrderId,
        state: ReservationState,
    ) -> Result<()> {
        sqlx::query("UPDATE stock_reservations SET state = $1, updated_at = now() WHERE id = $2")
            .bind(state.as_str())
            .bind(reservation_id.as_uuid())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StockLedger for PostgresStockLedger {
    async fn reserve(&self, reservation_id: OrderId, lines: &[ReservationLine]) -> Result<()> {
        let merged = merge_lines(lines)?;
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO stock_reservations (id, lines, state, created_at, updated_at)
            VALUES ($1, $2, 'held', now(), now())
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(reservation_id.as_uuid())
        .bind(serde_json::to_value(lines)?)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(StoreError::DuplicateReservation(reservation_id));
        }

        for (product_id, quantity) in &merged {
            let quantity = i64::from(*quantity);
            let updated = sqlx::query(
                r#"
                UPDATE stock_records
                SET available = available - $2,
                    reserved_total = reserved_total + $2,
                    updated_at = now()
                WHERE product_id = $1 AND available >= $2
                "#,
            )
            .bind(product_id.as_str())
            .bind(quantity)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                let available: Option<i64> =
                    sqlx::query_scalar("SELECT available FROM stock_records WHERE product_id = $1")
                        .bind(product_id.as_str())
                        .fetch_optional(&mut *tx)
                        .await?;
                tx.rollback().await?;

                tracing::debug!(%product_id, quantity, "reservation rejected");
                return Err(StoreError::InsufficientStock {
                    product_id: product_id.clone(),
                    requested: merged[product_id],
                    available: available.unwrap_or(0),
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn commit_sale(&self, reservation_id: OrderId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let Some(reservation) = Self::lock_reservation(&mut tx, reservation_id).await? else {
            return Ok(false);
        };
        if reservation.state != ReservationState::Held {
            return Ok(false);
        }

        for (product_id, quantity) in merge_lines(&reservation.lines)? {
            sqlx::query(
                "UPDATE stock_records SET sold_total = sold_total + $2, updated_at = now() WHERE product_id = $1",
            )
            .bind(product_id.as_str())
            .bind(i64::from(quantity))
            .execute(&mut *tx)
            .await?;
        }
        Self::set_reservation_state(&mut tx, reservation_id, ReservationState::Committed).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn release(&self, reservation_id: OrderId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let Some(reservation) = Self::lock_reservation(&mut tx, reservation_id).await? else {
            return Ok(false);
        };
        let sold_delta: i64 = match reservation.state {
            ReservationState::Released => return Ok(false),
            ReservationState::Held => 0,
            ReservationState::Committed => 1,
        };

        for (product_id, quantity) in merge_lines(&reservation.lines)? {
            let quantity = i64::from(quantity);
            sqlx::query(
                r#"
                UPDATE stock_records
                SET available = available + $2,
                    sold_total = sold_total - $3,
                    updated_at = now()
                WHERE product_id = $1
                "#,
            )
            .bind(product_id.as_str())
            .bind(quantity)
            .bind(quantity * sold_delta)
            .execute(&mut *tx)
            .await?;
        }
        Self::set_reservation_state(&mut tx, reservation_id, ReservationState::Released).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn stale_holds(&self, older_than: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, lines, state, created_at
            FROM stock_reservations
            WHERE state = 'held' AND created_at < $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn committed_before(&self, older_than: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, lines, state, created_at
            FROM stock_reservations
            WHERE state = 'committed' AND created_at < $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn available(&self, product_id: &ProductId) -> Result<i64> {
        let available: Option<i64> =
            sqlx::query_scalar("SELECT available FROM stock_records WHERE product_id = $1")
                .bind(product_id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(available.unwrap_or(0))
    }

    async fn record(&self, product_id: &ProductId) -> Result<Option<StockRecord>> {
        let row = sqlx::query(
            r#"
            SELECT product_id, available, reserved_total, sold_total
            FROM stock_records
            WHERE product_id = $1
            "#,
        )
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn set_stock(&self, product_id: &ProductId, available: i64) -> Result<()> {
        if available < 0 {
            return Err(StoreError::InvalidStockLevel {
                product_id: product_id.clone(),
                quantity: available,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO stock_records (product_id, available, reserved_total, sold_total, updated_at)
            VALUES ($1, $2, 0, 0, now())
            ON CONFLICT (product_id) DO UPDATE SET
                available = EXCLUDED.available,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(product_id.as_str())
        .bind(available)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
