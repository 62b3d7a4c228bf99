pub mod error;
pub mod ledger;
pub mod query;
pub mod repository;

mod memory;
mod postgres;

pub use error::{Result, StoreError};
pub use ledger::{Reservation, ReservationLine, ReservationState, StockLedger, StockRecord};
pub use memory::{InMemoryOrderRepository, InMemoryStockLedger};
pub use postgres::{PostgresOrderRepository, PostgresStockLedger, run_migrations};
pub use query::{DEFAULT_LIMIT, MAX_LIMIT, OrderQuery};
pub use repository::{OrderRepository, OrderRepositoryExt};
