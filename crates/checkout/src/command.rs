//! Read-validate-write helper for order commands.

use common::OrderId;
use domain::{Aggregate, Order, OrderError, OrderEvent, Version};
use order_store::{OrderRepository, OrderRepositoryExt};

use crate::error::{CheckoutError, Result};

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult {
    /// The order after applying the new events.
    pub order: Order,

    /// The events that were produced and persisted.
    pub events: Vec<OrderEvent>,

    /// The stored version after the command.
    pub new_version: Version,
}

/// Loads an order, runs a command against it and saves the outcome.
///
/// The save is a compare-and-swap on the version that was read, so two
/// commands racing on one order never both land: the loser fails with
/// `ConcurrencyConflict` and the stored order is left as the winner wrote it.
#[derive(Debug, Clone)]
pub struct OrderCommandHandler<R> {
    repository: R,
}

impl<R: OrderRepository> OrderCommandHandler<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Loads an order, failing with `OrderNotFound` if it is absent.
    pub async fn load(&self, order_id: OrderId) -> Result<Order> {
        Ok(self.repository.get_required(order_id).await?)
    }

    /// Executes a command and persists the resulting events.
    ///
    /// The command function receives the current order and returns the
    /// events to apply. A command that returns no events writes nothing.
    pub async fn execute<F>(&self, order_id: OrderId, command_fn: F) -> Result<CommandResult>
    where
        F: FnOnce(&Order) -> std::result::Result<Vec<OrderEvent>, OrderError>,
    {
        let mut order = self.load(order_id).await?;
        let current_version = order.version();

        let events = command_fn(&order).map_err(CheckoutError::Order)?;
        if events.is_empty() {
            return Ok(CommandResult {
                order,
                events,
                new_version: current_version,
            });
        }

        order.apply_events(events.iter().cloned());
        let new_version = self.repository.save(&order, current_version).await?;
        order.set_version(new_version);

        tracing::debug!(
            %order_id,
            version = %new_version,
            event_count = events.len(),
            "Order command persisted"
        );

        Ok(CommandResult {
            order,
            events,
            new_version,
        })
    }
}
