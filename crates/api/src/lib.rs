//! HTTP API server for the marketplace order core.
//!
//! Exposes checkout, the order state machine, order reads and payments as
//! REST endpoints, with structured logging (tracing) and Prometheus metrics.

pub mod actor;
pub mod config;
pub mod error;
pub mod routes;
pub mod seed;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::routing::{get, post};
use checkout::{
    Collaborators, InMemoryAddressBook, InMemoryCartStore, InMemoryCatalog,
    InMemoryMerchantStats, Notification, NotificationDispatcher, OrderCreationService,
    OrderStateService, ServiceError,
};
use domain::PricingEngine;
use order_store::{OrderRepository, StockLedger};
use payments::PaymentOrchestrator;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::AppState;
use routes::ops::OpsState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<R, L>(state: Arc<AppState<R, L>>, ops: OpsState) -> Router
where
    R: OrderRepository + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let ops_router = Router::new()
        .route("/health", get(routes::ops::health))
        .route("/metrics", get(routes::ops::metrics))
        .with_state(ops);

    Router::new()
        .route(
            "/orders",
            post(routes::orders::create::<R, L>).get(routes::orders::list::<R, L>),
        )
        .route("/orders/{id}", get(routes::orders::get::<R, L>))
        .route(
            "/orders/{id}/status",
            post(routes::orders::transition::<R, L>),
        )
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<R, L>))
        .route(
            "/orders/{id}/delivery-confirmation",
            post(routes::orders::confirm_delivery::<R, L>),
        )
        .route(
            "/orders/{id}/payment",
            post(routes::payments::process::<R, L>),
        )
        .route(
            "/merchant/orders",
            get(routes::orders::list_for_merchant::<R, L>),
        )
        .route(
            "/payments/webhook",
            post(routes::payments::webhook::<R, L>),
        )
        .with_state(state)
        .merge(ops_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the order services over the given stores.
pub fn create_state<R, L>(
    repository: R,
    ledger: L,
    collaborators: Collaborators,
    config: &Config,
) -> Arc<AppState<R, L>>
where
    R: OrderRepository + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let pricing = PricingEngine::new(config.pricing);

    let payments = PaymentOrchestrator::with_simulated_providers(
        repository.clone(),
        collaborators.notifier.clone(),
        config.payment_timeout,
        config.simulation,
    );

    Arc::new(AppState {
        creation: OrderCreationService::new(
            repository.clone(),
            ledger.clone(),
            pricing,
            collaborators.clone(),
        ),
        states: OrderStateService::new(repository, ledger, pricing, collaborators),
        payments,
        webhook_secret: config.webhook_secret.clone(),
    })
}

/// Collaborators used when no external catalog, address book or cart
/// service is wired in. Notifications go to the log.
pub fn local_collaborators(
    catalog: InMemoryCatalog,
    addresses: InMemoryAddressBook,
) -> Collaborators {
    Collaborators::new(
        Arc::new(catalog),
        Arc::new(addresses),
        Arc::new(InMemoryCartStore::new()),
        Arc::new(InMemoryMerchantStats::new()),
        Arc::new(LogNotificationDispatcher),
    )
}

/// Writes each notification as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationDispatcher;

#[async_trait]
impl NotificationDispatcher for LogNotificationDispatcher {
    async fn notify(&self, notification: Notification) -> Result<(), ServiceError> {
        tracing::info!(
            recipient_id = %notification.recipient_id,
            kind = notification.kind.as_str(),
            payload = %notification.payload,
            "Notification"
        );
        Ok(())
    }
}

/// Settles orphaned stock holds now and then every `ttl`.
///
/// A hold counts as orphaned once it is older than `ttl`.
pub fn spawn_reservation_sweeper<R, L>(state: Arc<AppState<R, L>>, ttl: Duration) -> JoinHandle<()>
where
    R: OrderRepository + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let age = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ttl.max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            let Some(cutoff) = chrono::Utc::now().checked_sub_signed(age) else {
                continue;
            };
            match state.creation.recover_stale_reservations(cutoff).await {
                Ok(report) => {
                    tracing::debug!(
                        committed = report.committed,
                        released = report.released,
                        restocked = report.restocked,
                        "Reservation sweep finished"
                    );
                }
                Err(e) => tracing::error!(error = %e, "Reservation sweep failed"),
            }
        }
    })
}
