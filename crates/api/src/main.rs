//! API server entry point.

use api::config::{Config, LogFormat};
use api::routes::ops::OpsState;
use api::seed::Seed;
use checkout::{InMemoryAddressBook, InMemoryCatalog};
use order_store::{
    InMemoryOrderRepository, InMemoryStockLedger, OrderRepository, PostgresOrderRepository,
    PostgresStockLedger, StockLedger,
};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve<R, L>(config: Config, repository: R, ledger: L, ops: OpsState)
where
    R: OrderRepository + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    if config.webhook_secret.is_none() {
        tracing::warn!("PAYMENT_WEBHOOK_SECRET not set, payment webhooks will be refused");
    }

    let catalog = InMemoryCatalog::new();
    let addresses = InMemoryAddressBook::new();
    match &config.seed_file {
        Some(path) => {
            let seed = Seed::load(path).await.expect("failed to load seed file");
            seed.apply(&catalog, &addresses, &ledger)
                .await
                .expect("failed to apply seed file");
        }
        None => tracing::warn!("SEED_FILE not set, starting with an empty catalog"),
    }

    let collaborators = api::local_collaborators(catalog, addresses);
    let state = api::create_state(repository, ledger, collaborators, &config);

    // First sweep runs immediately and settles anything a crash left held
    let sweeper = api::spawn_reservation_sweeper(state.clone(), config.reservation_ttl);

    let app = api::create_app(state, ops);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    sweeper.abort();
    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    // 1. Configuration and tracing
    let config = Config::from_env().expect("invalid configuration");
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Storage, then serve
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&url)
                .await
                .expect("failed to connect to Postgres");
            order_store::run_migrations(&pool)
                .await
                .expect("failed to run migrations");
            tracing::info!("using Postgres storage");

            let ops = OpsState {
                metrics: metrics_handle,
                storage: "postgres",
            };
            serve(
                config,
                PostgresOrderRepository::new(pool.clone()),
                PostgresStockLedger::new(pool),
                ops,
            )
            .await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            let ops = OpsState {
                metrics: metrics_handle,
                storage: "memory",
            };
            serve(
                config,
                InMemoryOrderRepository::new(),
                InMemoryStockLedger::new(),
                ops,
            )
            .await;
        }
    }
}
