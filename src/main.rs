mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use config::AppConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wagerbook_api::{create_routes, AppState};
use wagerbook_db::{DatabaseConnection, PgStore};
use wagerbook_services::{
    BettingService, LoggingNotifier, MetricsCollector, OutboxWorker, SettlementEngine,
    SystemClock, WalletService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wagerbook_rs=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Wagerbook wallet ledger and settlement engine");

    // Load configuration
    let app_config = AppConfig::new()?;
    info!("Configuration loaded");
    info!("Database: {}", app_config.database_url());
    info!("Server will bind to: {}", app_config.server_addr());

    // Database pool and schema
    let connection = DatabaseConnection::new(
        app_config.database_url(),
        app_config.database.max_connections,
    )
    .await?;
    connection.run_migrations().await?;
    info!("Migrations applied");

    let store = Arc::new(PgStore::new(connection.pool().clone()));
    let metrics = Arc::new(MetricsCollector::new());

    // Services share the store; each store call is one atomic boundary.
    let wallets = Arc::new(WalletService::new(store.clone(), SystemClock));
    let betting = Arc::new(BettingService::new(
        store.clone(),
        SystemClock,
        app_config.betting.min_stake,
    ));
    let settlement = Arc::new(SettlementEngine::new(
        store.clone(),
        SystemClock,
        metrics.clone(),
    ));

    // Outbox worker: drains durable notification events in the background.
    let worker = OutboxWorker::new(store.clone(), LoggingNotifier, metrics.clone())
        .with_poll_interval(Duration::from_secs(app_config.outbox.poll_interval_seconds));
    let worker_handle = tokio::spawn(async move {
        worker.run().await;
    });
    metrics.start_periodic_summary();

    let state = AppState {
        wallets,
        betting,
        settlement,
        metrics,
    };
    let app = create_routes()
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(app_config.server_addr()).await?;
    info!("Listening on {}", app_config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    worker_handle.abort();
    Ok(())
}
