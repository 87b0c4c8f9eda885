//! Campus Share Engine
//!
//! HTTP service for the university resource-sharing core.
//!
//! # Architecture
//!
//! - **Catalog**: filtered, paginated resource listings
//! - **Engagement Ledger**: ratings, forum votes and counters
//! - **Recommendation Engine**: similar and recommended resources
//! - **API Server**: REST endpoints for frontend consumption
//!
//! # Graceful Shutdown
//!
//! SIGTERM and SIGINT stop the listener, let in-flight requests complete
//! and close the database pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::{error, info};

use campus_share::api::{self, AppState};
use campus_share::config::{Config, LogConfig, StoreBackend};
use campus_share::database::{self, Database};
use campus_share::observability;
use campus_share::resources::BaseUrlLocator;
use campus_share::store::{InMemoryStore, PgStore};

/// Start-up connection attempts before giving up
const DB_CONNECT_ATTEMPTS: u32 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log format must be known before the config summary is logged
    dotenvy::dotenv().ok();
    observability::init_tracing(LogConfig::from_env().format);

    info!("🚀 Campus Share Engine v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!("✅ Configuration loaded and validated");

    observability::init_metrics()?;

    let locator = Arc::new(BaseUrlLocator::new(config.storage.public_base_url.clone()));

    let mut db = None;
    let state = match config.store_backend {
        StoreBackend::Postgres => {
            let database = database::with_retry(
                || Database::new(&config.database),
                DB_CONNECT_ATTEMPTS,
                Duration::from_millis(500),
            )
            .await?;
            info!("✅ Database connection pool established");

            info!("📦 Running database migrations...");
            database::run_migrations(database.pool()).await?;
            info!("✅ Database migrations applied");

            let store = Arc::new(PgStore::new(database.pool().clone()));
            db = Some(database);
            AppState::new(
                store,
                locator,
                config.catalog,
                config.recommendation,
                config.storage.clone(),
            )
        }
        StoreBackend::Memory => {
            info!("🧪 Using in-memory store; data is lost on exit");
            AppState::new(
                Arc::new(InMemoryStore::new()),
                locator,
                config.catalog,
                config.recommendation,
                config.storage.clone(),
            )
        }
    };

    info!(
        "  🔗 Health: http://{}:{}/health",
        config.api.host, config.api.port
    );

    let served = api::start_server(Arc::new(state), &config.api, shutdown_signal()).await;
    if let Err(e) = &served {
        error!("API server error: {:?}", e);
    }

    info!("🛑 Shutting down...");
    if let Some(db) = db {
        db.close().await;
    }

    info!("👋 Campus Share Engine stopped");
    served
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("📴 Shutdown signal received");
}
