use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use railseat_api::{app, state::{AppState, AuthConfig}};
use railseat_core::MemoryStore;
use railseat_store::app_config::{Config, StorageBackend};
use railseat_store::{DbClient, PostgresStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "railseat_api=debug,railseat_core=debug,railseat_store=debug,tower_http=debug,axum::rejection=trace"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting railseat API on port {}", config.server.port);

    let auth = AuthConfig {
        secret: config.auth.jwt_secret.clone(),
    };
    let lock_timeout = config.reservation.lock_timeout();

    let app_state = match config.storage.backend {
        StorageBackend::Postgres => {
            let url = config
                .database
                .url
                .as_deref()
                .context("database.url is required for the postgres backend")?;

            let db = DbClient::new(url, &config.database)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;

            AppState::from_store(Arc::new(PostgresStore::new(db.pool)), lock_timeout, auth)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, bookings are lost on restart");
            let store = MemoryStore::new();
            for seed in &config.storage.seed_trains {
                store
                    .provision_train(&seed.train_number, &seed.source, &seed.destination, seed.total_seats)
                    .await
                    .with_context(|| format!("Failed to seed train {}", seed.train_number))?;
            }

            AppState::from_store(Arc::new(store), lock_timeout, auth)
        }
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Shutdown signal received");
    }
}
