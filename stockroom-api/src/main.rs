//! stockroom-api - multi-tenant inventory HTTP server
//!
//! Applies pending root migrations, then serves the API and runs the
//! try-out worker until interrupted.

use std::net::SocketAddr;

use anyhow::Result;
use stockroom_api::services::worker::{self, WorkerSchedule};
use stockroom_api::{blob_store, build_router, identity_provider, AppState};
use stockroom_common::config::AppConfig;
use stockroom_common::db::{init_database, PoolSettings, RootMigrator};
use stockroom_common::time::system_clock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!(
        "Starting Stockroom API (stockroom-api) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let config = AppConfig::from_env()?;
    info!(stage = ?config.stage, port = config.port, dry_run = config.dry_run, "Configuration loaded");
    if config.google.is_none() {
        warn!("Google credentials not configured; sign-in is disabled");
    }

    let pool = match init_database(&config.database_url, &PoolSettings::from(&config)).await {
        Ok(pool) => {
            info!("✓ Connected to database");
            pool
        }
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            return Err(e.into());
        }
    };

    let applied = RootMigrator::new(config.migration_path.clone(), config.dry_run)
        .run(&pool)
        .await?;
    if !applied.is_empty() {
        info!("✓ Applied {} root migration(s)", applied.len());
    }

    let identity = identity_provider(&config)?;
    let blobs = blob_store(&config);
    let port = config.port;
    let state = AppState::new(pool.clone(), config, system_clock(), identity, blobs);

    let shutdown = CancellationToken::new();
    let worker_handle = worker::spawn(state.lifecycle.clone(), WorkerSchedule::default(), shutdown.clone());

    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("stockroom-api listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = worker_handle.await {
        error!("Try-out worker ended abnormally: {}", e);
    }
    pool.close().await;
    info!("stockroom-api stopped");

    Ok(())
}
