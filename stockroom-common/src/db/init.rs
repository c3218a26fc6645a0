//! Database initialization
//!
//! Opens the shared Postgres pool. Every connection handed back to the pool
//! has its `search_path` reset, so a tenant scope never leaks into the next
//! borrower.

use crate::config::AppConfig;
use crate::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// Pool sizing and deadlines
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl From<&AppConfig> for PoolSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            acquire_timeout: config.db_acquire_timeout,
        }
    }
}

fn pool_options(settings: &PoolSettings) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
        .after_release(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("RESET search_path").execute(&mut *conn).await?;
                Ok::<_, sqlx::Error>(true)
            })
        })
}

/// Connect the shared pool
pub async fn init_database(database_url: &str, settings: &PoolSettings) -> Result<PgPool> {
    let pool = pool_options(settings).connect(database_url).await?;

    info!(
        "Connected to database (max_connections={}, acquire_timeout={:?})",
        settings.max_connections, settings.acquire_timeout
    );

    Ok(pool)
}

/// Build the pool without opening a connection yet
///
/// Used by router tests that never reach the database.
pub fn init_database_lazy(database_url: &str, settings: &PoolSettings) -> Result<PgPool> {
    Ok(pool_options(settings).connect_lazy(database_url)?)
}
