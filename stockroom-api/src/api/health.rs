//! Health check endpoint

use std::time::Duration;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tracing::warn;

use crate::AppState;

/// Longest the database probe may take
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

/// GET /health
///
/// `ok` when the database answers `SELECT 1`, `degraded` otherwise.
/// No authentication.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let probe = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&state.db);
    let status = match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
        Ok(Ok(_)) => "ok",
        Ok(Err(e)) => {
            warn!("Health probe failed: {}", e);
            "degraded"
        }
        Err(_) => {
            warn!("Health probe timed out");
            "degraded"
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        module: "stockroom-api".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
