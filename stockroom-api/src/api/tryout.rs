//! Demo tenant endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use stockroom_common::db::TryOutStatus;
use stockroom_common::{uuid_utils, Error};
use tracing::info;
use uuid::Uuid;

use super::context::Identity;
use crate::db::tryout_jobs;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub uuid: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub uuid: Uuid,
    pub status: TryOutStatus,
}

/// GET /tryOut/status?uuid=
///
/// Polled by the frontend while the worker provisions the namespace.
pub async fn status(State(state): State<AppState>, Query(query): Query<StatusQuery>) -> ApiResult<Json<StatusResponse>> {
    let raw = query
        .uuid
        .ok_or_else(|| Error::InvalidInput("uuid is required".to_string()))?;
    let tryout_uuid =
        uuid_utils::parse(&raw).map_err(|_| Error::InvalidInput(format!("{:?} is not a UUID", raw)))?;

    let mut conn = state.db.acquire().await.map_err(Error::from)?;
    let job = tryout_jobs::find_by_uuid(&mut conn, tryout_uuid)
        .await?
        .ok_or_else(|| Error::NotFound(format!("try-out {}", tryout_uuid)))?;

    Ok(Json(StatusResponse {
        uuid: job.tryout_uuid,
        status: job.status,
    }))
}

/// DELETE /tryOut/destroyEnv
pub async fn destroy_env(State(state): State<AppState>, identity: Identity) -> ApiResult<StatusCode> {
    state.lifecycle.destroy_try_out(identity.organization_id()).await?;
    info!(user_id = identity.user_id(), org_id = identity.organization_id(), "Try-out destroyed on request");
    Ok(StatusCode::NO_CONTENT)
}
