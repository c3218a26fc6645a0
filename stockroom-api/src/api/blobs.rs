//! Blob download endpoint for the filesystem blob store

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use stockroom_common::Error;
use tracing::debug;

use crate::error::ApiResult;
use crate::services::blob_store::{validate_key, PUBLIC_PREFIX};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SignatureQuery {
    pub expires: Option<i64>,
    pub signature: Option<String>,
}

/// GET /blobs/*key
///
/// Keys under the public prefix are served to anyone; others need a valid,
/// unexpired `expires` + `signature` pair.
pub async fn download(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<SignatureQuery>,
) -> ApiResult<Response> {
    validate_key(&key)?;
    let blobs = state.labels.blobs();

    if !key.starts_with(PUBLIC_PREFIX) {
        let authorized = match (query.expires, query.signature.as_deref()) {
            (Some(expires), Some(signature)) => blobs.verify(&key, expires, signature, state.clock.now()),
            _ => false,
        };
        if !authorized {
            debug!(key = %key, "Blob request without a valid signature");
            return Err(Error::Forbidden("invalid or expired blob signature".to_string()).into());
        }
    }

    let blob = blobs
        .get(&key)
        .await?
        .ok_or_else(|| Error::NotFound(format!("blob {}", key)))?;

    Ok((
        [
            (header::CONTENT_TYPE, blob.content_type),
            (header::CACHE_CONTROL, "private, max-age=300".to_string()),
        ],
        blob.bytes,
    )
        .into_response())
}
