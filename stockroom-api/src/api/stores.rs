//! Store endpoints
//!
//! Stores are the only tenant resource not scoped by `X-Store-ID`.

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    Json,
};
use stockroom_common::pagination::{Page, PageQuery};

use super::context::TenantContext;
use crate::db::stores;
use crate::error::ApiResult;
use crate::models::{Store, StorePayload};
use crate::validation::ValidJson;

/// GET /stores
pub async fn list(tenant: TenantContext, Query(query): Query<PageQuery>) -> ApiResult<Json<Vec<Store>>> {
    let mut conn = tenant.conn().await;
    Ok(Json(stores::list(&mut conn, Page::from(query)).await?))
}

/// POST /stores
pub async fn create(
    tenant: TenantContext,
    ValidJson(payload): ValidJson<StorePayload>,
) -> ApiResult<(StatusCode, Json<Store>)> {
    let mut conn = tenant.conn().await;
    let store = stores::create(&mut conn, payload.name.trim(), tenant.user_id()).await?;
    Ok((StatusCode::CREATED, Json(store)))
}

/// GET /stores/:id
pub async fn get(tenant: TenantContext, Path(id): Path<i64>) -> ApiResult<Json<Store>> {
    let mut conn = tenant.conn().await;
    Ok(Json(stores::get(&mut conn, id).await?))
}

/// PUT /stores/:id
pub async fn update(
    tenant: TenantContext,
    Path(id): Path<i64>,
    ValidJson(payload): ValidJson<StorePayload>,
) -> ApiResult<Json<Store>> {
    let mut conn = tenant.conn().await;
    Ok(Json(stores::update(&mut conn, id, payload.name.trim()).await?))
}

/// DELETE /stores/:id
pub async fn delete(tenant: TenantContext, Path(id): Path<i64>) -> ApiResult<StatusCode> {
    let mut conn = tenant.conn().await;
    stores::delete(&mut conn, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
