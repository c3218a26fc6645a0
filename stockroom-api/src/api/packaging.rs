//! Packaging endpoints
//!
//! Create and update go through the label engine so the EAN-8 and label
//! artifacts stay bound to the row.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use stockroom_common::pagination::{calculate_page, Page};

use super::context::{StoreScope, TenantContext};
use crate::db::packagings;
use crate::error::ApiResult;
use crate::models::{CreatePackagingPayload, ItemPackaging, SignedUrl, UpdatePackagingPayload};
use crate::validation::ValidJson;
use crate::AppState;

/// `?item_id=&offset=&limit=`
#[derive(Debug, Default, Deserialize)]
pub struct PackagingQuery {
    pub item_id: Option<i64>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl PackagingQuery {
    fn page(&self) -> Page {
        calculate_page(self.offset, self.limit)
    }
}

/// GET /items/packaging
pub async fn list(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Query(query): Query<PackagingQuery>,
) -> ApiResult<Json<Vec<ItemPackaging>>> {
    let mut conn = tenant.conn().await;
    Ok(Json(packagings::list(&mut conn, store_id, query.item_id, query.page()).await?))
}

/// POST /items/packaging
pub async fn create(
    State(state): State<AppState>,
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    ValidJson(payload): ValidJson<CreatePackagingPayload>,
) -> ApiResult<(StatusCode, Json<ItemPackaging>)> {
    let mut conn = tenant.conn().await;
    let packaging = state
        .labels
        .create_packaging(&mut conn, tenant.namespace_id(), store_id, tenant.user_id(), &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(packaging)))
}

/// GET /items/packaging/:id
pub async fn get(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
) -> ApiResult<Json<ItemPackaging>> {
    let mut conn = tenant.conn().await;
    Ok(Json(packagings::get(&mut conn, store_id, id).await?))
}

/// PUT /items/packaging/:id
pub async fn update(
    State(state): State<AppState>,
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
    ValidJson(payload): ValidJson<UpdatePackagingPayload>,
) -> ApiResult<Json<ItemPackaging>> {
    let mut conn = tenant.conn().await;
    let packaging = state
        .labels
        .update_packaging(&mut conn, tenant.namespace_id(), store_id, id, &payload)
        .await?;
    Ok(Json(packaging))
}

/// DELETE /items/packaging/:id
pub async fn delete(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = tenant.conn().await;
    packagings::delete(&mut conn, store_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /items/packaging/:id/label
pub async fn label_preview(
    State(state): State<AppState>,
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
) -> ApiResult<Json<SignedUrl>> {
    let mut conn = tenant.conn().await;
    Ok(Json(state.labels.preview_url(&mut conn, store_id, id).await?))
}

/// POST /items/packaging/:id/label
///
/// Re-renders the label; the EAN-8 does not change.
pub async fn regenerate_label(
    State(state): State<AppState>,
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
) -> ApiResult<Json<ItemPackaging>> {
    let mut conn = tenant.conn().await;
    let packaging = state
        .labels
        .regenerate(&mut conn, tenant.namespace_id(), store_id, id)
        .await?;
    Ok(Json(packaging))
}
