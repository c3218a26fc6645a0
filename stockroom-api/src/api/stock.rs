//! Stock view and stock movement endpoints
//!
//! Movements are drafts until `PATCH .../finalize/:id`; only finalized
//! movements count toward the stock level.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use stockroom_common::pagination::{Page, PageQuery};

use super::context::{StoreScope, TenantContext};
use crate::db::{stock, stock_in, stock_out, stock_waste};
use crate::error::ApiResult;
use crate::models::{
    StockIn, StockInPayload, StockLevel, StockOut, StockOutPayload, StockWaste, StockWastePayload,
};
use crate::validation::ValidJson;
use crate::AppState;

/// GET /stock
pub async fn levels(tenant: TenantContext, StoreScope(store_id): StoreScope) -> ApiResult<Json<Vec<StockLevel>>> {
    let mut conn = tenant.conn().await;
    Ok(Json(stock::by_store(&mut conn, store_id).await?))
}

/// GET /stock/:category_id
pub async fn levels_by_category(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(category_id): Path<i64>,
) -> ApiResult<Json<Vec<StockLevel>>> {
    let mut conn = tenant.conn().await;
    Ok(Json(stock::by_category(&mut conn, store_id, category_id).await?))
}

// ========================================
// Stock In
// ========================================

pub async fn list_stock_in(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<StockIn>>> {
    let mut conn = tenant.conn().await;
    Ok(Json(stock_in::list(&mut conn, store_id, Page::from(query)).await?))
}

pub async fn create_stock_in(
    State(state): State<AppState>,
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    ValidJson(payload): ValidJson<StockInPayload>,
) -> ApiResult<(StatusCode, Json<StockIn>)> {
    let mut conn = tenant.conn().await;
    let created = state
        .ledger
        .create_stock_in(&mut conn, store_id, tenant.user_id(), &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_stock_in(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
) -> ApiResult<Json<StockIn>> {
    let mut conn = tenant.conn().await;
    Ok(Json(stock_in::get(&mut conn, store_id, id).await?))
}

pub async fn update_stock_in(
    State(state): State<AppState>,
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
    ValidJson(payload): ValidJson<StockInPayload>,
) -> ApiResult<Json<StockIn>> {
    let mut conn = tenant.conn().await;
    Ok(Json(state.ledger.update_stock_in(&mut conn, store_id, id, &payload).await?))
}

pub async fn delete_stock_in(
    State(state): State<AppState>,
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = tenant.conn().await;
    state.ledger.delete_stock_in(&mut conn, store_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn finalize_stock_in(
    State(state): State<AppState>,
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = tenant.conn().await;
    state.ledger.finalize_stock_in(&mut conn, store_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ========================================
// Stock Out
// ========================================

pub async fn list_stock_out(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<StockOut>>> {
    let mut conn = tenant.conn().await;
    Ok(Json(stock_out::list(&mut conn, store_id, Page::from(query)).await?))
}

pub async fn create_stock_out(
    State(state): State<AppState>,
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    ValidJson(payload): ValidJson<StockOutPayload>,
) -> ApiResult<(StatusCode, Json<StockOut>)> {
    let mut conn = tenant.conn().await;
    let created = state
        .ledger
        .create_stock_out(&mut conn, store_id, tenant.user_id(), &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_stock_out(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
) -> ApiResult<Json<StockOut>> {
    let mut conn = tenant.conn().await;
    Ok(Json(stock_out::get(&mut conn, store_id, id).await?))
}

pub async fn update_stock_out(
    State(state): State<AppState>,
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
    ValidJson(payload): ValidJson<StockOutPayload>,
) -> ApiResult<Json<StockOut>> {
    let mut conn = tenant.conn().await;
    Ok(Json(state.ledger.update_stock_out(&mut conn, store_id, id, &payload).await?))
}

pub async fn delete_stock_out(
    State(state): State<AppState>,
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = tenant.conn().await;
    state.ledger.delete_stock_out(&mut conn, store_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn finalize_stock_out(
    State(state): State<AppState>,
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = tenant.conn().await;
    state.ledger.finalize_stock_out(&mut conn, store_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ========================================
// Stock Waste
// ========================================

pub async fn list_waste(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<StockWaste>>> {
    let mut conn = tenant.conn().await;
    Ok(Json(stock_waste::list(&mut conn, store_id, Page::from(query)).await?))
}

pub async fn create_waste(
    State(state): State<AppState>,
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    ValidJson(payload): ValidJson<StockWastePayload>,
) -> ApiResult<(StatusCode, Json<StockWaste>)> {
    let mut conn = tenant.conn().await;
    let created = state
        .ledger
        .create_waste(&mut conn, store_id, tenant.user_id(), &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_waste(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
) -> ApiResult<Json<StockWaste>> {
    let mut conn = tenant.conn().await;
    Ok(Json(stock_waste::get(&mut conn, store_id, id).await?))
}

pub async fn update_waste(
    State(state): State<AppState>,
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
    ValidJson(payload): ValidJson<StockWastePayload>,
) -> ApiResult<Json<StockWaste>> {
    let mut conn = tenant.conn().await;
    Ok(Json(state.ledger.update_waste(&mut conn, store_id, id, &payload).await?))
}

pub async fn delete_waste(
    State(state): State<AppState>,
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = tenant.conn().await;
    state.ledger.delete_waste(&mut conn, store_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn finalize_waste(
    State(state): State<AppState>,
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = tenant.conn().await;
    state.ledger.finalize_waste(&mut conn, store_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
