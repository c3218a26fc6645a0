//! Item, category and unit-of-measure endpoints
//!
//! Every route here runs behind the store middleware; rows are read and
//! written only within the `X-Store-ID` store.

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    Json,
};
use stockroom_common::pagination::{Page, PageQuery};

use super::context::{StoreScope, TenantContext};
use crate::db::{categories, items, units};
use crate::error::ApiResult;
use crate::models::{Category, DescriptionPayload, Item, ItemListing, ItemPayload, UnitOfMeasure};
use crate::validation::ValidJson;

// ========================================
// Items
// ========================================

pub async fn list_items(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<ItemListing>>> {
    let mut conn = tenant.conn().await;
    Ok(Json(items::list(&mut conn, store_id, Page::from(query)).await?))
}

pub async fn create_item(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    ValidJson(payload): ValidJson<ItemPayload>,
) -> ApiResult<(StatusCode, Json<Item>)> {
    let mut conn = tenant.conn().await;
    let item = items::create(&mut conn, store_id, &payload, tenant.user_id()).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn get_item(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
) -> ApiResult<Json<Item>> {
    let mut conn = tenant.conn().await;
    Ok(Json(items::get(&mut conn, store_id, id).await?))
}

pub async fn update_item(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
    ValidJson(payload): ValidJson<ItemPayload>,
) -> ApiResult<Json<Item>> {
    let mut conn = tenant.conn().await;
    Ok(Json(items::update(&mut conn, store_id, id, &payload).await?))
}

pub async fn delete_item(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = tenant.conn().await;
    items::delete(&mut conn, store_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ========================================
// Categories
// ========================================

pub async fn list_categories(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<Category>>> {
    let mut conn = tenant.conn().await;
    Ok(Json(categories::list(&mut conn, store_id, Page::from(query)).await?))
}

pub async fn create_category(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    ValidJson(payload): ValidJson<DescriptionPayload>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    let mut conn = tenant.conn().await;
    let category = categories::create(&mut conn, store_id, &payload.description, tenant.user_id()).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn get_category(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
) -> ApiResult<Json<Category>> {
    let mut conn = tenant.conn().await;
    Ok(Json(categories::get(&mut conn, store_id, id).await?))
}

pub async fn update_category(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
    ValidJson(payload): ValidJson<DescriptionPayload>,
) -> ApiResult<Json<Category>> {
    let mut conn = tenant.conn().await;
    Ok(Json(categories::update(&mut conn, store_id, id, &payload.description).await?))
}

pub async fn delete_category(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = tenant.conn().await;
    categories::delete(&mut conn, store_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ========================================
// Units of measure
// ========================================

pub async fn list_units(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<UnitOfMeasure>>> {
    let mut conn = tenant.conn().await;
    Ok(Json(units::list(&mut conn, store_id, Page::from(query)).await?))
}

pub async fn create_unit(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    ValidJson(payload): ValidJson<DescriptionPayload>,
) -> ApiResult<(StatusCode, Json<UnitOfMeasure>)> {
    let mut conn = tenant.conn().await;
    let unit = units::create(&mut conn, store_id, &payload.description, tenant.user_id()).await?;
    Ok((StatusCode::CREATED, Json(unit)))
}

pub async fn get_unit(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
) -> ApiResult<Json<UnitOfMeasure>> {
    let mut conn = tenant.conn().await;
    Ok(Json(units::get(&mut conn, store_id, id).await?))
}

pub async fn update_unit(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
    ValidJson(payload): ValidJson<DescriptionPayload>,
) -> ApiResult<Json<UnitOfMeasure>> {
    let mut conn = tenant.conn().await;
    Ok(Json(units::update(&mut conn, store_id, id, &payload.description).await?))
}

pub async fn delete_unit(
    tenant: TenantContext,
    StoreScope(store_id): StoreScope,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = tenant.conn().await;
    units::delete(&mut conn, store_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
