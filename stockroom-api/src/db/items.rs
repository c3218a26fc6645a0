//! Item persistence (tenant namespace, store-scoped)

use sqlx::PgConnection;
use stockroom_common::pagination::Page;
use stockroom_common::{Error, Result};

use super::references::delete_guarded;
use crate::models::{Item, ItemListing, ItemPayload};

/// Category and unit must both belong to `store_id`
async fn ensure_same_store(conn: &mut PgConnection, store_id: i64, payload: &ItemPayload) -> Result<()> {
    let (category_ok, unit_ok): (bool, bool) = sqlx::query_as(
        r#"
        SELECT
            EXISTS(SELECT 1 FROM tb_category WHERE id = $1 AND store_id = $3),
            EXISTS(SELECT 1 FROM tb_unit_of_measure WHERE id = $2 AND store_id = $3)
        "#,
    )
    .bind(payload.category_id)
    .bind(payload.unit_of_measure_id)
    .bind(store_id)
    .fetch_one(&mut *conn)
    .await?;

    if !category_ok {
        return Err(Error::UnprocessableEntity(format!(
            "category {} does not belong to store {}",
            payload.category_id, store_id
        )));
    }
    if !unit_ok {
        return Err(Error::UnprocessableEntity(format!(
            "unit of measure {} does not belong to store {}",
            payload.unit_of_measure_id, store_id
        )));
    }
    Ok(())
}

pub async fn create(
    conn: &mut PgConnection,
    store_id: i64,
    payload: &ItemPayload,
    created_by: i64,
) -> Result<Item> {
    ensure_same_store(conn, store_id, payload).await?;

    let item = sqlx::query_as::<_, Item>(
        r#"
        INSERT INTO tb_item
            (description, ean_13, category_id, unit_of_measure_id, store_id, is_fractionable, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(payload.description.trim())
    .bind(&payload.ean_13)
    .bind(payload.category_id)
    .bind(payload.unit_of_measure_id)
    .bind(store_id)
    .bind(payload.is_fractionable)
    .bind(created_by)
    .fetch_one(&mut *conn)
    .await?;
    Ok(item)
}

/// Items of a store with their category and unit descriptions
pub async fn list(conn: &mut PgConnection, store_id: i64, page: Page) -> Result<Vec<ItemListing>> {
    let items = sqlx::query_as::<_, ItemListing>(
        r#"
        SELECT i.id, i.description, i.ean_13,
               i.category_id, c.description AS category_description,
               i.unit_of_measure_id, u.description AS unit_description,
               i.store_id, i.is_fractionable, i.created_at, i.updated_at
        FROM tb_item i
        JOIN tb_category c ON c.id = i.category_id
        JOIN tb_unit_of_measure u ON u.id = i.unit_of_measure_id
        WHERE i.store_id = $1
        ORDER BY i.created_at DESC, i.id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(store_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(&mut *conn)
    .await?;
    Ok(items)
}

pub async fn get(conn: &mut PgConnection, store_id: i64, id: i64) -> Result<Item> {
    sqlx::query_as::<_, Item>("SELECT * FROM tb_item WHERE id = $1 AND store_id = $2")
        .bind(id)
        .bind(store_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("item {} not found", id)))
}

pub async fn update(
    conn: &mut PgConnection,
    store_id: i64,
    id: i64,
    payload: &ItemPayload,
) -> Result<Item> {
    ensure_same_store(conn, store_id, payload).await?;

    sqlx::query_as::<_, Item>(
        r#"
        UPDATE tb_item SET
            description = $3,
            ean_13 = $4,
            category_id = $5,
            unit_of_measure_id = $6,
            is_fractionable = $7,
            updated_at = now()
        WHERE id = $1 AND store_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(store_id)
    .bind(payload.description.trim())
    .bind(&payload.ean_13)
    .bind(payload.category_id)
    .bind(payload.unit_of_measure_id)
    .bind(payload.is_fractionable)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("item {} not found", id)))
}

pub async fn delete(conn: &mut PgConnection, store_id: i64, id: i64) -> Result<()> {
    delete_guarded(
        conn,
        "DELETE FROM tb_item WHERE id = $1 AND store_id = $2",
        id,
        Some(store_id),
        "item",
    )
    .await
}

/// Ids from `ids` that are not items of `store_id`
pub async fn missing_from_store(conn: &mut PgConnection, store_id: i64, ids: &[i64]) -> Result<Vec<i64>> {
    let missing: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT wanted.id
        FROM UNNEST($1::BIGINT[]) AS wanted(id)
        WHERE NOT EXISTS (SELECT 1 FROM tb_item i WHERE i.id = wanted.id AND i.store_id = $2)
        ORDER BY wanted.id
        "#,
    )
    .bind(ids)
    .bind(store_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(missing)
}

/// Lock item rows for the rest of the transaction, in id order
pub async fn lock_for_update(conn: &mut PgConnection, ids: &[i64]) -> Result<()> {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sqlx::query("SELECT id FROM tb_item WHERE id = ANY($1) ORDER BY id FOR UPDATE")
        .bind(&sorted)
        .fetch_all(&mut *conn)
        .await?;
    Ok(())
}
