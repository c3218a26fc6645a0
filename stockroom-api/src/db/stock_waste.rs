//! Stock waste persistence (tenant namespace, store-scoped)

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use stockroom_common::pagination::Page;
use stockroom_common::{Error, Result};

use crate::models::{StockWaste, StockWastePayload};

pub async fn insert(
    conn: &mut PgConnection,
    store_id: i64,
    payload: &StockWastePayload,
    created_by: i64,
) -> Result<StockWaste> {
    let waste = sqlx::query_as::<_, StockWaste>(
        r#"
        INSERT INTO tb_stock_waste
            (store_id, item_id, wasted_quantity, reason_text, reason_image_url, created_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(store_id)
    .bind(payload.item_id)
    .bind(payload.wasted_quantity)
    .bind(payload.reason_text.trim())
    .bind(&payload.reason_image_url)
    .bind(created_by)
    .fetch_one(&mut *conn)
    .await?;
    Ok(waste)
}

pub async fn update(conn: &mut PgConnection, id: i64, payload: &StockWastePayload) -> Result<StockWaste> {
    let waste = sqlx::query_as::<_, StockWaste>(
        r#"
        UPDATE tb_stock_waste SET
            item_id = $2,
            wasted_quantity = $3,
            reason_text = $4,
            reason_image_url = $5,
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.item_id)
    .bind(payload.wasted_quantity)
    .bind(payload.reason_text.trim())
    .bind(&payload.reason_image_url)
    .fetch_one(&mut *conn)
    .await?;
    Ok(waste)
}

pub async fn delete(conn: &mut PgConnection, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM tb_stock_waste WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn lock(conn: &mut PgConnection, store_id: i64, id: i64) -> Result<StockWaste> {
    sqlx::query_as::<_, StockWaste>(
        "SELECT * FROM tb_stock_waste WHERE id = $1 AND store_id = $2 FOR UPDATE",
    )
    .bind(id)
    .bind(store_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("stock waste {} not found", id)))
}

pub async fn mark_finalized(conn: &mut PgConnection, id: i64, at: DateTime<Utc>) -> Result<StockWaste> {
    let waste = sqlx::query_as::<_, StockWaste>(
        r#"
        UPDATE tb_stock_waste SET status = 'finalized', finalized_at = $2, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(at)
    .fetch_one(&mut *conn)
    .await?;
    Ok(waste)
}

pub async fn get(conn: &mut PgConnection, store_id: i64, id: i64) -> Result<StockWaste> {
    sqlx::query_as::<_, StockWaste>("SELECT * FROM tb_stock_waste WHERE id = $1 AND store_id = $2")
        .bind(id)
        .bind(store_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("stock waste {} not found", id)))
}

pub async fn list(conn: &mut PgConnection, store_id: i64, page: Page) -> Result<Vec<StockWaste>> {
    let rows = sqlx::query_as::<_, StockWaste>(
        r#"
        SELECT * FROM tb_stock_waste
        WHERE store_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(store_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}
