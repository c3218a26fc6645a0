//! Stock-in persistence (tenant namespace, store-scoped)
//!
//! Row-level primitives only; the draft/finalize rules live in
//! `services::stock_ledger`.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use stockroom_common::pagination::Page;
use stockroom_common::{Error, Result};

use crate::models::{StockIn, StockInItem, StockInLine};

pub async fn insert_header(conn: &mut PgConnection, store_id: i64, created_by: i64) -> Result<StockIn> {
    let header = sqlx::query_as::<_, StockIn>(
        "INSERT INTO tb_stock_in (store_id, created_by) VALUES ($1, $2) RETURNING *",
    )
    .bind(store_id)
    .bind(created_by)
    .fetch_one(&mut *conn)
    .await?;
    Ok(header)
}

pub async fn insert_line(conn: &mut PgConnection, stock_in_id: i64, line: &StockInLine) -> Result<StockInItem> {
    let item = sqlx::query_as::<_, StockInItem>(
        r#"
        INSERT INTO tb_stock_in_item (stock_in_id, item_packaging_id, buy_price, quantity)
        VALUES ($1, $2, $3, $4)
        RETURNING id, stock_in_id, item_packaging_id, buy_price, quantity
        "#,
    )
    .bind(stock_in_id)
    .bind(line.item_packaging_id)
    .bind(line.buy_price)
    .bind(line.quantity)
    .fetch_one(&mut *conn)
    .await?;
    Ok(item)
}

pub async fn update_line(
    conn: &mut PgConnection,
    stock_in_id: i64,
    line_id: i64,
    line: &StockInLine,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE tb_stock_in_item SET
            item_packaging_id = $3, buy_price = $4, quantity = $5, updated_at = now()
        WHERE id = $1 AND stock_in_id = $2
        "#,
    )
    .bind(line_id)
    .bind(stock_in_id)
    .bind(line.item_packaging_id)
    .bind(line.buy_price)
    .bind(line.quantity)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn delete_lines(conn: &mut PgConnection, stock_in_id: i64, line_ids: &[i64]) -> Result<()> {
    sqlx::query("DELETE FROM tb_stock_in_item WHERE stock_in_id = $1 AND id = ANY($2)")
        .bind(stock_in_id)
        .bind(line_ids)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn delete_all_lines(conn: &mut PgConnection, stock_in_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM tb_stock_in_item WHERE stock_in_id = $1")
        .bind(stock_in_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn delete_header(conn: &mut PgConnection, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM tb_stock_in WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Header row locked for the rest of the transaction
pub async fn lock_header(conn: &mut PgConnection, store_id: i64, id: i64) -> Result<StockIn> {
    sqlx::query_as::<_, StockIn>("SELECT * FROM tb_stock_in WHERE id = $1 AND store_id = $2 FOR UPDATE")
        .bind(id)
        .bind(store_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("stock-in {} not found", id)))
}

pub async fn touch(conn: &mut PgConnection, id: i64) -> Result<()> {
    sqlx::query("UPDATE tb_stock_in SET updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn mark_finalized(conn: &mut PgConnection, id: i64, at: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "UPDATE tb_stock_in SET status = 'finalized', finalized_at = $2, updated_at = now() WHERE id = $1",
    )
    .bind(id)
    .bind(at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn line_ids(conn: &mut PgConnection, stock_in_id: i64) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar("SELECT id FROM tb_stock_in_item WHERE stock_in_id = $1 ORDER BY id")
        .bind(stock_in_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(ids)
}

/// Items whose stock a finalize of `stock_in_id` would change
pub async fn affected_items(conn: &mut PgConnection, stock_in_id: i64) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar(
        r#"
        SELECT DISTINCT p.item_id
        FROM tb_stock_in_item sii
        JOIN tb_item_packaging p ON p.id = sii.item_packaging_id
        WHERE sii.stock_in_id = $1
        ORDER BY p.item_id
        "#,
    )
    .bind(stock_in_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids)
}

async fn attach_lines(conn: &mut PgConnection, headers: &mut [StockIn]) -> Result<()> {
    let ids: Vec<i64> = headers.iter().map(|h| h.id).collect();
    let lines = sqlx::query_as::<_, StockInItem>(
        r#"
        SELECT id, stock_in_id, item_packaging_id, buy_price, quantity
        FROM tb_stock_in_item
        WHERE stock_in_id = ANY($1)
        ORDER BY id
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    for header in headers.iter_mut() {
        header.items = lines
            .iter()
            .filter(|line| line.stock_in_id == header.id)
            .cloned()
            .collect();
    }
    Ok(())
}

pub async fn get(conn: &mut PgConnection, store_id: i64, id: i64) -> Result<StockIn> {
    let header = sqlx::query_as::<_, StockIn>("SELECT * FROM tb_stock_in WHERE id = $1 AND store_id = $2")
        .bind(id)
        .bind(store_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("stock-in {} not found", id)))?;

    let mut headers = [header];
    attach_lines(conn, &mut headers).await?;
    let [header] = headers;
    Ok(header)
}

pub async fn list(conn: &mut PgConnection, store_id: i64, page: Page) -> Result<Vec<StockIn>> {
    let mut headers = sqlx::query_as::<_, StockIn>(
        r#"
        SELECT * FROM tb_stock_in
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

    attach_lines(conn, &mut headers).await?;
    Ok(headers)
}
