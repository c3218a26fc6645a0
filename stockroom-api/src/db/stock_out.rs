//! Stock-out persistence (tenant namespace, store-scoped)
//!
//! A stock-out has lines per item; each line carries its packaging
//! breakdown.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use stockroom_common::pagination::Page;
use stockroom_common::{Error, Result};

use crate::models::{PackagingCount, StockOut, StockOutItem, StockOutItemPackaging, StockOutLine};

/// Requested quantity of one item on a stock-out
#[derive(Debug, Clone, Copy, PartialEq, FromRow)]
pub struct ItemDemand {
    pub item_id: i64,
    pub quantity: f64,
}

pub async fn insert_header(conn: &mut PgConnection, store_id: i64, created_by: i64) -> Result<StockOut> {
    let header = sqlx::query_as::<_, StockOut>(
        "INSERT INTO tb_stock_out (store_id, created_by) VALUES ($1, $2) RETURNING *",
    )
    .bind(store_id)
    .bind(created_by)
    .fetch_one(&mut *conn)
    .await?;
    Ok(header)
}

pub async fn insert_line(conn: &mut PgConnection, stock_out_id: i64, line: &StockOutLine) -> Result<i64> {
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO tb_stock_out_item (stock_out_id, item_id, total_quantity)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(stock_out_id)
    .bind(line.item_id)
    .bind(line.total_quantity)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

pub async fn update_line(
    conn: &mut PgConnection,
    stock_out_id: i64,
    line_id: i64,
    line: &StockOutLine,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE tb_stock_out_item SET item_id = $3, total_quantity = $4, updated_at = now()
        WHERE id = $1 AND stock_out_id = $2
        "#,
    )
    .bind(line_id)
    .bind(stock_out_id)
    .bind(line.item_id)
    .bind(line.total_quantity)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Delete lines and their breakdown rows
pub async fn delete_lines(conn: &mut PgConnection, stock_out_id: i64, line_ids: &[i64]) -> Result<()> {
    sqlx::query("DELETE FROM tb_stock_out_item_packaging WHERE stock_out_item_id = ANY($1)")
        .bind(line_ids)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM tb_stock_out_item WHERE stock_out_id = $1 AND id = ANY($2)")
        .bind(stock_out_id)
        .bind(line_ids)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn line_ids(conn: &mut PgConnection, stock_out_id: i64) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar("SELECT id FROM tb_stock_out_item WHERE stock_out_id = $1 ORDER BY id")
        .bind(stock_out_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(ids)
}

// ========================================
// Packaging Breakdown
// ========================================

pub async fn insert_packaging(
    conn: &mut PgConnection,
    line_id: i64,
    position: i32,
    count: &PackagingCount,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO tb_stock_out_item_packaging (stock_out_item_id, item_packaging_id, quantity, position)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(line_id)
    .bind(count.item_packaging_id)
    .bind(count.quantity)
    .bind(position)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn update_packaging(
    conn: &mut PgConnection,
    line_id: i64,
    id: i64,
    position: i32,
    count: &PackagingCount,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE tb_stock_out_item_packaging SET
            item_packaging_id = $3, quantity = $4, position = $5, updated_at = now()
        WHERE id = $1 AND stock_out_item_id = $2
        "#,
    )
    .bind(id)
    .bind(line_id)
    .bind(count.item_packaging_id)
    .bind(count.quantity)
    .bind(position)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn delete_packagings(conn: &mut PgConnection, line_id: i64, ids: &[i64]) -> Result<()> {
    sqlx::query("DELETE FROM tb_stock_out_item_packaging WHERE stock_out_item_id = $1 AND id = ANY($2)")
        .bind(line_id)
        .bind(ids)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn packaging_ids(conn: &mut PgConnection, line_id: i64) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar(
        "SELECT id FROM tb_stock_out_item_packaging WHERE stock_out_item_id = $1 ORDER BY id",
    )
    .bind(line_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids)
}

// ========================================
// Header
// ========================================

pub async fn delete_all(conn: &mut PgConnection, stock_out_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        DELETE FROM tb_stock_out_item_packaging
        WHERE stock_out_item_id IN (SELECT id FROM tb_stock_out_item WHERE stock_out_id = $1)
        "#,
    )
    .bind(stock_out_id)
    .execute(&mut *conn)
    .await?;
    sqlx::query("DELETE FROM tb_stock_out_item WHERE stock_out_id = $1")
        .bind(stock_out_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM tb_stock_out WHERE id = $1")
        .bind(stock_out_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn lock_header(conn: &mut PgConnection, store_id: i64, id: i64) -> Result<StockOut> {
    sqlx::query_as::<_, StockOut>("SELECT * FROM tb_stock_out WHERE id = $1 AND store_id = $2 FOR UPDATE")
        .bind(id)
        .bind(store_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("stock-out {} not found", id)))
}

pub async fn touch(conn: &mut PgConnection, id: i64) -> Result<()> {
    sqlx::query("UPDATE tb_stock_out SET updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn mark_finalized(conn: &mut PgConnection, id: i64, at: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "UPDATE tb_stock_out SET status = 'finalized', finalized_at = $2, updated_at = now() WHERE id = $1",
    )
    .bind(id)
    .bind(at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Total requested quantity per item on `stock_out_id`
pub async fn demand(conn: &mut PgConnection, stock_out_id: i64) -> Result<Vec<ItemDemand>> {
    let demand = sqlx::query_as::<_, ItemDemand>(
        r#"
        SELECT item_id, SUM(total_quantity)::DOUBLE PRECISION AS quantity
        FROM tb_stock_out_item
        WHERE stock_out_id = $1
        GROUP BY item_id
        ORDER BY item_id
        "#,
    )
    .bind(stock_out_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(demand)
}

async fn attach_lines(conn: &mut PgConnection, headers: &mut [StockOut]) -> Result<()> {
    let ids: Vec<i64> = headers.iter().map(|h| h.id).collect();
    let mut lines = sqlx::query_as::<_, StockOutItem>(
        r#"
        SELECT id, stock_out_id, item_id, total_quantity
        FROM tb_stock_out_item
        WHERE stock_out_id = ANY($1)
        ORDER BY id
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let line_ids: Vec<i64> = lines.iter().map(|l| l.id).collect();
    let packagings = sqlx::query_as::<_, StockOutItemPackaging>(
        r#"
        SELECT id, stock_out_item_id, item_packaging_id, quantity
        FROM tb_stock_out_item_packaging
        WHERE stock_out_item_id = ANY($1)
        ORDER BY position, id
        "#,
    )
    .bind(&line_ids)
    .fetch_all(&mut *conn)
    .await?;

    for line in lines.iter_mut() {
        line.packagings = packagings
            .iter()
            .filter(|p| p.stock_out_item_id == line.id)
            .cloned()
            .collect();
    }
    for header in headers.iter_mut() {
        header.items = lines
            .iter()
            .filter(|line| line.stock_out_id == header.id)
            .cloned()
            .collect();
    }
    Ok(())
}

pub async fn get(conn: &mut PgConnection, store_id: i64, id: i64) -> Result<StockOut> {
    let header = sqlx::query_as::<_, StockOut>("SELECT * FROM tb_stock_out WHERE id = $1 AND store_id = $2")
        .bind(id)
        .bind(store_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("stock-out {} not found", id)))?;

    let mut headers = [header];
    attach_lines(conn, &mut headers).await?;
    let [header] = headers;
    Ok(header)
}

pub async fn list(conn: &mut PgConnection, store_id: i64, page: Page) -> Result<Vec<StockOut>> {
    let mut headers = sqlx::query_as::<_, StockOut>(
        r#"
        SELECT * FROM tb_stock_out
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
