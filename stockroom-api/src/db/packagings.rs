//! Item packaging persistence (tenant namespace)
//!
//! Packagings hang off an item; the store scope is checked through the item.

use sqlx::{FromRow, PgConnection};
use stockroom_common::pagination::Page;
use stockroom_common::{Error, Result};
use uuid::Uuid;

use super::references::delete_guarded;
use crate::models::{ItemPackaging, LabelSubject};

/// Row to insert; label fields are already rendered
#[derive(Debug, Clone)]
pub struct NewPackaging<'a> {
    pub uuid: Uuid,
    pub item_id: i64,
    pub description: &'a str,
    pub quantity: f64,
    pub ean_8: &'a str,
    pub label_pdf_url: &'a str,
    pub label_preview_url: &'a str,
}

/// Packaging size and owning item, as used by the stock ledger
#[derive(Debug, Clone, Copy, PartialEq, FromRow)]
pub struct PackagingUnit {
    pub id: i64,
    pub item_id: i64,
    pub quantity: f64,
}

pub async fn insert(conn: &mut PgConnection, row: &NewPackaging<'_>, created_by: i64) -> Result<ItemPackaging> {
    let packaging = sqlx::query_as::<_, ItemPackaging>(
        r#"
        INSERT INTO tb_item_packaging
            (uuid, item_id, description, quantity, ean_8, label_pdf_url, label_preview_url, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(row.uuid)
    .bind(row.item_id)
    .bind(row.description.trim())
    .bind(row.quantity)
    .bind(row.ean_8)
    .bind(row.label_pdf_url)
    .bind(row.label_preview_url)
    .bind(created_by)
    .fetch_one(&mut *conn)
    .await?;
    Ok(packaging)
}

/// Whether another packaging in this namespace already uses `ean_8`
pub async fn ean8_taken(conn: &mut PgConnection, ean_8: &str, except_id: Option<i64>) -> Result<bool> {
    let taken: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM tb_item_packaging
            WHERE ean_8 = $1 AND ($2::BIGINT IS NULL OR id <> $2)
        )
        "#,
    )
    .bind(ean_8)
    .bind(except_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(taken)
}

/// Packagings of a store, optionally narrowed to one item
pub async fn list(
    conn: &mut PgConnection,
    store_id: i64,
    item_id: Option<i64>,
    page: Page,
) -> Result<Vec<ItemPackaging>> {
    let packagings = sqlx::query_as::<_, ItemPackaging>(
        r#"
        SELECT p.*
        FROM tb_item_packaging p
        JOIN tb_item i ON i.id = p.item_id
        WHERE i.store_id = $1 AND ($2::BIGINT IS NULL OR p.item_id = $2)
        ORDER BY p.created_at DESC, p.id DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(store_id)
    .bind(item_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(&mut *conn)
    .await?;
    Ok(packagings)
}

pub async fn get(conn: &mut PgConnection, store_id: i64, id: i64) -> Result<ItemPackaging> {
    sqlx::query_as::<_, ItemPackaging>(
        r#"
        SELECT p.*
        FROM tb_item_packaging p
        JOIN tb_item i ON i.id = p.item_id
        WHERE p.id = $1 AND i.store_id = $2
        "#,
    )
    .bind(id)
    .bind(store_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("packaging {} not found", id)))
}

/// Current quantity of packaging `id`, row-locked until the transaction ends
///
/// The lock also blocks new movement lines from referencing the row.
pub async fn lock_quantity(conn: &mut PgConnection, id: i64) -> Result<f64> {
    sqlx::query_scalar::<_, f64>("SELECT quantity FROM tb_item_packaging WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("packaging {} not found", id)))
}

/// Whether any stock-in line or stock-out breakdown, draft or finalized, uses packaging `id`
pub async fn used_in_movements(conn: &mut PgConnection, id: i64) -> Result<bool> {
    let used: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(SELECT 1 FROM tb_stock_in_item WHERE item_packaging_id = $1)
            OR EXISTS(SELECT 1 FROM tb_stock_out_item_packaging WHERE item_packaging_id = $1)
        "#,
    )
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(used)
}

pub async fn update_fields(
    conn: &mut PgConnection,
    id: i64,
    description: &str,
    quantity: f64,
) -> Result<ItemPackaging> {
    sqlx::query_as::<_, ItemPackaging>(
        r#"
        UPDATE tb_item_packaging SET description = $2, quantity = $3, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(description.trim())
    .bind(quantity)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("packaging {} not found", id)))
}

/// Store the code and artifact URLs of a freshly rendered label
///
/// `uuid` changes only when a legacy row needed a fresh code.
pub async fn set_label(
    conn: &mut PgConnection,
    id: i64,
    uuid: Uuid,
    ean_8: &str,
    label_pdf_url: &str,
    label_preview_url: &str,
) -> Result<ItemPackaging> {
    sqlx::query_as::<_, ItemPackaging>(
        r#"
        UPDATE tb_item_packaging SET
            uuid = $2,
            ean_8 = $3,
            label_pdf_url = $4,
            label_preview_url = $5,
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(uuid)
    .bind(ean_8)
    .bind(label_pdf_url)
    .bind(label_preview_url)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("packaging {} not found", id)))
}

pub async fn delete(conn: &mut PgConnection, store_id: i64, id: i64) -> Result<()> {
    delete_guarded(
        conn,
        r#"
        DELETE FROM tb_item_packaging p
        USING tb_item i
        WHERE p.id = $1 AND p.item_id = i.id AND i.store_id = $2
        "#,
        id,
        Some(store_id),
        "packaging",
    )
    .await
}

/// Everything the label shows for packaging `id`
pub async fn label_subject(conn: &mut PgConnection, id: i64) -> Result<LabelSubject> {
    sqlx::query_as::<_, LabelSubject>(
        r#"
        SELECT p.id AS packaging_id, p.uuid, p.ean_8,
               p.description AS packaging_description, p.quantity,
               i.description AS item_description,
               u.description AS unit_description,
               s.id AS store_id, s.name AS store_name
        FROM tb_item_packaging p
        JOIN tb_item i ON i.id = p.item_id
        JOIN tb_unit_of_measure u ON u.id = i.unit_of_measure_id
        JOIN tb_store s ON s.id = i.store_id
        WHERE p.id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("packaging {} not found", id)))
}

/// Packagings missing a code or a label URL, oldest first
pub async fn missing_labels(conn: &mut PgConnection) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar(
        r#"
        SELECT id FROM tb_item_packaging
        WHERE ean_8 IS NULL OR label_pdf_url IS NULL OR label_preview_url IS NULL
        ORDER BY id
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids)
}

/// Size and item of each packaging in `ids` that belongs to `store_id`
pub async fn units_in_store(
    conn: &mut PgConnection,
    store_id: i64,
    ids: &[i64],
) -> Result<Vec<PackagingUnit>> {
    let units = sqlx::query_as::<_, PackagingUnit>(
        r#"
        SELECT p.id, p.item_id, p.quantity
        FROM tb_item_packaging p
        JOIN tb_item i ON i.id = p.item_id
        WHERE p.id = ANY($1) AND i.store_id = $2
        "#,
    )
    .bind(ids)
    .bind(store_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(units)
}
