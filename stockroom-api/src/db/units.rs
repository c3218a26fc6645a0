//! Unit of measure persistence (tenant namespace, store-scoped)

use sqlx::PgConnection;
use stockroom_common::pagination::Page;
use stockroom_common::{Error, Result};

use super::references::delete_guarded;
use crate::models::UnitOfMeasure;

pub async fn create(
    conn: &mut PgConnection,
    store_id: i64,
    description: &str,
    created_by: i64,
) -> Result<UnitOfMeasure> {
    let unit = sqlx::query_as::<_, UnitOfMeasure>(
        r#"
        INSERT INTO tb_unit_of_measure (description, store_id, created_by)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(description.trim())
    .bind(store_id)
    .bind(created_by)
    .fetch_one(&mut *conn)
    .await?;
    Ok(unit)
}

pub async fn list(conn: &mut PgConnection, store_id: i64, page: Page) -> Result<Vec<UnitOfMeasure>> {
    let units = sqlx::query_as::<_, UnitOfMeasure>(
        r#"
        SELECT * FROM tb_unit_of_measure
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
    Ok(units)
}

pub async fn get(conn: &mut PgConnection, store_id: i64, id: i64) -> Result<UnitOfMeasure> {
    sqlx::query_as::<_, UnitOfMeasure>("SELECT * FROM tb_unit_of_measure WHERE id = $1 AND store_id = $2")
        .bind(id)
        .bind(store_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("unit of measure {} not found", id)))
}

pub async fn update(
    conn: &mut PgConnection,
    store_id: i64,
    id: i64,
    description: &str,
) -> Result<UnitOfMeasure> {
    sqlx::query_as::<_, UnitOfMeasure>(
        r#"
        UPDATE tb_unit_of_measure SET description = $3, updated_at = now()
        WHERE id = $1 AND store_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(store_id)
    .bind(description.trim())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("unit of measure {} not found", id)))
}

pub async fn delete(conn: &mut PgConnection, store_id: i64, id: i64) -> Result<()> {
    delete_guarded(
        conn,
        "DELETE FROM tb_unit_of_measure WHERE id = $1 AND store_id = $2",
        id,
        Some(store_id),
        "unit of measure",
    )
    .await
}
