//! Store persistence (tenant namespace)

use sqlx::PgConnection;
use stockroom_common::pagination::Page;
use stockroom_common::{Error, Result};

use super::references::delete_guarded;
use crate::models::Store;

pub async fn create(conn: &mut PgConnection, name: &str, created_by: i64) -> Result<Store> {
    let store = sqlx::query_as::<_, Store>(
        "INSERT INTO tb_store (name, created_by) VALUES ($1, $2) RETURNING *",
    )
    .bind(name.trim())
    .bind(created_by)
    .fetch_one(&mut *conn)
    .await?;
    Ok(store)
}

pub async fn list(conn: &mut PgConnection, page: Page) -> Result<Vec<Store>> {
    let stores = sqlx::query_as::<_, Store>(
        "SELECT * FROM tb_store ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
    )
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(&mut *conn)
    .await?;
    Ok(stores)
}

pub async fn get(conn: &mut PgConnection, id: i64) -> Result<Store> {
    sqlx::query_as::<_, Store>("SELECT * FROM tb_store WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("store {} not found", id)))
}

/// Whether the store exists in the pinned namespace
pub async fn exists(conn: &mut PgConnection, id: i64) -> Result<bool> {
    let found: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tb_store WHERE id = $1)")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(found)
}

pub async fn update(conn: &mut PgConnection, id: i64, name: &str) -> Result<Store> {
    sqlx::query_as::<_, Store>(
        "UPDATE tb_store SET name = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(name.trim())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("store {} not found", id)))
}

pub async fn delete(conn: &mut PgConnection, id: i64) -> Result<()> {
    delete_guarded(conn, "DELETE FROM tb_store WHERE id = $1", id, None, "store").await
}
