//! Category persistence (tenant namespace, store-scoped)

use sqlx::PgConnection;
use stockroom_common::pagination::Page;
use stockroom_common::{Error, Result};

use super::references::delete_guarded;
use crate::models::Category;

pub async fn create(
    conn: &mut PgConnection,
    store_id: i64,
    description: &str,
    created_by: i64,
) -> Result<Category> {
    let category = sqlx::query_as::<_, Category>(
        r#"
        INSERT INTO tb_category (description, store_id, created_by)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(description.trim())
    .bind(store_id)
    .bind(created_by)
    .fetch_one(&mut *conn)
    .await?;
    Ok(category)
}

pub async fn list(conn: &mut PgConnection, store_id: i64, page: Page) -> Result<Vec<Category>> {
    let categories = sqlx::query_as::<_, Category>(
        r#"
        SELECT * FROM tb_category
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
    Ok(categories)
}

pub async fn get(conn: &mut PgConnection, store_id: i64, id: i64) -> Result<Category> {
    sqlx::query_as::<_, Category>("SELECT * FROM tb_category WHERE id = $1 AND store_id = $2")
        .bind(id)
        .bind(store_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("category {} not found", id)))
}

pub async fn update(
    conn: &mut PgConnection,
    store_id: i64,
    id: i64,
    description: &str,
) -> Result<Category> {
    sqlx::query_as::<_, Category>(
        r#"
        UPDATE tb_category SET description = $3, updated_at = now()
        WHERE id = $1 AND store_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(store_id)
    .bind(description.trim())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("category {} not found", id)))
}

pub async fn delete(conn: &mut PgConnection, store_id: i64, id: i64) -> Result<()> {
    delete_guarded(
        conn,
        "DELETE FROM tb_category WHERE id = $1 AND store_id = $2",
        id,
        Some(store_id),
        "category",
    )
    .await
}
