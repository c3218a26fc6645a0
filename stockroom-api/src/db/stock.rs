//! Stock level reads over `vw_stock`

use sqlx::{FromRow, PgConnection};
use stockroom_common::Result;

use crate::models::StockLevel;

/// Current stock of one item
#[derive(Debug, Clone, Copy, PartialEq, FromRow)]
pub struct ItemBalance {
    pub item_id: i64,
    pub current_stock: f64,
}

/// Every item of the store with its current stock
pub async fn by_store(conn: &mut PgConnection, store_id: i64) -> Result<Vec<StockLevel>> {
    let levels = sqlx::query_as::<_, StockLevel>(
        r#"
        SELECT store_id, item_id, item_description, category_id, category_description,
               unit_of_measure_id, unit_description, current_stock::DOUBLE PRECISION AS current_stock
        FROM vw_stock
        WHERE store_id = $1
        ORDER BY category_description, item_description, item_id
        "#,
    )
    .bind(store_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(levels)
}

/// Items of one category with their current stock
pub async fn by_category(conn: &mut PgConnection, store_id: i64, category_id: i64) -> Result<Vec<StockLevel>> {
    let levels = sqlx::query_as::<_, StockLevel>(
        r#"
        SELECT store_id, item_id, item_description, category_id, category_description,
               unit_of_measure_id, unit_description, current_stock::DOUBLE PRECISION AS current_stock
        FROM vw_stock
        WHERE store_id = $1 AND category_id = $2
        ORDER BY item_description, item_id
        "#,
    )
    .bind(store_id)
    .bind(category_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(levels)
}

/// Current stock for the given items; items with no row are omitted
pub async fn balances(conn: &mut PgConnection, item_ids: &[i64]) -> Result<Vec<ItemBalance>> {
    let rows = sqlx::query_as::<_, ItemBalance>(
        r#"
        SELECT item_id, current_stock::DOUBLE PRECISION AS current_stock
        FROM vw_stock
        WHERE item_id = ANY($1)
        "#,
    )
    .bind(item_ids)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}
