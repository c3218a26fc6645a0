//! Foreign-key aware deletes
//!
//! A delete blocked by a foreign key becomes `ReferencedByOthers`, carrying
//! the rows that still point at the target so clients can show them.

use sqlx::{Acquire, PgConnection};
use stockroom_common::{Error, Result};
use tracing::warn;

/// Most referencing rows reported back to the client
const MAX_REFERENCING_ROWS: i64 = 50;

/// Quote an identifier reported by Postgres for interpolation
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Run a delete statement that binds `$1 = id` and optionally `$2 = scope`
///
/// Zero affected rows is `NotFound`. The delete runs in its own transaction
/// (a savepoint when the caller already holds one).
pub async fn delete_guarded(
    conn: &mut PgConnection,
    sql: &str,
    id: i64,
    scope: Option<i64>,
    what: &str,
) -> Result<()> {
    let mut tx = conn.begin().await?;

    let mut query = sqlx::query(sql).bind(id);
    if let Some(scope) = scope {
        query = query.bind(scope);
    }

    match query.execute(&mut *tx).await {
        Ok(done) if done.rows_affected() == 0 => {
            Err(Error::NotFound(format!("{} {} not found", what, id)))
        }
        Ok(_) => {
            tx.commit().await?;
            Ok(())
        }
        Err(err) => {
            tx.rollback().await?;
            Err(translate_delete_error(conn, err, what, id).await)
        }
    }
}

/// Map a failed delete into the service taxonomy
///
/// Must run after the failing transaction has been rolled back.
pub async fn translate_delete_error(
    conn: &mut PgConnection,
    err: sqlx::Error,
    what: &str,
    id: i64,
) -> Error {
    let Some((table, constraint)) = Error::foreign_key_violation(&err) else {
        return err.into();
    };

    let message = format!("{} {} is referenced by {}", what, id, table);
    let referencing = match referencing_rows(conn, &table, &constraint, id).await {
        Ok(rows) => rows,
        Err(lookup_err) => {
            warn!(
                table = %table,
                constraint = %constraint,
                "Could not load referencing rows: {}",
                lookup_err
            );
            Vec::new()
        }
    };

    Error::ReferencedByOthers {
        message,
        referencing,
    }
}

/// Rows of `table` whose `constraint` column equals `id`, as JSON objects
pub async fn referencing_rows(
    conn: &mut PgConnection,
    table: &str,
    constraint: &str,
    id: i64,
) -> Result<Vec<serde_json::Value>> {
    let column: Option<String> = sqlx::query_scalar(
        r#"
        SELECT kcu.column_name::TEXT
        FROM information_schema.key_column_usage kcu
        WHERE kcu.constraint_name = $1
          AND kcu.table_name = $2
          AND kcu.table_schema = current_schema()
        ORDER BY kcu.ordinal_position
        LIMIT 1
        "#,
    )
    .bind(constraint)
    .bind(table)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(column) = column else {
        return Ok(Vec::new());
    };

    let sql = format!(
        "SELECT to_jsonb(t) FROM {} t WHERE {} = $1 ORDER BY t.id LIMIT $2",
        quote_identifier(table),
        quote_identifier(&column)
    );
    let rows: Vec<serde_json::Value> = sqlx::query_scalar(&sql)
        .bind(id)
        .bind(MAX_REFERENCING_ROWS)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("tb_item"), "\"tb_item\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
