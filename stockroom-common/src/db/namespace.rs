//! Namespace adapter
//!
//! Tenants live in dedicated Postgres schemas. Queries use unqualified table
//! names and resolve against whatever schema the connection is pinned to;
//! the shared root schema (`public`) always follows the tenant schema on the
//! search path.

use crate::{Error, Result};
use futures::future::BoxFuture;
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres};
use tracing::debug;

/// Shared root namespace holding organizations, users and jobs
pub const ROOT_NAMESPACE: &str = "public";

/// Longest identifier Postgres keeps without truncation
const MAX_NAMESPACE_LEN: usize = 63;

/// Leased connection from the shared pool
pub type LeasedConnection = PoolConnection<Postgres>;

/// True when `namespace_id` is a safe schema identifier
///
/// Accepts lowercase ASCII letters, digits and `_`, not starting with a digit,
/// at most 63 bytes.
pub fn is_valid_namespace_id(namespace_id: &str) -> bool {
    !namespace_id.is_empty()
        && namespace_id.len() <= MAX_NAMESPACE_LEN
        && !namespace_id.starts_with(|c: char| c.is_ascii_digit())
        && namespace_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && namespace_id != ROOT_NAMESPACE
}

/// Quote a namespace id for interpolation into DDL
pub fn quote_ident(namespace_id: &str) -> Result<String> {
    if !is_valid_namespace_id(namespace_id) {
        return Err(Error::InvalidInput(format!(
            "invalid namespace id {:?}",
            namespace_id
        )));
    }
    Ok(format!("\"{}\"", namespace_id))
}

/// Lend a connection from the pool
///
/// Fails with `PoolExhausted` when none frees up within the pool's
/// acquire timeout.
pub async fn acquire(pool: &PgPool) -> Result<LeasedConnection> {
    Ok(pool.acquire().await?)
}

/// Return a connection to the pool
///
/// The pool's release hook resets the search path.
pub fn release(conn: LeasedConnection) {
    drop(conn);
}

/// Whether the schema for `namespace_id` exists
pub async fn namespace_exists(conn: &mut PgConnection, namespace_id: &str) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_namespace WHERE nspname = $1)")
            .bind(namespace_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(exists)
}

/// Pin the connection to `namespace_id` until [`unpin`] or release
pub async fn pin(conn: &mut PgConnection, namespace_id: &str) -> Result<()> {
    let quoted = quote_ident(namespace_id)?;
    if !namespace_exists(conn, namespace_id).await? {
        return Err(Error::NamespaceNotFound(namespace_id.to_string()));
    }
    sqlx::query(&format!("SET search_path TO {}, {}", quoted, ROOT_NAMESPACE))
        .execute(&mut *conn)
        .await?;
    debug!(namespace = %namespace_id, "connection pinned");
    Ok(())
}

/// Pin for the rest of the current transaction only
///
/// The setting reverts when the transaction commits or rolls back.
pub async fn pin_local(conn: &mut PgConnection, namespace_id: &str) -> Result<()> {
    let quoted = quote_ident(namespace_id)?;
    if !namespace_exists(conn, namespace_id).await? {
        return Err(Error::NamespaceNotFound(namespace_id.to_string()));
    }
    sqlx::query(&format!("SET LOCAL search_path TO {}, {}", quoted, ROOT_NAMESPACE))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Revert the connection to the default search path
pub async fn unpin(conn: &mut PgConnection) -> Result<()> {
    sqlx::query("RESET search_path").execute(&mut *conn).await?;
    Ok(())
}

/// Run `scoped` with the connection pinned to `namespace_id`
///
/// The pin is reverted on every exit path; an error from `scoped` wins over
/// an error from the reset.
pub async fn scope<T, F>(conn: &mut PgConnection, namespace_id: &str, scoped: F) -> Result<T>
where
    F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T>>,
{
    pin(conn, namespace_id).await?;
    let outcome = scoped(&mut *conn).await;
    let reset = unpin(conn).await;
    let value = outcome?;
    reset?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_namespace_ids() {
        assert!(is_valid_namespace_id("org_acme"));
        assert!(is_valid_namespace_id("tryout_4f2a9c_0b7c3e2a5d1f4b7e9a553c2f1e0d9a88"));
    }

    #[test]
    fn test_invalid_namespace_ids() {
        assert!(!is_valid_namespace_id(""));
        assert!(!is_valid_namespace_id("public"));
        assert!(!is_valid_namespace_id("1org"));
        assert!(!is_valid_namespace_id("Org"));
        assert!(!is_valid_namespace_id("org\"; DROP SCHEMA public; --"));
        assert!(!is_valid_namespace_id(&"a".repeat(64)));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("org_acme").unwrap(), "\"org_acme\"");
        assert!(matches!(quote_ident("bad-name"), Err(Error::InvalidInput(_))));
    }
}
