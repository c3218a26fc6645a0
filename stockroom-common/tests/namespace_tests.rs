//! Namespace adapter tests against a scratch Postgres database
//!
//! Skipped unless `TEST_DATABASE_URL` is set.

use std::time::Duration;

use futures::FutureExt;
use serial_test::serial;
use sqlx::{PgConnection, PgPool};
use stockroom_common::db::migrations::{create_namespace, drop_namespace};
use stockroom_common::db::{init_database, namespace, PoolSettings};
use stockroom_common::Error;

async fn test_pool() -> Option<PgPool> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) if !url.is_empty() => url,
        _ => {
            eprintln!("TEST_DATABASE_URL not set; skipping");
            return None;
        }
    };
    let settings = PoolSettings {
        max_connections: 1,
        acquire_timeout: Duration::from_secs(5),
    };
    Some(init_database(&url, &settings).await.unwrap())
}

async fn current_schema(conn: &mut PgConnection) -> String {
    sqlx::query_scalar("SELECT current_schema()::text")
        .fetch_one(&mut *conn)
        .await
        .unwrap()
}

async fn scratch_namespace(pool: &PgPool) -> String {
    let namespace_id = format!("ns_test_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
    let mut conn = pool.acquire().await.unwrap();
    create_namespace(&mut conn, &namespace_id).await.unwrap();
    namespace_id
}

async fn cleanup(pool: &PgPool, namespace_id: &str) {
    let mut conn = pool.acquire().await.unwrap();
    drop_namespace(&mut conn, namespace_id).await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_scope_reverts_after_success() {
    let Some(pool) = test_pool().await else { return };
    let namespace_id = scratch_namespace(&pool).await;

    let mut conn = namespace::acquire(&pool).await.unwrap();
    let inside = namespace::scope(&mut conn, &namespace_id, |conn| {
        async move { Ok(current_schema(conn).await) }.boxed()
    })
    .await
    .unwrap();

    assert_eq!(inside, namespace_id);
    assert_eq!(current_schema(&mut conn).await, namespace::ROOT_NAMESPACE);

    namespace::release(conn);
    cleanup(&pool, &namespace_id).await;
}

#[tokio::test]
#[serial]
async fn test_scope_reverts_after_error() {
    let Some(pool) = test_pool().await else { return };
    let namespace_id = scratch_namespace(&pool).await;

    let mut conn = namespace::acquire(&pool).await.unwrap();
    let result: stockroom_common::Result<()> = namespace::scope(&mut conn, &namespace_id, |_conn| {
        async move { Err(Error::ConflictingState("rolled back".to_string())) }.boxed()
    })
    .await;
    assert!(matches!(result, Err(Error::ConflictingState(_))));
    assert_eq!(current_schema(&mut conn).await, namespace::ROOT_NAMESPACE);

    // A failing statement inside the scope surfaces as a database error
    let result: stockroom_common::Result<i64> = namespace::scope(&mut conn, &namespace_id, |conn| {
        async move {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tb_missing_table")
                .fetch_one(&mut *conn)
                .await?;
            Ok::<_, Error>(count)
        }
        .boxed()
    })
    .await;
    assert!(matches!(result, Err(Error::Database(_))));
    assert_eq!(current_schema(&mut conn).await, namespace::ROOT_NAMESPACE);

    namespace::release(conn);
    cleanup(&pool, &namespace_id).await;
}

#[tokio::test]
#[serial]
async fn test_pin_unknown_namespace() {
    let Some(pool) = test_pool().await else { return };

    let mut conn = namespace::acquire(&pool).await.unwrap();
    let result = namespace::scope(&mut conn, "ns_test_never_created", |_conn| async move { Ok(()) }.boxed()).await;
    assert!(matches!(result, Err(Error::NamespaceNotFound(_))));
    assert_eq!(current_schema(&mut conn).await, namespace::ROOT_NAMESPACE);
}

#[tokio::test]
#[serial]
async fn test_release_resets_pin() {
    let Some(pool) = test_pool().await else { return };
    let namespace_id = scratch_namespace(&pool).await;

    let mut conn = namespace::acquire(&pool).await.unwrap();
    namespace::pin(&mut conn, &namespace_id).await.unwrap();
    assert_eq!(current_schema(&mut conn).await, namespace_id);
    namespace::release(conn);

    // Single-connection pool: the same connection comes back
    let mut conn = namespace::acquire(&pool).await.unwrap();
    assert_eq!(current_schema(&mut conn).await, namespace::ROOT_NAMESPACE);

    namespace::release(conn);
    cleanup(&pool, &namespace_id).await;
}
