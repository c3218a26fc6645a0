//! Organization persistence (root namespace)

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use stockroom_common::db::Organization;
use stockroom_common::{Error, Result};

/// Fields supplied when registering a tenant
#[derive(Debug, Clone)]
pub struct NewOrganization {
    pub name: String,
    pub key: String,
    pub domain: Option<String>,
    pub namespace_id: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_try_out: bool,
    /// Same clock reading `expires_at` is derived from
    pub created_at: DateTime<Utc>,
}

/// Insert an organization row
pub async fn create(conn: &mut PgConnection, org: &NewOrganization) -> Result<Organization> {
    let created = sqlx::query_as::<_, Organization>(
        r#"
        INSERT INTO public.tb_organization
            (name, key, domain, namespace_id, expires_at, is_try_out, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
        RETURNING *
        "#,
    )
    .bind(&org.name)
    .bind(&org.key)
    .bind(&org.domain)
    .bind(&org.namespace_id)
    .bind(org.expires_at)
    .bind(org.is_try_out)
    .bind(org.created_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(created)
}

/// Load organization by id
pub async fn find(conn: &mut PgConnection, id: i64) -> Result<Option<Organization>> {
    let org = sqlx::query_as::<_, Organization>("SELECT * FROM public.tb_organization WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(org)
}

/// Load organization by id, failing with `NotFound`
pub async fn get(conn: &mut PgConnection, id: i64) -> Result<Organization> {
    find(conn, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("organization {} not found", id)))
}

/// Active demo organizations whose lifetime has elapsed
pub async fn list_expired(conn: &mut PgConnection, now: DateTime<Utc>) -> Result<Vec<Organization>> {
    let orgs = sqlx::query_as::<_, Organization>(
        r#"
        SELECT * FROM public.tb_organization
        WHERE is_active AND is_try_out AND expires_at IS NOT NULL AND expires_at <= $1
        ORDER BY expires_at
        "#,
    )
    .bind(now)
    .fetch_all(&mut *conn)
    .await?;
    Ok(orgs)
}

/// Every active organization, oldest first
pub async fn list_active(conn: &mut PgConnection) -> Result<Vec<Organization>> {
    let orgs = sqlx::query_as::<_, Organization>(
        "SELECT * FROM public.tb_organization WHERE is_active ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(orgs)
}

/// Mark an organization inactive
pub async fn deactivate(conn: &mut PgConnection, id: i64) -> Result<()> {
    sqlx::query("UPDATE public.tb_organization SET is_active = FALSE, updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
