//! User persistence (root namespace)

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use stockroom_common::db::User;
use stockroom_common::{Error, Result};

use crate::models::UserProfile;

/// Load user by email (case-insensitive)
pub async fn find_by_email(conn: &mut PgConnection, email: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM public.tb_user WHERE lower(email) = lower($1)")
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(user)
}

/// Load user by id, failing with `NotFound`
pub async fn get(conn: &mut PgConnection, id: i64) -> Result<User> {
    sqlx::query_as::<_, User>("SELECT * FROM public.tb_user WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("user {} not found", id)))
}

/// Create the user, or re-attach an existing one to `organization_id`
///
/// Re-attaching also reactivates the user; used when a returning visitor
/// starts a fresh demo.
pub async fn upsert_for_organization(
    conn: &mut PgConnection,
    profile: &UserProfile,
    organization_id: i64,
) -> Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO public.tb_user
            (email, auth_provider_id, given_name, family_name, picture_url, organization_id, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, TRUE)
        ON CONFLICT (email) DO UPDATE SET
            auth_provider_id = EXCLUDED.auth_provider_id,
            given_name = EXCLUDED.given_name,
            family_name = EXCLUDED.family_name,
            picture_url = EXCLUDED.picture_url,
            organization_id = EXCLUDED.organization_id,
            is_active = TRUE,
            updated_at = now()
        RETURNING *
        "#,
    )
    .bind(profile.email.to_lowercase())
    .bind(&profile.provider_id)
    .bind(&profile.given_name)
    .bind(&profile.family_name)
    .bind(&profile.picture_url)
    .bind(organization_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(user)
}

/// Stamp a successful login and refresh provider-supplied fields
pub async fn record_login(
    conn: &mut PgConnection,
    id: i64,
    profile: &UserProfile,
    at: DateTime<Utc>,
) -> Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE public.tb_user SET
            auth_provider_id = $2,
            given_name = COALESCE($3, given_name),
            family_name = COALESCE($4, family_name),
            picture_url = COALESCE($5, picture_url),
            last_login = $6,
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&profile.provider_id)
    .bind(&profile.given_name)
    .bind(&profile.family_name)
    .bind(&profile.picture_url)
    .bind(at)
    .fetch_one(&mut *conn)
    .await?;
    Ok(user)
}

/// Deactivate every user attached to `organization_id`
pub async fn deactivate_by_organization(conn: &mut PgConnection, organization_id: i64) -> Result<u64> {
    let done = sqlx::query(
        "UPDATE public.tb_user SET is_active = FALSE, updated_at = now() WHERE organization_id = $1",
    )
    .bind(organization_id)
    .execute(&mut *conn)
    .await?;
    Ok(done.rows_affected())
}
