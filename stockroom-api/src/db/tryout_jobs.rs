//! Demo provisioning job persistence (root namespace)

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use stockroom_common::db::{TryOutJob, TryOutStatus};
use stockroom_common::{Error, Result};
use uuid::Uuid;

/// Queue a new job in `pending`
pub async fn create(
    conn: &mut PgConnection,
    tryout_uuid: Uuid,
    created_by: i64,
    organization_id: i64,
) -> Result<TryOutJob> {
    let job = sqlx::query_as::<_, TryOutJob>(
        r#"
        INSERT INTO public.tb_tryout_job (tryout_uuid, created_by, organization_id, status)
        VALUES ($1, $2, $3, 'pending')
        RETURNING *
        "#,
    )
    .bind(tryout_uuid)
    .bind(created_by)
    .bind(organization_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(job)
}

pub async fn find_by_uuid(conn: &mut PgConnection, tryout_uuid: Uuid) -> Result<Option<TryOutJob>> {
    let job = sqlx::query_as::<_, TryOutJob>("SELECT * FROM public.tb_tryout_job WHERE tryout_uuid = $1")
        .bind(tryout_uuid)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(job)
}

pub async fn find_by_organization(
    conn: &mut PgConnection,
    organization_id: i64,
) -> Result<Option<TryOutJob>> {
    let job = sqlx::query_as::<_, TryOutJob>(
        "SELECT * FROM public.tb_tryout_job WHERE organization_id = $1 ORDER BY id DESC LIMIT 1",
    )
    .bind(organization_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(job)
}

/// Atomically move up to `limit` pending jobs to `in_progress`
///
/// Concurrent workers never claim the same job.
pub async fn claim_pending(conn: &mut PgConnection, limit: i64) -> Result<Vec<TryOutJob>> {
    let jobs = sqlx::query_as::<_, TryOutJob>(
        r#"
        UPDATE public.tb_tryout_job SET status = 'in_progress', updated_at = now()
        WHERE id IN (
            SELECT id FROM public.tb_tryout_job
            WHERE status = 'pending'
            ORDER BY created_at
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING *
        "#,
    )
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;
    Ok(jobs)
}

/// Re-claim jobs stuck in `in_progress` since before `stale_before`
///
/// Covers a worker that stopped mid-provisioning; provisioning is idempotent.
pub async fn claim_stalled(
    conn: &mut PgConnection,
    stale_before: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<TryOutJob>> {
    let jobs = sqlx::query_as::<_, TryOutJob>(
        r#"
        UPDATE public.tb_tryout_job SET updated_at = now()
        WHERE id IN (
            SELECT id FROM public.tb_tryout_job
            WHERE status = 'in_progress' AND updated_at < $1
            ORDER BY created_at
            LIMIT $2
            FOR UPDATE SKIP LOCKED
        )
        RETURNING *
        "#,
    )
    .bind(stale_before)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;
    Ok(jobs)
}

/// Move a job from `from` to `to`
///
/// Fails with `ConflictingState` if the transition is illegal or the job is
/// no longer in `from`.
pub async fn transition(
    conn: &mut PgConnection,
    id: i64,
    from: TryOutStatus,
    to: TryOutStatus,
) -> Result<TryOutJob> {
    if !from.can_transition_to(to) {
        return Err(Error::ConflictingState(format!(
            "job {}: {} -> {} is not allowed",
            id, from, to
        )));
    }

    sqlx::query_as::<_, TryOutJob>(
        r#"
        UPDATE public.tb_tryout_job SET status = $3, updated_at = now()
        WHERE id = $1 AND status = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(from)
    .bind(to)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::ConflictingState(format!("job {} is no longer {}", id, from)))
}
