//! Tenant lifecycle engine
//!
//! Demo tenants go through a job: the login flow records an organization,
//! its user and a `pending` job in one root transaction; the worker later
//! creates and migrates the namespace. Expired tenants have their namespace
//! dropped and their users deactivated.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::{Acquire, PgConnection, PgPool};
use stockroom_common::db::migrations::{create_namespace, drop_namespace};
use stockroom_common::db::{Organization, TenantMigrator, TryOutJob, TryOutStatus, User};
use stockroom_common::pagination::Page;
use stockroom_common::time::SharedClock;
use stockroom_common::{uuid_utils, Error, Result};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::organizations::{self, NewOrganization};
use crate::db::{stores, tryout_jobs, users};
use crate::models::UserProfile;

/// Jobs claimed per drain
const DRAIN_BATCH: i64 = 10;

/// `in_progress` jobs untouched for this long are retried
const STALL_AFTER_MINUTES: i64 = 10;

/// Longest user-derived prefix in a demo namespace id
const NAMESPACE_TOKEN_LEN: usize = 16;

const DEMO_STORE_NAME: &str = "Demo store";

/// Namespace id for a demo tenant: `tryout_<user token>_<uuid hex>`
pub fn tryout_namespace_id(profile: &UserProfile, tryout_uuid: &Uuid) -> String {
    format!(
        "tryout_{}_{}",
        profile.namespace_token(NAMESPACE_TOKEN_LEN),
        tryout_uuid.simple()
    )
}

/// Rows written when a demo is requested
#[derive(Debug, Clone)]
pub struct TryOutStart {
    pub organization: Organization,
    pub user: User,
    pub job: TryOutJob,
}

/// Outcome of replaying migrations over many namespaces
#[derive(Debug, Default)]
pub struct MigrationSummary {
    pub migrated: Vec<(String, Vec<String>)>,
    pub failed: Vec<(String, String)>,
}

impl MigrationSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct TenantLifecycle {
    pool: PgPool,
    migrator: Arc<TenantMigrator>,
    clock: SharedClock,
    tryout_ttl: Duration,
}

impl TenantLifecycle {
    pub fn new(pool: PgPool, migrator: Arc<TenantMigrator>, clock: SharedClock, tryout_ttl: Duration) -> Self {
        Self {
            pool,
            migrator,
            clock,
            tryout_ttl,
        }
    }

    pub fn migrator(&self) -> &TenantMigrator {
        &self.migrator
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ========================================
    // Provisioning
    // ========================================

    /// Record a demo organization, its user and a pending job atomically
    pub async fn start_try_out(&self, profile: &UserProfile) -> Result<TryOutStart> {
        let tryout_uuid = uuid_utils::generate();
        let namespace_id = tryout_namespace_id(profile, &tryout_uuid);
        let now = self.now();
        let display_name = profile
            .given_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&profile.email);

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let organization = organizations::create(
            &mut tx,
            &NewOrganization {
                name: format!("Try-out {}", display_name.trim()),
                key: tryout_uuid.to_string(),
                domain: None,
                namespace_id,
                expires_at: Some(now + self.tryout_ttl),
                is_try_out: true,
                created_at: now,
            },
        )
        .await?;
        let user = users::upsert_for_organization(&mut tx, profile, organization.id).await?;
        let user = users::record_login(&mut tx, user.id, profile, now).await?;
        let job = tryout_jobs::create(&mut tx, tryout_uuid, user.id, organization.id).await?;

        tx.commit().await?;

        info!(
            job = %tryout_uuid,
            org_id = organization.id,
            namespace = %organization.namespace_id,
            "Try-out requested"
        );
        Ok(TryOutStart {
            organization,
            user,
            job,
        })
    }

    /// Provision the namespace of a claimed (`in_progress`) job
    ///
    /// Namespace creation, migrations and seeding share one transaction; the
    /// job ends in `created` or `failed`.
    pub async fn process_job(&self, job: &TryOutJob) -> Result<TryOutJob> {
        let mut conn = self.pool.acquire().await?;
        let organization = organizations::get(&mut conn, job.organization_id).await?;

        match self.provision(&mut conn, &organization, job.created_by).await {
            Ok(applied) => {
                let done =
                    tryout_jobs::transition(&mut conn, job.id, TryOutStatus::InProgress, TryOutStatus::Created)
                        .await?;
                info!(
                    job = %job.tryout_uuid,
                    namespace = %organization.namespace_id,
                    migrations = applied.len(),
                    "Try-out environment created"
                );
                Ok(done)
            }
            Err(e) => {
                error!(
                    job = %job.tryout_uuid,
                    namespace = %organization.namespace_id,
                    "Try-out provisioning failed: {}",
                    e
                );
                tryout_jobs::transition(&mut conn, job.id, TryOutStatus::InProgress, TryOutStatus::Failed).await
            }
        }
    }

    async fn provision(&self, conn: &mut PgConnection, organization: &Organization, created_by: i64) -> Result<Vec<String>> {
        let namespace_id = organization.namespace_id.as_str();
        let mut tx = conn.begin().await?;

        create_namespace(&mut tx, namespace_id).await?;
        let applied = self.migrator.apply_in_transaction(&mut tx, namespace_id).await?;

        if !self.migrator.is_dry_run() && stores::list(&mut tx, Page::default()).await?.is_empty() {
            stores::create(&mut tx, DEMO_STORE_NAME, created_by).await?;
        }

        tx.commit().await?;
        Ok(applied)
    }

    /// Claim and provision pending jobs one at a time
    pub async fn drain_pending(&self) -> Result<usize> {
        let jobs = {
            let mut conn = self.pool.acquire().await?;
            let mut jobs = tryout_jobs::claim_pending(&mut conn, DRAIN_BATCH).await?;
            let stale_before = self.now() - Duration::minutes(STALL_AFTER_MINUTES);
            let stalled = tryout_jobs::claim_stalled(&mut conn, stale_before, DRAIN_BATCH).await?;
            if !stalled.is_empty() {
                warn!(count = stalled.len(), "Retrying stalled try-out jobs");
            }
            jobs.extend(stalled);
            jobs
        };

        for job in &jobs {
            if let Err(e) = self.process_job(job).await {
                error!(job = %job.tryout_uuid, "Try-out job could not be recorded: {}", e);
            }
        }
        Ok(jobs.len())
    }

    // ========================================
    // Expiry and destruction
    // ========================================

    /// Destroy a tenant: drop its namespace, deactivate it and its users
    ///
    /// Succeeds when the namespace is already gone.
    pub async fn destroy_organization(&self, organization_id: i64) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        let organization = organizations::get(&mut conn, organization_id).await?;

        let mut tx = conn.begin().await?;
        drop_namespace(&mut tx, &organization.namespace_id).await?;
        organizations::deactivate(&mut tx, organization.id).await?;
        let deactivated = users::deactivate_by_organization(&mut tx, organization.id).await?;

        if let Some(job) = tryout_jobs::find_by_organization(&mut tx, organization.id).await? {
            if job.status.can_transition_to(TryOutStatus::Destroyed) {
                tryout_jobs::transition(&mut tx, job.id, job.status, TryOutStatus::Destroyed).await?;
            }
        }
        tx.commit().await?;

        info!(
            org_id = organization.id,
            namespace = %organization.namespace_id,
            users = deactivated,
            "Organization destroyed"
        );
        Ok(())
    }

    /// Caller-initiated teardown of their own demo tenant
    pub async fn destroy_try_out(&self, organization_id: i64) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        let organization = organizations::get(&mut conn, organization_id).await?;
        drop(conn);

        if !organization.is_try_out {
            return Err(Error::Forbidden("only try-out environments can be destroyed".to_string()));
        }
        self.destroy_organization(organization.id).await
    }

    /// Destroy every active demo tenant past its expiry
    pub async fn expire_due(&self) -> Result<usize> {
        let expired = {
            let mut conn = self.pool.acquire().await?;
            organizations::list_expired(&mut conn, self.now()).await?
        };

        let mut destroyed = 0;
        for organization in &expired {
            match self.destroy_organization(organization.id).await {
                Ok(()) => destroyed += 1,
                Err(e) => error!(org_id = organization.id, "Expiry failed: {}", e),
            }
        }
        if destroyed > 0 {
            info!(count = destroyed, "Expired try-out environments destroyed");
        }
        Ok(destroyed)
    }

    // ========================================
    // Migrations
    // ========================================

    /// Apply pending tenant migrations to one namespace
    pub async fn migrate_namespace(&self, namespace_id: &str) -> Result<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        self.migrator.migrate(&mut conn, namespace_id).await
    }

    /// Apply pending tenant migrations to every active organization
    ///
    /// Each namespace is all-or-nothing; a failure does not stop the others.
    pub async fn migrate_all(&self) -> Result<MigrationSummary> {
        let organizations = {
            let mut conn = self.pool.acquire().await?;
            organizations::list_active(&mut conn).await?
        };

        let mut summary = MigrationSummary::default();
        for organization in organizations {
            let namespace_id = organization.namespace_id;
            match self.migrate_namespace(&namespace_id).await {
                Ok(applied) => summary.migrated.push((namespace_id, applied)),
                Err(e) => {
                    error!(namespace = %namespace_id, "Tenant migration failed: {}", e);
                    summary.failed.push((namespace_id, e.to_string()));
                }
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_common::db::namespace::is_valid_namespace_id;

    fn profile(email: &str) -> UserProfile {
        UserProfile {
            provider_id: "sub-1".to_string(),
            email: email.to_string(),
            given_name: Some("Ana".to_string()),
            family_name: None,
            picture_url: None,
        }
    }

    #[test]
    fn test_tryout_namespace_id_shape() {
        let uuid = Uuid::parse_str("0b7c3e2a-5d1f-4b7e-9a55-3c2f1e0d9a88").unwrap();
        let id = tryout_namespace_id(&profile("Ana.Silva@example.com"), &uuid);
        assert_eq!(id, "tryout_anasilva_0b7c3e2a5d1f4b7e9a553c2f1e0d9a88");
        assert!(is_valid_namespace_id(&id));
    }

    #[test]
    fn test_tryout_namespace_id_fits_identifier_limit() {
        let uuid = Uuid::new_v4();
        let id = tryout_namespace_id(&profile("a-very-long-local-part-for-someone@example.com"), &uuid);
        assert!(id.len() <= 63, "{}", id);
        assert!(is_valid_namespace_id(&id));
    }

    #[test]
    fn test_migration_summary_success() {
        let mut summary = MigrationSummary::default();
        assert!(summary.is_success());
        summary.failed.push(("org_a".to_string(), "boom".to_string()));
        assert!(!summary.is_success());
    }
}
