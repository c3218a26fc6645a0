//! Schema migrations
//!
//! Two migration sets exist:
//!
//! - **Root** scripts (`MIGRATION_PATH`) shape the shared catalog and are
//!   tracked in `tb_migration_log`.
//! - **Per-tenant** scripts (`PER_TENANT_MIGRATION_PATH`) shape every tenant
//!   namespace and are tracked per namespace in `tb_tenant_migration_log`.
//!
//! A per-tenant step is identified by its file stem (`00004_create_item`).
//! Imperative steps register under the same naming pattern and are merged
//! with the scripts in lexical order. A stem that has both a script and an
//! imperative step runs the script first.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify applied migrations** - add a new one instead
//! 2. **Keep steps idempotent** - `IF NOT EXISTS` / existence checks before DDL
//! 3. **Per-tenant scripts use unqualified names** - the runner pins the
//!    transaction to the tenant namespace

use crate::db::namespace;
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::{Connection, PgConnection, PgPool};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Imperative migration step run inside the tenant's migration transaction
#[async_trait]
pub trait ImperativeMigration: Send + Sync {
    /// `conn` is inside a transaction pinned to `namespace_id`
    async fn run(&self, conn: &mut PgConnection, namespace_id: &str) -> Result<()>;
}

/// One entry of a migration plan
#[derive(Clone)]
pub struct MigrationStep {
    pub name: String,
    pub script: Option<PathBuf>,
    pub imperative: Option<Arc<dyn ImperativeMigration>>,
}

impl std::fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationStep")
            .field("name", &self.name)
            .field("script", &self.script)
            .field("imperative", &self.imperative.is_some())
            .finish()
    }
}

/// Registry of imperative per-tenant steps
#[derive(Default, Clone)]
pub struct MigrationRegistry {
    imperative: BTreeMap<String, Arc<dyn ImperativeMigration>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an imperative step under `name` (same pattern as file stems)
    pub fn register(&mut self, name: impl Into<String>, step: Arc<dyn ImperativeMigration>) {
        let name = name.into();
        if self.imperative.insert(name.clone(), step).is_some() {
            warn!("Imperative migration {} registered twice; keeping the last", name);
        }
    }

    pub fn imperative_names(&self) -> impl Iterator<Item = &str> {
        self.imperative.keys().map(String::as_str)
    }

    /// Merge scripts found in `dir` with registered steps, ordered by name
    pub fn plan(&self, dir: &Path) -> Result<Vec<MigrationStep>> {
        let mut steps: BTreeMap<String, MigrationStep> = BTreeMap::new();

        for script in list_scripts(dir)? {
            let name = script_name(&script)?;
            steps.insert(
                name.clone(),
                MigrationStep {
                    name,
                    script: Some(script),
                    imperative: None,
                },
            );
        }

        for (name, step) in &self.imperative {
            steps
                .entry(name.clone())
                .or_insert_with(|| MigrationStep {
                    name: name.clone(),
                    script: None,
                    imperative: None,
                })
                .imperative = Some(Arc::clone(step));
        }

        Ok(steps.into_values().collect())
    }
}

/// Every `*.sql` file directly under `dir`, sorted lexically
pub fn list_scripts(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::Config(format!(
            "Migration directory not found: {}",
            dir.display()
        )));
    }

    let mut scripts = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("sql") {
            scripts.push(path);
        }
    }
    scripts.sort();
    Ok(scripts)
}

fn script_name(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Config(format!("Bad migration file name: {}", path.display())))
}

async fn ensure_log_tables(conn: &mut PgConnection) -> Result<()> {
    sqlx::Executor::execute(
        &mut *conn,
        sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS public.tb_migration_log (
            script_name TEXT PRIMARY KEY,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE TABLE IF NOT EXISTS public.tb_tenant_migration_log (
            namespace_id TEXT NOT NULL,
            script_name TEXT NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (namespace_id, script_name)
        );
        "#,
        ),
    )
    .await?;
    Ok(())
}

// ============================================================================
// Root migrations
// ============================================================================

/// Applies the shared-catalog scripts
pub struct RootMigrator {
    dir: PathBuf,
    dry_run: bool,
}

impl RootMigrator {
    pub fn new(dir: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            dir: dir.into(),
            dry_run,
        }
    }

    /// Apply every pending root script, each in its own transaction
    pub async fn run(&self, pool: &PgPool) -> Result<Vec<String>> {
        let mut conn = pool.acquire().await?;
        ensure_log_tables(&mut conn).await?;

        let applied: HashSet<String> =
            sqlx::query_scalar("SELECT script_name FROM public.tb_migration_log")
                .fetch_all(&mut *conn)
                .await?
                .into_iter()
                .collect();

        let mut newly_applied = Vec::new();
        for script in list_scripts(&self.dir)? {
            let name = script_name(&script)?;
            if applied.contains(&name) {
                continue;
            }

            if self.dry_run {
                info!("[dry run] would apply root migration {}", name);
                newly_applied.push(name);
                continue;
            }

            let sql = std::fs::read_to_string(&script)?;
            let mut tx = conn.begin().await?;
            sqlx::raw_sql(&sql).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO public.tb_migration_log (script_name) VALUES ($1)")
                .bind(&name)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            info!("✓ Root migration {} applied", name);
            newly_applied.push(name);
        }

        if newly_applied.is_empty() {
            info!("Root schema is up to date");
        }
        Ok(newly_applied)
    }
}

// ============================================================================
// Per-tenant migrations
// ============================================================================

/// Applies the per-tenant set to one namespace at a time
#[derive(Clone)]
pub struct TenantMigrator {
    registry: Arc<MigrationRegistry>,
    dir: PathBuf,
    dry_run: bool,
}

impl TenantMigrator {
    pub fn new(registry: Arc<MigrationRegistry>, dir: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            registry,
            dir: dir.into(),
            dry_run,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Full per-tenant plan in application order
    pub fn plan(&self) -> Result<Vec<MigrationStep>> {
        self.registry.plan(&self.dir)
    }

    /// Script names already applied to `namespace_id`
    pub async fn applied(&self, conn: &mut PgConnection, namespace_id: &str) -> Result<HashSet<String>> {
        ensure_log_tables(conn).await?;
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT script_name FROM public.tb_tenant_migration_log WHERE namespace_id = $1",
        )
        .bind(namespace_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(names.into_iter().collect())
    }

    /// Steps of the plan not yet applied to `namespace_id`
    pub async fn pending(&self, conn: &mut PgConnection, namespace_id: &str) -> Result<Vec<MigrationStep>> {
        let applied = self.applied(conn, namespace_id).await?;
        Ok(self
            .plan()?
            .into_iter()
            .filter(|step| !applied.contains(&step.name))
            .collect())
    }

    /// Apply pending steps inside the caller's transaction
    ///
    /// `tx` must be an open transaction; the namespace pin is transaction
    /// local and each applied step is logged in the same transaction, so
    /// the caller's commit or rollback covers everything.
    pub async fn apply_in_transaction(&self, tx: &mut PgConnection, namespace_id: &str) -> Result<Vec<String>> {
        let pending = self.pending(tx, namespace_id).await?;
        namespace::pin_local(tx, namespace_id).await?;

        let mut names = Vec::with_capacity(pending.len());
        for step in pending {
            if self.dry_run {
                info!(namespace = %namespace_id, "[dry run] would apply tenant migration {}", step.name);
                names.push(step.name);
                continue;
            }

            if let Some(script) = &step.script {
                let sql = std::fs::read_to_string(script)?;
                sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(&sql)).await?;
            }
            if let Some(imperative) = &step.imperative {
                imperative.run(tx, namespace_id).await?;
            }

            sqlx::query(
                "INSERT INTO public.tb_tenant_migration_log (namespace_id, script_name) VALUES ($1, $2)",
            )
            .bind(namespace_id)
            .bind(&step.name)
            .execute(&mut *tx)
            .await?;

            info!(namespace = %namespace_id, "✓ Tenant migration {} applied", step.name);
            names.push(step.name);
        }
        Ok(names)
    }

    /// Apply pending steps to an existing namespace, all-or-nothing
    pub async fn migrate(&self, conn: &mut PgConnection, namespace_id: &str) -> Result<Vec<String>> {
        let mut tx = conn.begin().await?;
        let names = self.apply_in_transaction(&mut tx, namespace_id).await?;
        tx.commit().await?;
        Ok(names)
    }
}

/// Create a tenant namespace if missing (caller's transaction)
pub async fn create_namespace(conn: &mut PgConnection, namespace_id: &str) -> Result<()> {
    let quoted = namespace::quote_ident(namespace_id)?;
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quoted))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Drop a tenant namespace and everything in it (caller's transaction)
///
/// Dropping a namespace that no longer exists is a no-op.
pub async fn drop_namespace(conn: &mut PgConnection, namespace_id: &str) -> Result<()> {
    let quoted = namespace::quote_ident(namespace_id)?;
    sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", quoted))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl ImperativeMigration for Noop {
        async fn run(&self, _conn: &mut PgConnection, _namespace_id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn write(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), "SELECT 1;").unwrap();
    }

    #[test]
    fn test_plan_orders_scripts_lexically() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "00010_create_stock_in.sql");
        write(dir.path(), "00002_create_category.sql");
        write(dir.path(), "00001_create_store.sql");
        std::fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let plan = MigrationRegistry::new().plan(dir.path()).unwrap();
        let names: Vec<&str> = plan.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["00001_create_store", "00002_create_category", "00010_create_stock_in"]
        );
    }

    #[test]
    fn test_plan_merges_imperative_steps() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "00001_create_store.sql");
        write(dir.path(), "00003_create_item.sql");

        let mut registry = MigrationRegistry::new();
        registry.register("00002_seed_units", Arc::new(Noop));
        registry.register("00003_create_item", Arc::new(Noop));

        let plan = registry.plan(dir.path()).unwrap();
        let names: Vec<&str> = plan.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["00001_create_store", "00002_seed_units", "00003_create_item"]);

        assert!(plan[1].script.is_none() && plan[1].imperative.is_some());
        assert!(plan[2].script.is_some() && plan[2].imperative.is_some());
    }

    #[test]
    fn test_missing_directory_is_config_error() {
        let result = list_scripts(Path::new("/definitely/not/here"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
