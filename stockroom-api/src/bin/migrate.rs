//! Migration replay utility
//!
//! **Usage:**
//! ```bash
//! stockroom-migrate [--dry-run] root
//! stockroom-migrate [--dry-run] tenants [--namespace <id>]
//! stockroom-migrate status [--namespace <id>]
//! ```
//!
//! Exits non-zero when any namespace fails.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use stockroom_api::db::organizations;
use stockroom_api::services::{LabelEngine, PdfLabelRenderer, TenantLifecycle};
use stockroom_api::{blob_store, tenant_registry};
use stockroom_common::config::AppConfig;
use stockroom_common::db::{init_database, PoolSettings, RootMigrator, TenantMigrator};
use stockroom_common::time::system_clock;
use tracing::{error, info};

/// Apply root and per-tenant migrations
#[derive(Parser, Debug)]
#[clap(name = "stockroom-migrate")]
#[clap(about = "Replay database migrations across the root catalog and tenant namespaces")]
struct Args {
    /// Log what would run without changing the database
    #[clap(long, global = true, env = "DRY_RUN")]
    dry_run: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending root migrations
    Root,

    /// Apply pending tenant migrations to every active organization
    Tenants {
        /// Only this namespace
        #[clap(long, value_name = "ID")]
        namespace: Option<String>,
    },

    /// Report applied and pending tenant migrations without applying them
    Status {
        /// Only this namespace
        #[clap(long, value_name = "ID")]
        namespace: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Migration failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` when some namespace failed
async fn run(args: Args) -> anyhow::Result<bool> {
    let mut config = AppConfig::from_env()?;
    config.dry_run |= args.dry_run;

    let pool = init_database(&config.database_url, &PoolSettings::from(&config)).await?;
    let clock = system_clock();
    let labels = Arc::new(LabelEngine::new(
        Arc::new(PdfLabelRenderer),
        blob_store(&config),
        clock.clone(),
    ));
    let migrator = Arc::new(TenantMigrator::new(
        Arc::new(tenant_registry(labels)),
        config.per_tenant_migration_path.clone(),
        config.dry_run,
    ));
    let lifecycle = TenantLifecycle::new(pool.clone(), Arc::clone(&migrator), clock, config.tryout_ttl());

    let ok = match args.command {
        Command::Root => {
            let applied = RootMigrator::new(config.migration_path.clone(), config.dry_run)
                .run(&pool)
                .await?;
            info!("{} root migration(s) applied", applied.len());
            true
        }
        Command::Tenants { namespace: Some(namespace) } => {
            let applied = lifecycle.migrate_namespace(&namespace).await?;
            info!(namespace = %namespace, "{} migration(s) applied", applied.len());
            true
        }
        Command::Tenants { namespace: None } => {
            let summary = lifecycle.migrate_all().await?;
            for (namespace, applied) in &summary.migrated {
                info!(namespace = %namespace, "{} migration(s) applied", applied.len());
            }
            for (namespace, reason) in &summary.failed {
                error!(namespace = %namespace, "Failed: {}", reason);
            }
            info!(
                "{} namespace(s) migrated, {} failed",
                summary.migrated.len(),
                summary.failed.len()
            );
            summary.is_success()
        }
        Command::Status { namespace } => {
            let mut conn = pool.acquire().await?;
            let namespaces = match namespace {
                Some(namespace) => vec![namespace],
                None => organizations::list_active(&mut conn)
                    .await?
                    .into_iter()
                    .map(|org| org.namespace_id)
                    .collect(),
            };
            for namespace in namespaces {
                let applied = migrator.applied(&mut conn, &namespace).await?;
                let pending = migrator.pending(&mut conn, &namespace).await?;
                let names: Vec<&str> = pending.iter().map(|step| step.name.as_str()).collect();
                info!(
                    namespace = %namespace,
                    pending = ?names,
                    "{} applied, {} pending",
                    applied.len(),
                    names.len()
                );
            }
            true
        }
    };

    pool.close().await;
    Ok(ok)
}
