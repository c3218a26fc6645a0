//! Try-out scheduler
//!
//! One task owns two ticks: drain pending provisioning jobs and sweep expired
//! demo tenants. Work inside a tick runs to completion; a tick that fires
//! while the previous one is still running is delayed, never overlapped.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::tenant_lifecycle::TenantLifecycle;

/// Tick periods of the scheduler
#[derive(Debug, Clone, Copy)]
pub struct WorkerSchedule {
    pub drain_every: Duration,
    pub expire_every: Duration,
}

impl Default for WorkerSchedule {
    fn default() -> Self {
        Self {
            drain_every: Duration::from_secs(30),
            expire_every: Duration::from_secs(60 * 60),
        }
    }
}

/// Run the scheduler until `shutdown` is cancelled
pub async fn run(lifecycle: Arc<TenantLifecycle>, schedule: WorkerSchedule, shutdown: CancellationToken) {
    let mut drain_tick = interval(schedule.drain_every);
    let mut expire_tick = interval(schedule.expire_every);
    drain_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    expire_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        drain_secs = schedule.drain_every.as_secs(),
        expire_secs = schedule.expire_every.as_secs(),
        "Try-out worker started"
    );

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("Try-out worker stopping");
                break;
            }
            _ = drain_tick.tick() => {
                match lifecycle.drain_pending().await {
                    Ok(0) => {}
                    Ok(count) => debug!(count, "Drained try-out jobs"),
                    Err(e) => error!("Try-out drain failed: {}", e),
                }
            }
            _ = expire_tick.tick() => {
                if let Err(e) = lifecycle.expire_due().await {
                    error!("Try-out expiry sweep failed: {}", e);
                }
            }
        }
    }
}

/// Spawn the scheduler on the runtime
pub fn spawn(lifecycle: Arc<TenantLifecycle>, schedule: WorkerSchedule, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(run(lifecycle, schedule, shutdown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_common::db::{init_database_lazy, MigrationRegistry, PoolSettings, TenantMigrator};
    use stockroom_common::time::system_clock;

    #[test]
    fn test_default_schedule() {
        let schedule = WorkerSchedule::default();
        assert_eq!(schedule.drain_every, Duration::from_secs(30));
        assert_eq!(schedule.expire_every, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_worker_stops_on_cancel() {
        let settings = PoolSettings {
            max_connections: 1,
            acquire_timeout: Duration::from_millis(50),
        };
        let pool = init_database_lazy("postgres://nobody@127.0.0.1:1/none", &settings).unwrap();
        let migrator = TenantMigrator::new(Arc::new(MigrationRegistry::new()), "migrations/tenant", true);
        let lifecycle = Arc::new(TenantLifecycle::new(
            pool,
            Arc::new(migrator),
            system_clock(),
            chrono::Duration::hours(24),
        ));

        let shutdown = CancellationToken::new();
        let schedule = WorkerSchedule {
            drain_every: Duration::from_secs(3600),
            expire_every: Duration::from_secs(3600),
        };
        let handle = spawn(lifecycle, schedule, shutdown.clone());
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
