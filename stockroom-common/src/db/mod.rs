//! Database access: pool, namespace adapter, migrations, root models

pub mod init;
pub mod migrations;
pub mod models;
pub mod namespace;

pub use init::{init_database, init_database_lazy, PoolSettings};
pub use migrations::{ImperativeMigration, MigrationRegistry, RootMigrator, TenantMigrator};
pub use models::*;
pub use namespace::{LeasedConnection, ROOT_NAMESPACE};
