//! Database repositories
//!
//! Root-namespace tables (`organizations`, `users`, `tryout_jobs`) are always
//! schema-qualified. Everything else resolves against the tenant namespace
//! the connection is pinned to.

pub mod categories;
pub mod items;
pub mod organizations;
pub mod packagings;
pub mod references;
pub mod stock;
pub mod stock_in;
pub mod stock_out;
pub mod stock_waste;
pub mod stores;
pub mod tryout_jobs;
pub mod units;
pub mod users;
