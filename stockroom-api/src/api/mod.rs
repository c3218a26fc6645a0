//! HTTP API handlers for stockroom-api

pub mod auth;
pub mod blobs;
pub mod catalog;
pub mod context;
pub mod cookies;
pub mod health;
pub mod packaging;
pub mod stock;
pub mod stores;
pub mod tryout;
pub mod users;

pub use context::{identity_middleware, store_middleware, tenant_middleware, Identity, StoreScope, TenantContext};
pub use health::health_routes;
