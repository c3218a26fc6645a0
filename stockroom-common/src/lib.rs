//! # Stockroom Common Library
//!
//! Shared code for the Stockroom inventory backend:
//! - Error taxonomy
//! - Configuration loading
//! - Namespace adapter (pooled connections pinned to a tenant schema)
//! - Root and per-tenant migrations
//! - Identity tokens
//! - EAN helpers and pagination

pub mod api;
pub mod config;
pub mod db;
pub mod ean;
pub mod error;
pub mod pagination;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
