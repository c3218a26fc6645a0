//! API module for shared HTTP-facing functionality
//!
//! This module contains ONLY:
//! - Pure functions (no HTTP framework dependencies)
//! - Shared wire types
//!
//! The service crate wraps these with Axum extractors and middleware.

pub mod auth;
pub mod types;

pub use auth::{bearer_token, issue_token, verify_token, Claims, TokenError};
pub use types::ErrorResponse;
