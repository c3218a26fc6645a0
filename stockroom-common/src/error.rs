//! Common error types for Stockroom
//!
//! Services return these typed errors; only the HTTP adapter in
//! `stockroom-api` turns them into status codes.

use serde_json::Value;
use thiserror::Error;

/// Common result type for Stockroom operations
pub type Result<T> = std::result::Result<T, Error>;

/// Postgres SQLSTATE for foreign-key violations
pub const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

/// Postgres SQLSTATE for unique-constraint violations
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// Postgres SQLSTATE for an unknown schema
pub const PG_INVALID_SCHEMA_NAME: &str = "3F000";

/// Common error types across the Stockroom crates
#[derive(Error, Debug)]
pub enum Error {
    /// Missing, invalid or expired identity; inactive user or tenant
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Identity is valid but may not touch the requested resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request body unparseable or a required header is missing
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Payload parsed but violates a semantic constraint
    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Delete blocked by a foreign key; carries the referencing rows
    #[error("Referenced by others: {message}")]
    ReferencedByOthers {
        message: String,
        referencing: Vec<Value>,
    },

    /// Stock-out packaging breakdown does not add up to the item total
    #[error("Breakdown mismatch: {0}")]
    BreakdownMismatch(String),

    /// Finalizing would drive an item's stock below zero
    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    /// Operation not allowed in the entity's current state
    #[error("Conflicting state: {0}")]
    ConflictingState(String),

    /// Fewer than seven decimal digits in the packaging hash
    #[error("EAN-8 generation failed for input {0:?}")]
    Ean8GenerationFailed(String),

    /// Blob store or identity provider failure
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Tenant namespace does not exist in the store
    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    /// No pooled connection became available before the deadline
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Error::PoolExhausted,
            sqlx::Error::RowNotFound => Error::NotFound("row not found".to_string()),
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some(PG_UNIQUE_VIOLATION) => {
                Error::ConflictingState(db.message().to_string())
            }
            other => Error::Database(other),
        }
    }
}

impl Error {
    /// Stable machine-readable code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::UnprocessableEntity(_) => "UNPROCESSABLE_ENTITY",
            Error::NotFound(_) => "NOT_FOUND",
            Error::ReferencedByOthers { .. } => "REFERENCED_BY_OTHERS",
            Error::BreakdownMismatch(_) => "BREAKDOWN_MISMATCH",
            Error::InsufficientStock(_) => "INSUFFICIENT_STOCK",
            Error::ConflictingState(_) => "CONFLICTING_STATE",
            Error::Ean8GenerationFailed(_) => "EAN8_GENERATION_FAILED",
            Error::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            Error::NamespaceNotFound(_) => "NAMESPACE_NOT_FOUND",
            Error::PoolExhausted => "POOL_EXHAUSTED",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Foreign-key violation details, when this is one
    ///
    /// Returns `(referencing_table, constraint_name)` as reported by Postgres.
    pub fn foreign_key_violation(err: &sqlx::Error) -> Option<(String, String)> {
        match err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(PG_FOREIGN_KEY_VIOLATION) => {
                let table = db.table()?.to_string();
                let constraint = db.constraint()?.to_string();
                Some((table, constraint))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_maps_to_pool_exhausted() {
        let err: Error = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, Error::PoolExhausted));
        assert_eq!(err.code(), "POOL_EXHAUSTED");
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_other_sqlx_errors_stay_database() {
        let err: Error = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, Error::Database(_)));
        assert!(Error::foreign_key_violation(&sqlx::Error::PoolClosed).is_none());
    }

    #[test]
    fn test_referenced_by_others_display() {
        let err = Error::ReferencedByOthers {
            message: "category 3 is in use".to_string(),
            referencing: vec![serde_json::json!({"id": 7})],
        };
        assert_eq!(err.to_string(), "Referenced by others: category 3 is in use");
        assert_eq!(err.code(), "REFERENCED_BY_OTHERS");
    }
}
