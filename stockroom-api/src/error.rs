//! HTTP error mapping
//!
//! Every failure leaving a handler goes through [`ApiError`]. The body is the
//! shared `{error, code, referencingEntities?}` shape.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use stockroom_common::api::types::ErrorResponse;
use stockroom_common::Error;
use thiserror::Error;
use tracing::{error, warn};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Typed service error
    #[error(transparent)]
    Common(#[from] Error),

    /// Malformed request that never reached a service
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Common(Error::Unauthorized(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Common(err) => status_for(err),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Status code for each error kind
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        Error::Forbidden(_) => StatusCode::FORBIDDEN,
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::ReferencedByOthers { .. }
        | Error::BreakdownMismatch(_)
        | Error::InsufficientStock(_)
        | Error::ConflictingState(_) => StatusCode::CONFLICT,
        Error::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
        Error::PoolExhausted => StatusCode::SERVICE_UNAVAILABLE,
        Error::Ean8GenerationFailed(_)
        | Error::NamespaceNotFound(_)
        | Error::Database(_)
        | Error::Io(_)
        | Error::Config(_)
        | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match self {
            ApiError::Common(Error::ReferencedByOthers {
                message,
                referencing,
            }) => ErrorResponse::new("REFERENCED_BY_OTHERS", message).with_referencing(referencing),
            ApiError::Common(err) => {
                if status.is_server_error() {
                    error!(code = err.code(), "Request failed: {}", err);
                    // Storage details stay in the log
                    ErrorResponse::new(err.code(), public_message(&err))
                } else {
                    ErrorResponse::new(err.code(), err.to_string())
                }
            }
            ApiError::BadRequest(msg) => {
                warn!("Bad request: {}", msg);
                ErrorResponse::new("INVALID_INPUT", msg)
            }
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                ErrorResponse::new("INTERNAL_ERROR", "Internal server error")
            }
        };

        (status, Json(body)).into_response()
    }
}

fn public_message(err: &Error) -> String {
    match err {
        Error::UpstreamUnavailable(_) | Error::PoolExhausted | Error::Ean8GenerationFailed(_) => {
            err.to_string()
        }
        _ => "Internal server error".to_string(),
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (Error::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (Error::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (Error::UnprocessableEntity("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (Error::BreakdownMismatch("x".into()), StatusCode::CONFLICT),
            (Error::InsufficientStock("x".into()), StatusCode::CONFLICT),
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::ConflictingState("x".into()), StatusCode::CONFLICT),
            (Error::UpstreamUnavailable("x".into()), StatusCode::BAD_GATEWAY),
            (Error::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(status_for(&err), expected, "{:?}", err);
        }
    }

    #[tokio::test]
    async fn test_referencing_rows_in_body() {
        let err = ApiError::from(Error::ReferencedByOthers {
            message: "category 4 is referenced by tb_item".to_string(),
            referencing: vec![serde_json::json!({"id": 9, "description": "Rice"})],
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = body_json(response).await;
        assert_eq!(body["code"], "REFERENCED_BY_OTHERS");
        assert_eq!(body["referencingEntities"][0]["id"], 9);
    }

    #[tokio::test]
    async fn test_database_details_hidden() {
        let response = ApiError::from(Error::Database(sqlx::Error::PoolClosed)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["code"], "DATABASE_ERROR");
        assert_eq!(body["error"], "Internal server error");
    }
}
