//! Request pipeline
//!
//! Route groups compose these middlewares outermost first:
//! 1. `identity_middleware`: bearer token to [`Identity`]
//! 2. `tenant_middleware`: active organization, leased connection pinned to
//!    its namespace, exposed as [`TenantContext`]
//! 3. `store_middleware`: `X-Store-ID` checked against the tenant, exposed
//!    as [`StoreScope`]
//!
//! The leased connection lives in the request extensions and goes back to
//! the pool when the request (or its timed-out future) is dropped.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use stockroom_common::api::auth::{bearer_token, verify_token, Claims};
use stockroom_common::db::{namespace, LeasedConnection, Organization};
use stockroom_common::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::db::{organizations, stores, users};
use crate::error::ApiError;
use crate::AppState;

/// Header naming the store a request operates on
pub const STORE_HEADER: &str = "x-store-id";

// ========================================
// Identity
// ========================================

/// Verified token claims of the caller
#[derive(Debug, Clone)]
pub struct Identity(pub Claims);

impl Identity {
    pub fn user_id(&self) -> i64 {
        self.0.user_id
    }

    pub fn organization_id(&self) -> i64 {
        self.0.user_organization_id
    }
}

/// Claims from the `Authorization` header, verified against `secret`
pub fn authenticate(headers: &HeaderMap, secret: &[u8], now_secs: i64) -> Result<Claims, Error> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Unauthorized("missing Authorization header".to_string()))?;
    let token =
        bearer_token(header).ok_or_else(|| Error::Unauthorized("expected a bearer token".to_string()))?;
    Ok(verify_token(token, secret, now_secs)?)
}

pub async fn identity_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let now = state.clock.now().timestamp();
    let claims = authenticate(request.headers(), state.config.jwt_secret.as_bytes(), now).map_err(|e| {
        debug!("Rejected credentials: {}", e);
        ApiError::from(e)
    })?;

    request.extensions_mut().insert(Identity(claims));
    Ok(next.run(request).await)
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("not authenticated"))
    }
}

// ========================================
// Tenant
// ========================================

/// Caller's organization and a connection pinned to its namespace
#[derive(Clone)]
pub struct TenantContext {
    pub organization: Arc<Organization>,
    pub claims: Arc<Claims>,
    conn: Arc<Mutex<LeasedConnection>>,
}

impl TenantContext {
    pub fn user_id(&self) -> i64 {
        self.claims.user_id
    }

    pub fn namespace_id(&self) -> &str {
        &self.organization.namespace_id
    }

    /// Exclusive use of the pinned connection
    pub async fn conn(&self) -> MutexGuard<'_, LeasedConnection> {
        self.conn.lock().await
    }
}

pub async fn tenant_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = request
        .extensions()
        .get::<Identity>()
        .map(|identity| identity.0.clone())
        .ok_or_else(|| ApiError::unauthorized("not authenticated"))?;

    let mut conn = namespace::acquire(&state.db).await?;

    let organization = organizations::find(&mut conn, claims.user_organization_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("unknown organization"))?;
    if !organization.is_usable_at(state.clock.now()) {
        return Err(ApiError::unauthorized("organization is inactive or expired"));
    }
    if organization.namespace_id != claims.user_organization_schema {
        warn!(
            org_id = organization.id,
            "Token namespace does not match organization"
        );
        return Err(ApiError::unauthorized("token does not match organization"));
    }

    let user = users::get(&mut conn, claims.user_id).await.map_err(|e| match e {
        Error::NotFound(_) => ApiError::unauthorized("unknown user"),
        other => other.into(),
    })?;
    if !user.is_active || user.organization_id != Some(organization.id) {
        return Err(ApiError::unauthorized("user is inactive"));
    }

    match namespace::pin(&mut conn, &organization.namespace_id).await {
        Ok(()) => {}
        Err(Error::NamespaceNotFound(ns)) => {
            debug!(namespace = %ns, "Namespace not provisioned yet");
            return Err(ApiError::unauthorized("organization environment is not ready"));
        }
        Err(e) => return Err(e.into()),
    }

    request.extensions_mut().insert(TenantContext {
        organization: Arc::new(organization),
        claims: Arc::new(claims),
        conn: Arc::new(Mutex::new(conn)),
    });
    Ok(next.run(request).await)
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for TenantContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .cloned()
            .ok_or_else(|| ApiError::Internal("tenant context missing on route".to_string()))
    }
}

// ========================================
// Store
// ========================================

/// Store the request operates on, verified to belong to the tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreScope(pub i64);

/// Parse the `X-Store-ID` header
pub fn store_id_from(headers: &HeaderMap) -> Result<i64, Error> {
    let raw = headers
        .get(STORE_HEADER)
        .ok_or_else(|| Error::InvalidInput("missing X-Store-ID header".to_string()))?;
    raw.to_str()
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| Error::InvalidInput("X-Store-ID must be a positive integer".to_string()))
}

pub async fn store_middleware(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let store_id = store_id_from(request.headers())?;
    let tenant = request
        .extensions()
        .get::<TenantContext>()
        .cloned()
        .ok_or_else(|| ApiError::Internal("tenant context missing on route".to_string()))?;

    let known = {
        let mut conn = tenant.conn().await;
        stores::exists(&mut conn, store_id).await?
    };
    if !known {
        return Err(Error::Forbidden(format!(
            "store {} does not belong to this organization",
            store_id
        ))
        .into());
    }

    request.extensions_mut().insert(StoreScope(store_id));
    Ok(next.run(request).await)
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for StoreScope {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<StoreScope>()
            .copied()
            .ok_or_else(|| ApiError::Internal("store scope missing on route".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use stockroom_common::api::auth::issue_token;

    fn claims(exp: i64) -> Claims {
        Claims {
            user_id: 7,
            user_email: "ana@example.com".to_string(),
            user_picture_url: None,
            user_given_name: Some("Ana".to_string()),
            user_family_name: None,
            user_organization_id: 3,
            user_organization_schema: "org_acme".to_string(),
            exp,
            iat: 1_000,
            tryout_expires_at: None,
        }
    }

    #[test]
    fn test_authenticate_accepts_valid_token() {
        let token = issue_token(&claims(2_000), b"secret").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );

        let verified = authenticate(&headers, b"secret", 1_500).unwrap();
        assert_eq!(verified.user_id, 7);
        assert_eq!(verified.user_organization_schema, "org_acme");
    }

    #[test]
    fn test_authenticate_rejects() {
        let token = issue_token(&claims(2_000), b"secret").unwrap();
        let mut headers = HeaderMap::new();
        assert!(matches!(
            authenticate(&headers, b"secret", 1_500),
            Err(Error::Unauthorized(_))
        ));

        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        // wrong secret
        assert!(matches!(
            authenticate(&headers, b"other", 1_500),
            Err(Error::Unauthorized(_))
        ));
        // expired
        assert!(matches!(
            authenticate(&headers, b"secret", 2_001),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_store_id_from_header() {
        let mut headers = HeaderMap::new();
        assert!(matches!(store_id_from(&headers), Err(Error::InvalidInput(_))));

        headers.insert(STORE_HEADER, HeaderValue::from_static("abc"));
        assert!(matches!(store_id_from(&headers), Err(Error::InvalidInput(_))));

        headers.insert(STORE_HEADER, HeaderValue::from_static("0"));
        assert!(matches!(store_id_from(&headers), Err(Error::InvalidInput(_))));

        headers.insert(STORE_HEADER, HeaderValue::from_static(" 12 "));
        assert_eq!(store_id_from(&headers).unwrap(), 12);
    }
}
