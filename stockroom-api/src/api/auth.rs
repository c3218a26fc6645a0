//! Google sign-in flow
//!
//! `GET /auth/google` hands out the consent URL and sets the flow cookies;
//! the callback logs in an existing user, or starts a demo tenant when the
//! visitor asked for one, and redirects back to the frontend with a token.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use stockroom_common::api::auth::{issue_token, Claims};
use stockroom_common::db::{Organization, User};
use stockroom_common::{uuid_utils, Error};
use tracing::{info, warn};

use super::cookies::{clear_cookie, cookie_value, flow_cookie, FLOW_COOKIE_MAX_AGE, IS_TRY_OUT, OAUTH_STATE};
use crate::db::{organizations, users};
use crate::error::ApiResult;
use crate::models::UserProfile;
use crate::AppState;

const STATE_TOKEN_LEN: usize = 32;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginQuery {
    #[serde(default)]
    pub is_try_out: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub google_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
}

/// Claims for `user` in `organization`
pub fn claims_for(
    user: &User,
    organization: &Organization,
    now: DateTime<Utc>,
    token_ttl: Duration,
) -> Claims {
    let mut exp = now + token_ttl;
    let tryout_expires_at = if organization.is_try_out {
        organization.expires_at.map(|at| {
            exp = exp.min(at);
            at.timestamp()
        })
    } else {
        None
    };

    Claims {
        user_id: user.id,
        user_email: user.email.clone(),
        user_picture_url: user.picture_url.clone(),
        user_given_name: user.given_name.clone(),
        user_family_name: user.family_name.clone(),
        user_organization_id: organization.id,
        user_organization_schema: organization.namespace_id.clone(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
        tryout_expires_at,
    }
}

/// GET /auth/google
pub async fn google_login(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> ApiResult<Response> {
    let oauth_state = uuid_utils::random_token(STATE_TOKEN_LEN);
    let google_url = state.identity.authorize_url(&oauth_state)?;

    let config = &state.config;
    let cookies = AppendHeaders([
        (
            header::SET_COOKIE,
            flow_cookie(OAUTH_STATE, &oauth_state, FLOW_COOKIE_MAX_AGE, config.stage, &config.api_domain),
        ),
        (
            header::SET_COOKIE,
            flow_cookie(
                IS_TRY_OUT,
                if query.is_try_out { "true" } else { "false" },
                FLOW_COOKIE_MAX_AGE,
                config.stage,
                &config.api_domain,
            ),
        ),
    ]);
    Ok((cookies, Json(LoginResponse { google_url })).into_response())
}

/// GET /auth/google/callback
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<Response> {
    if let Some(error) = query.error {
        warn!("Google sign-in cancelled: {}", error);
        return Ok(redirect(&state, &format!("error={}", sanitize(&error))));
    }

    let expected = cookie_value(&headers, OAUTH_STATE)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::InvalidInput("missing OAuth state cookie".to_string()))?;
    if query.state.as_deref() != Some(expected.as_str()) {
        return Err(Error::InvalidInput("OAuth state mismatch".to_string()).into());
    }
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::InvalidInput("missing authorization code".to_string()))?;
    let wants_try_out = cookie_value(&headers, IS_TRY_OUT).as_deref() == Some("true");

    let profile = state.identity.exchange(&code).await?;
    let now = state.clock.now();
    let token_ttl = Duration::hours(state.config.token_ttl_hours);

    if let Some((user, organization)) = returning_member(&state, &profile, now).await? {
        let claims = claims_for(&user, &organization, now, token_ttl);
        let token = issue_token(&claims, state.config.jwt_secret.as_bytes())?;
        info!(user_id = user.id, org_id = organization.id, "User signed in");
        return Ok(redirect(&state, &format!("token={}", token)));
    }

    if wants_try_out {
        let started = state.lifecycle.start_try_out(&profile).await?;
        let claims = claims_for(&started.user, &started.organization, now, token_ttl);
        let token = issue_token(&claims, state.config.jwt_secret.as_bytes())?;
        return Ok(redirect(
            &state,
            &format!("token={}&tryOutUuid={}", token, started.job.tryout_uuid),
        ));
    }

    info!(email = %profile.email, "Sign-in without organization");
    Ok(redirect(&state, "error=no_organization"))
}

/// Active user whose organization is still usable
async fn returning_member(
    state: &AppState,
    profile: &UserProfile,
    now: DateTime<Utc>,
) -> Result<Option<(User, Organization)>, Error> {
    let mut conn = state.db.acquire().await?;
    let Some(user) = users::find_by_email(&mut conn, &profile.email).await? else {
        return Ok(None);
    };
    let Some(organization_id) = user.organization_id.filter(|_| user.is_active) else {
        return Ok(None);
    };
    let Some(organization) = organizations::find(&mut conn, organization_id).await? else {
        return Ok(None);
    };
    if !organization.is_usable_at(now) {
        return Ok(None);
    }

    let user = users::record_login(&mut conn, user.id, profile, now).await?;
    Ok(Some((user, organization)))
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// 302 to the frontend callback, clearing the flow cookies
fn redirect(state: &AppState, query: &str) -> Response {
    let config = &state.config;
    let location = format!("{}/auth/callback?{}", config.frontend_url.trim_end_matches('/'), query);
    (
        StatusCode::FOUND,
        [(header::LOCATION, location)],
        AppendHeaders([
            (header::SET_COOKIE, clear_cookie(OAUTH_STATE, config.stage, &config.api_domain)),
            (header::SET_COOKIE, clear_cookie(IS_TRY_OUT, config.stage, &config.api_domain)),
        ]),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user() -> User {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        User {
            id: 5,
            email: "ana@example.com".to_string(),
            auth_provider_id: Some("sub".to_string()),
            given_name: Some("Ana".to_string()),
            family_name: None,
            picture_url: None,
            organization_id: Some(2),
            is_active: true,
            last_login: None,
            created_at: at,
            updated_at: at,
        }
    }

    fn organization(expires_at: Option<DateTime<Utc>>) -> Organization {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Organization {
            id: 2,
            name: "Acme".to_string(),
            key: "acme".to_string(),
            domain: None,
            namespace_id: "org_acme".to_string(),
            expires_at,
            is_try_out: expires_at.is_some(),
            is_active: true,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_claims_for_regular_member() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let claims = claims_for(&user(), &organization(None), now, Duration::hours(24));

        assert_eq!(claims.user_id, 5);
        assert_eq!(claims.user_organization_id, 2);
        assert_eq!(claims.user_organization_schema, "org_acme");
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
        assert_eq!(claims.tryout_expires_at, None);
    }

    #[test]
    fn test_claims_for_demo_member_capped_at_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let expires = now + Duration::hours(2);
        let claims = claims_for(&user(), &organization(Some(expires)), now, Duration::hours(24));

        assert_eq!(claims.tryout_expires_at, Some(expires.timestamp()));
        assert_eq!(claims.exp, expires.timestamp());
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("access_denied"), "access_denied");
        assert_eq!(sanitize("a&b=c<script>"), "abcscript");
    }
}
