//! Google OAuth 2.0 identity provider
//!
//! Authorization-code flow: build the consent URL, exchange the returned code
//! for an access token, then read the OpenID userinfo document.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use stockroom_common::config::GoogleConfig;
use stockroom_common::{Error, Result};
use tracing::{debug, info};

use crate::models::UserProfile;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const SCOPES: &str = "openid email profile";
const USER_AGENT: &str = concat!("stockroom/", env!("CARGO_PKG_VERSION"));

/// Google client errors
#[derive(Debug, thiserror::Error)]
pub enum GoogleError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<GoogleError> for Error {
    fn from(err: GoogleError) -> Self {
        Error::UpstreamUnavailable(format!("identity provider: {}", err))
    }
}

/// External identity provider used by the login flow
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Consent page URL carrying the anti-forgery `state`
    fn authorize_url(&self, state: &str) -> Result<String>;

    /// Trade an authorization code for the user's profile
    async fn exchange(&self, code: &str) -> Result<UserProfile>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct GoogleClient {
    http_client: reqwest::Client,
    config: GoogleConfig,
}

impl GoogleClient {
    pub fn new(config: GoogleConfig) -> std::result::Result<Self, GoogleError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| GoogleError::NetworkError(e.to_string()))?;

        Ok(Self { http_client, config })
    }

    async fn access_token(&self, code: &str) -> std::result::Result<String, GoogleError> {
        let response = self
            .http_client
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| GoogleError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GoogleError::ApiError(status.as_u16(), error_text));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GoogleError::ParseError(e.to_string()))?;
        Ok(token.access_token)
    }

    async fn userinfo(&self, access_token: &str) -> std::result::Result<UserProfile, GoogleError> {
        let response = self
            .http_client
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| GoogleError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GoogleError::ApiError(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| GoogleError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl IdentityProvider for GoogleClient {
    fn authorize_url(&self, state: &str) -> Result<String> {
        let url = Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("access_type", "online"),
                ("prompt", "select_account"),
                ("state", state),
            ],
        )
        .map_err(|e| Error::Internal(format!("authorize URL: {}", e)))?;
        Ok(url.into())
    }

    async fn exchange(&self, code: &str) -> Result<UserProfile> {
        debug!("Exchanging Google authorization code");
        let token = self.access_token(code).await?;
        let profile = self.userinfo(&token).await?;
        info!(email = %profile.email, "Google identity confirmed");
        Ok(profile)
    }
}

/// Provider used when Google credentials are not configured
pub struct DisabledIdentityProvider;

#[async_trait]
impl IdentityProvider for DisabledIdentityProvider {
    fn authorize_url(&self, _state: &str) -> Result<String> {
        Err(Error::UpstreamUnavailable("Google sign-in is not configured".to_string()))
    }

    async fn exchange(&self, _code: &str) -> Result<UserProfile> {
        Err(Error::UpstreamUnavailable("Google sign-in is not configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GoogleClient {
        GoogleClient::new(GoogleConfig {
            client_id: "client-123".to_string(),
            client_secret: "secret".to_string(),
            redirect_url: "http://localhost:8080/auth/google/callback".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_authorize_url_carries_params() {
        let url = client().authorize_url("st@te").unwrap();
        let parsed = Url::parse(&url).unwrap();
        let params: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();

        assert!(url.starts_with(AUTHORIZE_URL));
        assert!(params.contains(&("client_id".to_string(), "client-123".to_string())));
        assert!(params.contains(&("state".to_string(), "st@te".to_string())));
        assert!(params.contains(&("scope".to_string(), SCOPES.to_string())));
        assert!(params.contains(&(
            "redirect_uri".to_string(),
            "http://localhost:8080/auth/google/callback".to_string()
        )));
    }

    #[test]
    fn test_errors_map_to_upstream() {
        let err: Error = GoogleError::ApiError(400, "invalid_grant".to_string()).into();
        assert!(matches!(err, Error::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_disabled_provider() {
        let provider = DisabledIdentityProvider;
        assert!(provider.authorize_url("x").is_err());
        assert!(matches!(
            provider.exchange("code").await,
            Err(Error::UpstreamUnavailable(_))
        ));
    }
}
