//! OAuth flow cookies

use axum::http::{header, HeaderMap};
use stockroom_common::config::Stage;

pub const OAUTH_STATE: &str = "oauthstate";
pub const IS_TRY_OUT: &str = "isTryOut";

/// Lifetime of the OAuth flow cookies
pub const FLOW_COOKIE_MAX_AGE: i64 = 60 * 60;

/// `Set-Cookie` value for one flow cookie
///
/// Production cookies are cross-site: `SameSite=None; Secure; HttpOnly`
/// scoped to the API domain.
pub fn flow_cookie(name: &str, value: &str, max_age: i64, stage: Stage, api_domain: &str) -> String {
    let mut cookie = format!("{}={}; Max-Age={}; Path=/", name, value, max_age);
    if stage.is_prod() {
        cookie.push_str("; SameSite=None; Secure; HttpOnly");
        if !api_domain.is_empty() {
            cookie.push_str("; Domain=");
            cookie.push_str(api_domain);
        }
    }
    cookie
}

/// Expire a flow cookie
pub fn clear_cookie(name: &str, stage: Stage, api_domain: &str) -> String {
    flow_cookie(name, "", 0, stage, api_domain)
}

/// Value of cookie `name` from the request's `Cookie` headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_dev_cookie_uses_defaults() {
        let cookie = flow_cookie(OAUTH_STATE, "abc", 3600, Stage::Dev, "api.example.com");
        assert_eq!(cookie, "oauthstate=abc; Max-Age=3600; Path=/");
    }

    #[test]
    fn test_prod_cookie_is_cross_site() {
        let cookie = flow_cookie(IS_TRY_OUT, "true", 3600, Stage::Prod, "api.example.com");
        assert_eq!(
            cookie,
            "isTryOut=true; Max-Age=3600; Path=/; SameSite=None; Secure; HttpOnly; Domain=api.example.com"
        );
    }

    #[test]
    fn test_cookie_value() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1; oauthstate=xyz"));
        headers.append(header::COOKIE, HeaderValue::from_static("isTryOut=true"));

        assert_eq!(cookie_value(&headers, OAUTH_STATE).as_deref(), Some("xyz"));
        assert_eq!(cookie_value(&headers, IS_TRY_OUT).as_deref(), Some("true"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_clear_cookie() {
        assert!(clear_cookie(OAUTH_STATE, Stage::Dev, "").starts_with("oauthstate=; Max-Age=0"));
    }
}
