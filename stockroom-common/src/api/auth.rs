//! Identity tokens
//!
//! Tokens are compact JWS strings (`header.claims.signature`) signed with
//! HMAC-SHA256 over a shared secret.
//!
//! # Pure Functions
//!
//! This module contains ONLY pure functions. No HTTP framework dependencies;
//! the bearer extraction lives in the service crate.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Fixed header for every token we issue
const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

// ========================================
// Error Types
// ========================================

/// Token validation error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Not three dot-separated base64url segments
    Malformed(String),

    /// Header names an algorithm other than HS256
    UnsupportedAlgorithm(String),

    /// Signature does not match the payload
    InvalidSignature,

    /// `exp` is in the past
    Expired { exp: i64, now: i64 },

    /// Demo organization lifetime has elapsed
    TryOutExpired { expires_at: i64, now: i64 },
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Malformed(reason) => write!(f, "Malformed token: {}", reason),
            TokenError::UnsupportedAlgorithm(alg) => write!(f, "Unsupported algorithm: {}", alg),
            TokenError::InvalidSignature => write!(f, "Invalid token signature"),
            TokenError::Expired { .. } => write!(f, "Token expired"),
            TokenError::TryOutExpired { .. } => write!(f, "Try-out environment expired"),
        }
    }
}

impl std::error::Error for TokenError {}

impl From<TokenError> for crate::Error {
    fn from(err: TokenError) -> Self {
        crate::Error::Unauthorized(err.to_string())
    }
}

// ========================================
// Claims
// ========================================

/// Claims carried by an identity token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub user_email: String,
    #[serde(default)]
    pub user_picture_url: Option<String>,
    #[serde(default)]
    pub user_given_name: Option<String>,
    #[serde(default)]
    pub user_family_name: Option<String>,
    pub user_organization_id: i64,
    /// Namespace id of the user's organization
    pub user_organization_schema: String,
    pub exp: i64,
    pub iat: i64,
    /// Unix seconds; present only for demo users
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tryout_expires_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Header {
    alg: String,
}

// ========================================
// Signing and Verification
// ========================================

/// Encode and sign claims
pub fn issue_token(claims: &Claims, secret: &[u8]) -> crate::Result<String> {
    let payload =
        serde_json::to_vec(claims).map_err(|e| crate::Error::Internal(format!("token claims: {}", e)))?;
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(HEADER),
        URL_SAFE_NO_PAD.encode(payload)
    );

    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|e| crate::Error::Internal(format!("token key: {}", e)))?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{}.{}", signing_input, signature))
}

/// Verify signature and expiry, returning the claims
///
/// `now` is unix seconds. Demo tokens are also rejected once
/// `tryout_expires_at` has passed.
pub fn verify_token(token: &str, secret: &[u8], now: i64) -> Result<Claims, TokenError> {
    let mut parts = token.split('.');
    let (header_b64, claims_b64, sig_b64) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(c), Some(s), None) => (h, c, s),
        _ => return Err(TokenError::Malformed("expected three segments".to_string())),
    };

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|e| TokenError::Malformed(format!("header: {}", e)))?;
    let header: Header = serde_json::from_slice(&header_bytes)
        .map_err(|e| TokenError::Malformed(format!("header: {}", e)))?;
    if header.alg != "HS256" {
        return Err(TokenError::UnsupportedAlgorithm(header.alg));
    }

    let signature = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|e| TokenError::Malformed(format!("signature: {}", e)))?;

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::InvalidSignature)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(claims_b64.as_bytes());
    // Constant-time comparison
    mac.verify_slice(&signature)
        .map_err(|_| TokenError::InvalidSignature)?;

    let claims_bytes = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .map_err(|e| TokenError::Malformed(format!("claims: {}", e)))?;
    let claims: Claims = serde_json::from_slice(&claims_bytes)
        .map_err(|e| TokenError::Malformed(format!("claims: {}", e)))?;

    if claims.exp <= now {
        return Err(TokenError::Expired { exp: claims.exp, now });
    }
    if let Some(expires_at) = claims.tryout_expires_at {
        if expires_at <= now {
            return Err(TokenError::TryOutExpired { expires_at, now });
        }
    }

    Ok(claims)
}

/// Strip the `Bearer ` prefix from an Authorization header value
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    fn claims(exp: i64) -> Claims {
        Claims {
            user_id: 1,
            user_email: "ana@example.com".to_string(),
            user_picture_url: None,
            user_given_name: Some("Ana".to_string()),
            user_family_name: None,
            user_organization_id: 10,
            user_organization_schema: "org_ana".to_string(),
            exp,
            iat: 1_000,
            tryout_expires_at: None,
        }
    }

    #[test]
    fn test_issue_then_verify() {
        let token = issue_token(&claims(5_000), SECRET).unwrap();
        let verified = verify_token(&token, SECRET, 2_000).unwrap();
        assert_eq!(verified, claims(5_000));
    }

    #[test]
    fn test_issued_payload_carries_claims() {
        let token = issue_token(&claims(5_000), b"").unwrap();
        let payload = token.split('.').nth(1).unwrap();
        let decoded: Claims = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        assert_eq!(decoded, claims(5_000));
        assert!(verify_token(&token, b"", 2_000).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_token(&claims(5_000), SECRET).unwrap();
        assert_eq!(
            verify_token(&token, b"other", 2_000),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let token = issue_token(&claims(5_000), SECRET).unwrap();
        let mut forged = claims(5_000);
        forged.user_organization_id = 99;
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let parts: Vec<&str> = token.split('.').collect();
        let tampered = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);
        assert_eq!(
            verify_token(&tampered, SECRET, 2_000),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_expired_rejected() {
        let token = issue_token(&claims(1_500), SECRET).unwrap();
        assert!(matches!(
            verify_token(&token, SECRET, 2_000),
            Err(TokenError::Expired { .. })
        ));
    }

    #[test]
    fn test_tryout_expiry_enforced() {
        let mut c = claims(10_000);
        c.tryout_expires_at = Some(3_000);
        let token = issue_token(&c, SECRET).unwrap();
        assert!(verify_token(&token, SECRET, 2_999).is_ok());
        assert!(matches!(
            verify_token(&token, SECRET, 3_000),
            Err(TokenError::TryOutExpired { .. })
        ));
    }

    #[test]
    fn test_malformed_rejected() {
        assert!(matches!(
            verify_token("abc.def", SECRET, 0),
            Err(TokenError::Malformed(_))
        ));
        assert!(matches!(
            verify_token("a.b.c.d", SECRET, 0),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer"), None);
    }
}
