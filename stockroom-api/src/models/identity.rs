//! Identity as reported by the external provider

use serde::{Deserialize, Serialize};

/// Profile returned by the identity provider after a successful login
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Provider-side subject id
    #[serde(rename = "sub")]
    pub provider_id: String,
    pub email: String,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default, rename = "picture")]
    pub picture_url: Option<String>,
}

impl UserProfile {
    /// Lowercase alphanumerics of the email local part, at most `max_len`
    pub fn namespace_token(&self, max_len: usize) -> String {
        let local = self.email.split('@').next().unwrap_or_default();
        let token: String = local
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .take(max_len)
            .collect();
        if token.is_empty() {
            "user".to_string()
        } else {
            token
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(email: &str) -> UserProfile {
        UserProfile {
            provider_id: "1234".to_string(),
            email: email.to_string(),
            given_name: None,
            family_name: None,
            picture_url: None,
        }
    }

    #[test]
    fn test_namespace_token() {
        assert_eq!(profile("Ana.Silva+demo@example.com").namespace_token(16), "anasilvademo");
        assert_eq!(profile("averyveryverylongname@example.com").namespace_token(8), "averyver");
        assert_eq!(profile("..@example.com").namespace_token(16), "user");
    }

    #[test]
    fn test_google_userinfo_shape() {
        let p: UserProfile = serde_json::from_str(
            r#"{"sub":"42","email":"a@b.c","given_name":"A","picture":"https://x/p.png"}"#,
        )
        .unwrap();
        assert_eq!(p.provider_id, "42");
        assert_eq!(p.picture_url.as_deref(), Some("https://x/p.png"));
        assert!(p.family_name.is_none());
    }
}
