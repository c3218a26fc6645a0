//! Shared root-namespace models
//!
//! Rows in these tables are visible to every tenant; tenant content lives in
//! per-namespace tables owned by the service crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Tenant
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub key: String,
    pub domain: Option<String>,
    pub namespace_id: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_try_out: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    /// Active and, for demo tenants, not yet past `expires_at`
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map_or(true, |exp| exp > now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub auth_provider_id: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture_url: Option<String>,
    pub organization_id: Option<i64>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Provisioning state of a demo tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TryOutStatus {
    Pending,
    InProgress,
    Created,
    Failed,
    Destroyed,
}

impl TryOutStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TryOutStatus::Pending => "pending",
            TryOutStatus::InProgress => "in_progress",
            TryOutStatus::Created => "created",
            TryOutStatus::Failed => "failed",
            TryOutStatus::Destroyed => "destroyed",
        }
    }

    /// Whether `self -> next` is a legal job transition
    pub fn can_transition_to(self, next: TryOutStatus) -> bool {
        use TryOutStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, InProgress)
                | (InProgress, Created)
                | (InProgress, Failed)
                | (Created, Destroyed)
                | (Failed, Destroyed)
        )
    }
}

impl std::fmt::Display for TryOutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TryOutJob {
    pub id: i64,
    pub tryout_uuid: Uuid,
    pub created_by: i64,
    pub organization_id: i64,
    pub status: TryOutStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TenantMigrationLog {
    pub namespace_id: String,
    pub script_name: String,
    pub applied_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org(is_active: bool, expires_at: Option<DateTime<Utc>>) -> Organization {
        let now = Utc::now();
        Organization {
            id: 1,
            name: "Acme".to_string(),
            key: "acme".to_string(),
            domain: None,
            namespace_id: "org_acme".to_string(),
            expires_at,
            is_try_out: expires_at.is_some(),
            is_active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_usable_organization() {
        let now = Utc::now();
        assert!(org(true, None).is_usable_at(now));
        assert!(org(true, Some(now + chrono::Duration::hours(1))).is_usable_at(now));
        assert!(!org(true, Some(now - chrono::Duration::seconds(1))).is_usable_at(now));
        assert!(!org(false, None).is_usable_at(now));
    }

    #[test]
    fn test_job_transitions() {
        use TryOutStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Created));
        assert!(InProgress.can_transition_to(Failed));
        assert!(Created.can_transition_to(Destroyed));
        assert!(!Pending.can_transition_to(Created));
        assert!(!Destroyed.can_transition_to(Pending));
        assert!(!Created.can_transition_to(InProgress));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TryOutStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}
