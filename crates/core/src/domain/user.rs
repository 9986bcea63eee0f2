use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::role::RoleName;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub role: RoleName,
    pub requested_role: Option<RoleName>,
    pub is_active: bool,
    pub is_approved: bool,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim()).trim().to_string()
    }
}

/// Account state derived from the role a registrant asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistrationPlan {
    pub role: RoleName,
    pub requested_role: Option<RoleName>,
    pub is_approved: bool,
}

impl RegistrationPlan {
    pub fn for_requested(requested: Option<RoleName>) -> Self {
        let requested = requested.unwrap_or(RoleName::DEFAULT);
        if requested.requires_approval() {
            Self { role: RoleName::DEFAULT, requested_role: Some(requested), is_approved: false }
        } else {
            Self { role: requested, requested_role: None, is_approved: true }
        }
    }
}

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Minimal shape check; delivery-level verification goes through the OTP flow.
pub fn is_plausible_email(raw: &str) -> bool {
    let trimmed = raw.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !trimmed.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub role: Option<RoleName>,
    pub is_active: Option<bool>,
    pub is_approved: Option<bool>,
    pub search: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    pub pending_approval: i64,
    pub by_role: Vec<RoleCount>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCount {
    pub role: RoleName,
    pub count: i64,
}
