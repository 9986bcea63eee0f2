use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::user::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Register,
    Login,
    PasswordChange,
    ProfileUpdate,
    Create,
    Update,
    Delete,
    Approve,
    Reject,
    WorkerRegister,
    RoleUpdate,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "REGISTER",
            Self::Login => "LOGIN",
            Self::PasswordChange => "PASSWORD_CHANGE",
            Self::ProfileUpdate => "PROFILE_UPDATE",
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Approve => "APPROVE",
            Self::Reject => "REJECT",
            Self::WorkerRegister => "WORKER_REGISTER",
            Self::RoleUpdate => "ROLE_UPDATE",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    User,
    Role,
    PermitRequest,
    PermitApproval,
    Worker,
    MeterReading,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Role => "Role",
            Self::PermitRequest => "PermitRequest",
            Self::PermitApproval => "PermitApproval",
            Self::Worker => "Worker",
            Self::MeterReading => "MeterReading",
        }
    }
}

/// Append-only trail row. Snapshots are stored as JSON text and never read back by the API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub user_id: Option<UserId>,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: None,
            action,
            entity_type,
            entity_id: entity_id.into(),
            old_value: None,
            new_value: None,
            ip_address: None,
            user_agent: None,
            created_at: Utc::now(),
        }
    }

    pub fn by(mut self, user_id: &UserId) -> Self {
        self.user_id = Some(user_id.clone());
        self
    }

    pub fn with_old<T: Serialize>(mut self, value: &T) -> Self {
        self.old_value = serde_json::to_value(value).ok();
        self
    }

    pub fn with_new<T: Serialize>(mut self, value: &T) -> Self {
        self.new_value = serde_json::to_value(value).ok();
        self
    }

    pub fn from_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}
