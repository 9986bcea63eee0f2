use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::permit::{PermitId, PermitStatus};
use crate::domain::role::RoleName;
use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalId(pub String);

impl ApprovalId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for ApprovalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Pending,
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "APPROVED" | "APPROVE" => Some(Self::Approved),
            "REJECTED" | "REJECT" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Permit status that mirrors this decision once recorded.
    pub fn as_permit_status(&self) -> PermitStatus {
        match self {
            Self::Pending => PermitStatus::Pending,
            Self::Approved => PermitStatus::Approved,
            Self::Rejected => PermitStatus::Rejected,
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitApproval {
    pub id: ApprovalId,
    pub permit_id: PermitId,
    pub approver_role: RoleName,
    pub approver_id: Option<UserId>,
    pub approver_name: Option<String>,
    pub decision: Decision,
    pub comment: Option<String>,
    pub signature: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PermitApproval {
    /// Approval row written alongside every new permit.
    pub fn pending_for(permit_id: PermitId, now: DateTime<Utc>) -> Self {
        Self {
            id: ApprovalId::new(),
            permit_id,
            approver_role: RoleName::SafetyOfficer,
            approver_id: None,
            approver_name: None,
            decision: Decision::Pending,
            comment: None,
            signature: None,
            approved_at: None,
            created_at: now,
        }
    }
}

/// Values written when an approver records a final decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionRecord {
    pub decision: Decision,
    pub approver_id: UserId,
    pub approver_name: String,
    pub comment: Option<String>,
    pub signature: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApprovalFilter {
    pub decision: Option<Decision>,
    pub permit_id: Option<PermitId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStats {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
}

impl ApprovalStats {
    pub fn record(&mut self, decision: Decision, count: i64) {
        match decision {
            Decision::Pending => self.pending += count,
            Decision::Approved => self.approved += count,
            Decision::Rejected => self.rejected += count,
        }
        self.total += count;
    }
}
