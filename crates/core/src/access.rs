use serde::Serialize;

use crate::domain::permit::PermitStatus;
use crate::domain::role::RoleName;
use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewPermit,
    CreatePermit,
    UpdatePermit,
    DeletePermit,
    ReviewApprovals,
    DecideApproval,
    ManageUsers,
    EditRoles,
    RecordMeterReading,
}

/// Roles allowed to attempt a capability before ownership and status rules apply.
pub fn allowed_roles(capability: Capability) -> &'static [RoleName] {
    use RoleName::{Admin, Requestor, SafetyOfficer, SiteEngineer};

    match capability {
        Capability::ViewPermit | Capability::UpdatePermit | Capability::DeletePermit => {
            &[Admin, SafetyOfficer, SiteEngineer, Requestor]
        }
        Capability::CreatePermit => &[Admin, SafetyOfficer, Requestor],
        Capability::ReviewApprovals | Capability::DecideApproval => &[Admin, SafetyOfficer],
        Capability::ManageUsers | Capability::EditRoles => &[Admin],
        Capability::RecordMeterReading => &[Admin, SafetyOfficer, SiteEngineer],
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessRequest<'a> {
    pub actor_role: RoleName,
    pub actor_id: &'a UserId,
    pub owner_id: Option<&'a UserId>,
    pub status: Option<PermitStatus>,
    pub capability: Capability,
}

impl<'a> AccessRequest<'a> {
    pub fn new(actor_role: RoleName, actor_id: &'a UserId, capability: Capability) -> Self {
        Self { actor_role, actor_id, owner_id: None, status: None, capability }
    }

    pub fn on_permit(mut self, owner_id: &'a UserId, status: PermitStatus) -> Self {
        self.owner_id = Some(owner_id);
        self.status = Some(status);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    RoleNotPermitted,
    NotOwner,
    PermitLocked(PermitStatus),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny(DenyReason),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

pub fn authorize(request: &AccessRequest<'_>) -> AccessDecision {
    if !allowed_roles(request.capability).contains(&request.actor_role) {
        return AccessDecision::Deny(DenyReason::RoleNotPermitted);
    }

    let touches_permit = matches!(
        request.capability,
        Capability::ViewPermit | Capability::UpdatePermit | Capability::DeletePermit
    );
    if !touches_permit {
        return AccessDecision::Allow;
    }

    if request.actor_role == RoleName::Requestor {
        if let Some(owner_id) = request.owner_id {
            if owner_id != request.actor_id {
                return AccessDecision::Deny(DenyReason::NotOwner);
            }
        }
    }

    let mutates = matches!(request.capability, Capability::UpdatePermit | Capability::DeletePermit);
    if mutates && request.actor_role != RoleName::Admin {
        if let Some(status) = request.status {
            if status != PermitStatus::Pending {
                return AccessDecision::Deny(DenyReason::PermitLocked(status));
            }
        }
    }

    AccessDecision::Allow
}

/// `authorize` folded into the domain error type for handlers that propagate with `?`.
pub fn ensure(request: &AccessRequest<'_>) -> Result<(), DomainError> {
    match authorize(request) {
        AccessDecision::Allow => Ok(()),
        AccessDecision::Deny(DenyReason::RoleNotPermitted) => {
            Err(DomainError::RoleNotPermitted { role: request.actor_role })
        }
        AccessDecision::Deny(DenyReason::NotOwner) => Err(DomainError::NotOwner),
        AccessDecision::Deny(DenyReason::PermitLocked(status)) => {
            Err(DomainError::PermitLocked { status })
        }
    }
}
