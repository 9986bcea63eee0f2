use thiserror::Error;

use crate::domain::permit::PermitStatus;
use crate::domain::role::RoleName;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("{0}")]
    Validation(String),
    #[error("permit is {} and can no longer be modified", .status.as_str())]
    PermitLocked { status: PermitStatus },
    #[error("you can only access permits you created")]
    NotOwner,
    #[error("role {role} is not permitted to perform this action")]
    RoleNotPermitted { role: RoleName },
    #[error("Approval already processed")]
    AlreadyProcessed,
    #[error("invalid permit transition from {} to {}", .from.as_str(), .to.as_str())]
    InvalidTransition { from: PermitStatus, to: PermitStatus },
}

impl DomainError {
    /// Client-facing message; every variant is safe to echo back.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::DomainError;
    use crate::domain::permit::PermitStatus;
    use crate::domain::role::RoleName;

    #[test]
    fn validation_message_is_passed_through() {
        let error = DomainError::Validation("title is required".to_string());
        assert_eq!(error.user_message(), "title is required");
    }

    #[test]
    fn conflict_messages_name_the_rule() {
        assert_eq!(DomainError::AlreadyProcessed.to_string(), "Approval already processed");
        assert_eq!(
            DomainError::PermitLocked { status: PermitStatus::Approved }.to_string(),
            "permit is APPROVED and can no longer be modified"
        );
        assert_eq!(
            DomainError::InvalidTransition {
                from: PermitStatus::Rejected,
                to: PermitStatus::Approved,
            }
            .to_string(),
            "invalid permit transition from REJECTED to APPROVED"
        );
        assert!(DomainError::RoleNotPermitted { role: RoleName::Requestor }
            .to_string()
            .contains("REQUESTOR"));
    }
}
