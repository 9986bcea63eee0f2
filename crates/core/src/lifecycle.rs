use crate::domain::approval::{Decision, PermitApproval};
use crate::domain::permit::PermitStatus;
use crate::errors::DomainError;

/// PENDING moves to APPROVED or REJECTED once. CLOSED and EXTENDED have no inbound edge.
pub fn can_transition(from: PermitStatus, to: PermitStatus) -> bool {
    matches!(
        (from, to),
        (PermitStatus::Pending, PermitStatus::Approved)
            | (PermitStatus::Pending, PermitStatus::Rejected)
    )
}

/// Checks a decision against the approval it targets and returns the permit status to write.
pub fn decide(approval: &PermitApproval, decision: Decision) -> Result<PermitStatus, DomainError> {
    if !decision.is_final() {
        return Err(DomainError::Validation(
            "decision must be APPROVED or REJECTED".to_string(),
        ));
    }
    if approval.decision.is_final() {
        return Err(DomainError::AlreadyProcessed);
    }

    let target = decision.as_permit_status();
    if !can_transition(PermitStatus::Pending, target) {
        return Err(DomainError::InvalidTransition { from: PermitStatus::Pending, to: target });
    }
    Ok(target)
}
