pub mod access;
pub mod audit;
pub mod config;
pub mod domain;
pub mod encoding;
pub mod errors;
pub mod lifecycle;
pub mod otp;

pub use access::{authorize, AccessDecision, AccessRequest, Capability, DenyReason};
pub use audit::{AuditAction, AuditEntry, EntityType};
pub use domain::approval::{ApprovalId, Decision, PermitApproval};
pub use domain::permit::{PermitId, PermitRequest, PermitStatus, Priority, WorkType};
pub use domain::role::{Role, RoleId, RoleName};
pub use domain::user::{User, UserId};
pub use errors::DomainError;
pub use otp::{InMemoryOtpStore, OtpError, OtpService, OtpStore};
