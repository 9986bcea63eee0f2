use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use permitdesk_core::audit::AuditEntry;
use permitdesk_core::domain::approval::{
    ApprovalFilter, ApprovalId, ApprovalStats, DecisionRecord, PermitApproval,
};
use permitdesk_core::domain::meter::{MeterFilter, MeterReading};
use permitdesk_core::domain::permit::{PermitFilter, PermitId, PermitRequest, PermitStatusCounts};
use permitdesk_core::domain::role::{Role, RoleId};
use permitdesk_core::domain::user::{User, UserFilter, UserId, UserStats};
use permitdesk_core::domain::worker::Worker;

pub mod approval;
pub mod audit;
pub mod meter;
pub mod otp;
pub mod permit;
pub mod role;
pub mod user;
pub mod worker;

pub use approval::SqlApprovalRepository;
pub use audit::SqlAuditRepository;
pub use meter::SqlMeterRepository;
pub use otp::SqlOtpStore;
pub use permit::SqlPermitRepository;
pub use role::SqlRoleRepository;
pub use user::SqlUserRepository;
pub use worker::SqlWorkerRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(String),
}

impl RepositoryError {
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db_error)) => db_error.is_unique_violation(),
            _ => false,
        }
    }
}

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// One-based offset paging. Out-of-range input is clamped rather than rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        if total <= 0 {
            return 0;
        }
        let limit = i64::from(self.limit);
        (total + limit - 1) / limit
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: PageRequest,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    async fn insert(&self, user: &User) -> Result<(), RepositoryError>;
    async fn update(&self, user: &User) -> Result<(), RepositoryError>;
    async fn list(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<Paged<User>, RepositoryError>;
    async fn approve(
        &self,
        id: &UserId,
        approved_by: &UserId,
        at: DateTime<Utc>,
    ) -> Result<User, RepositoryError>;
    async fn reject(
        &self,
        id: &UserId,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<User, RepositoryError>;
    async fn deactivate(&self, id: &UserId, at: DateTime<Utc>) -> Result<bool, RepositoryError>;
    async fn stats(&self) -> Result<UserStats, RepositoryError>;
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Role>, RepositoryError>;
    async fn find_by_id(&self, id: &RoleId) -> Result<Option<Role>, RepositoryError>;
    async fn update(&self, role: &Role) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait PermitRepository: Send + Sync {
    async fn create_with_approval(
        &self,
        permit: &PermitRequest,
        approval: &PermitApproval,
    ) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &PermitId) -> Result<Option<PermitRequest>, RepositoryError>;
    async fn list(
        &self,
        filter: &PermitFilter,
        page: PageRequest,
    ) -> Result<Paged<PermitRequest>, RepositoryError>;
    async fn update(&self, permit: &PermitRequest) -> Result<(), RepositoryError>;
    async fn delete(&self, id: &PermitId) -> Result<bool, RepositoryError>;
    async fn status_counts(
        &self,
        created_by: Option<&UserId>,
    ) -> Result<PermitStatusCounts, RepositoryError>;
}

#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    async fn find_by_id(&self, id: &ApprovalId) -> Result<Option<PermitApproval>, RepositoryError>;
    async fn list_for_permit(
        &self,
        permit_id: &PermitId,
    ) -> Result<Vec<PermitApproval>, RepositoryError>;
    async fn list(
        &self,
        filter: &ApprovalFilter,
        page: PageRequest,
    ) -> Result<Paged<PermitApproval>, RepositoryError>;
    async fn decide(
        &self,
        id: &ApprovalId,
        record: &DecisionRecord,
    ) -> Result<PermitApproval, RepositoryError>;
    async fn pending_count(&self) -> Result<i64, RepositoryError>;
    async fn stats(&self) -> Result<ApprovalStats, RepositoryError>;
}

#[async_trait]
pub trait WorkerRepository: Send + Sync {
    async fn insert(&self, worker: &Worker) -> Result<(), RepositoryError>;
    async fn list_for_permit(&self, permit_id: &PermitId) -> Result<Vec<Worker>, RepositoryError>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MeterRepository: Send + Sync {
    async fn insert(&self, reading: &MeterReading) -> Result<(), RepositoryError>;
    async fn list(
        &self,
        filter: &MeterFilter,
        page: PageRequest,
    ) -> Result<Paged<MeterReading>, RepositoryError>;
    async fn all_matching(&self, filter: &MeterFilter)
        -> Result<Vec<MeterReading>, RepositoryError>;
}

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_optional_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|value| DateTime::parse_from_rfc3339(&value).ok()).map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn like_pattern(search: &str) -> String {
    format!("%{}%", search.trim().to_ascii_lowercase())
}
