use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use tracing::warn;

use permitdesk_core::audit::AuditEntry;
use permitdesk_core::config::{AppConfig, OtpStoreKind};
use permitdesk_core::{InMemoryOtpStore, OtpService, OtpStore};
use permitdesk_db::repositories::{
    ApprovalRepository, AuditRepository, MeterRepository, PermitRepository, RoleRepository,
    SqlApprovalRepository, SqlAuditRepository, SqlMeterRepository, SqlOtpStore,
    SqlPermitRepository, SqlRoleRepository, SqlUserRepository, SqlWorkerRepository,
    UserRepository, WorkerRepository,
};
use permitdesk_db::DbPool;

use crate::auth::TokenService;
use crate::pdf::PdfGenerator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: DbPool,
    pub users: Arc<dyn UserRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub permits: Arc<dyn PermitRepository>,
    pub approvals: Arc<dyn ApprovalRepository>,
    pub workers: Arc<dyn WorkerRepository>,
    pub audit: Arc<dyn AuditRepository>,
    pub meters: Arc<dyn MeterRepository>,
    pub tokens: Arc<TokenService>,
    pub otp: OtpService,
    pub documents: Arc<PdfGenerator>,
}

impl AppState {
    pub fn new(config: AppConfig, db_pool: DbPool, documents: PdfGenerator) -> Self {
        let otp_store: Arc<dyn OtpStore> = match config.otp.store {
            OtpStoreKind::Memory => Arc::new(InMemoryOtpStore::new()),
            OtpStoreKind::Database => Arc::new(SqlOtpStore::new(db_pool.clone())),
        };
        let otp = OtpService::new(
            otp_store,
            Duration::from_secs(config.otp.ttl_secs),
            config.otp.code_length,
        );
        let tokens = TokenService::new(config.auth.jwt_secret.clone(), config.auth.token_ttl_hours);

        Self {
            users: Arc::new(SqlUserRepository::new(db_pool.clone())),
            roles: Arc::new(SqlRoleRepository::new(db_pool.clone())),
            permits: Arc::new(SqlPermitRepository::new(db_pool.clone())),
            approvals: Arc::new(SqlApprovalRepository::new(db_pool.clone())),
            workers: Arc::new(SqlWorkerRepository::new(db_pool.clone())),
            audit: Arc::new(SqlAuditRepository::new(db_pool.clone())),
            meters: Arc::new(SqlMeterRepository::new(db_pool.clone())),
            tokens: Arc::new(tokens),
            otp,
            documents: Arc::new(documents),
            config: Arc::new(config),
            db_pool,
        }
    }

    /// Audit writes never fail the request that triggered them.
    pub async fn record_audit(&self, entry: AuditEntry, headers: &HeaderMap) {
        let (ip_address, user_agent) = client_info(headers);
        let entry = entry.from_client(ip_address, user_agent);
        if let Err(error) = self.audit.append(&entry).await {
            warn!(
                event_name = "audit.write_failed",
                action = entry.action.as_str(),
                entity_type = entry.entity_type.as_str(),
                entity_id = %entry.entity_id,
                error = %error,
                "failed to write audit log entry"
            );
        }
    }
}

pub fn client_info(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let header = |name: &str| {
        headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
    };
    let ip_address = header("x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty())
        .or_else(|| header("x-real-ip"));
    (ip_address, header("user-agent"))
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue};

    use super::client_info;

    #[test]
    fn client_info_prefers_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.7, 172.16.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("192.168.1.1"));
        headers.insert("user-agent", HeaderValue::from_static("curl/8.4"));

        let (ip, agent) = client_info(&headers);
        assert_eq!(ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(agent.as_deref(), Some("curl/8.4"));
    }

    #[test]
    fn client_info_is_empty_without_headers() {
        assert_eq!(client_info(&HeaderMap::new()), (None, None));
    }
}
