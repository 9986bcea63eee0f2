use permitdesk_core::audit::AuditEntry;

use super::{AuditRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAuditRepository {
    pool: DbPool,
}

impl SqlAuditRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AuditRepository for SqlAuditRepository {
    async fn append(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO audit_logs (id, user_id, action, entity_type, entity_id, old_value,
                                     new_value, ip_address, user_agent, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(entry.user_id.as_ref().map(|id| id.0.as_str()))
        .bind(entry.action.as_str())
        .bind(entry.entity_type.as_str())
        .bind(&entry.entity_id)
        .bind(entry.old_value.as_ref().map(|value| value.to_string()))
        .bind(entry.new_value.as_ref().map(|value| value.to_string()))
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
