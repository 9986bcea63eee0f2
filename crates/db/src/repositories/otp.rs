use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use permitdesk_core::otp::{expiry_from, OtpError, OtpStore};

use super::parse_timestamp;
use crate::DbPool;

/// Table-backed code store shared by every server instance on the same database.
pub struct SqlOtpStore {
    pool: DbPool,
}

impl SqlOtpStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn store_error(error: sqlx::Error) -> OtpError {
    OtpError::Store(error.to_string())
}

#[async_trait]
impl OtpStore for SqlOtpStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), OtpError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO otp_codes (key, code_hash, expires_at, failed_attempts, created_at)
             VALUES (?, ?, ?, 0, ?)
             ON CONFLICT(key) DO UPDATE SET
                 code_hash = excluded.code_hash,
                 expires_at = excluded.expires_at,
                 failed_attempts = 0,
                 created_at = excluded.created_at",
        )
        .bind(key)
        .bind(value)
        .bind(expiry_from(now, ttl).to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, OtpError> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT code_hash, expires_at FROM otp_codes WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;

        match row {
            Some((code_hash, expires_at)) if parse_timestamp(&expires_at) > Utc::now() => {
                Ok(Some(code_hash))
            }
            Some(_) => {
                self.delete(key).await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), OtpError> {
        sqlx::query("DELETE FROM otp_codes WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn record_failure(&self, key: &str) -> Result<u32, OtpError> {
        let failures: Option<i64> = sqlx::query_scalar(
            "UPDATE otp_codes SET failed_attempts = failed_attempts + 1
             WHERE key = ? AND expires_at > ?
             RETURNING failed_attempts",
        )
        .bind(key)
        .bind(Utc::now().to_rfc3339())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(failures.map_or(0, |count| u32::try_from(count).unwrap_or(u32::MAX)))
    }

    async fn purge_expired(&self) -> Result<u64, OtpError> {
        let result = sqlx::query("DELETE FROM otp_codes WHERE expires_at <= ?")
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected())
    }
}
