use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use permitdesk_db::{migrations, DbPool};
use serde::Serialize;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Readiness {
    Ok,
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    pub readiness: Readiness,
    pub message: String,
}

impl ComponentStatus {
    fn ok(message: impl Into<String>) -> Self {
        Self { readiness: Readiness::Ok, message: message.into() }
    }

    fn degraded(message: impl Into<String>) -> Self {
        Self { readiness: Readiness::Degraded, message: message.into() }
    }
}

/// `GET /health` body. Degraded components turn the response into a 503.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub readiness: Readiness,
    pub version: &'static str,
    pub database: ComponentStatus,
    pub schema: ComponentStatus,
    pub checked_at: DateTime<Utc>,
}

/// Mounted outside the `/api` tree and the auth layer.
pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(db_pool)
}

pub async fn health(State(pool): State<DbPool>) -> (StatusCode, Json<HealthReport>) {
    let ping = sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&pool).await;
    let (database, schema) = match ping {
        Ok(_) => (ComponentStatus::ok("reachable"), schema_status(&pool).await),
        Err(error) => {
            warn!(
                event_name = "system.health.database_degraded",
                error = %error,
                "database unreachable from health check"
            );
            (
                ComponentStatus::degraded(format!("unreachable: {error}")),
                ComponentStatus::degraded("not checked while the database is unreachable"),
            )
        }
    };

    let readiness = if database.readiness == Readiness::Ok && schema.readiness == Readiness::Ok {
        Readiness::Ok
    } else {
        Readiness::Degraded
    };
    let status = match readiness {
        Readiness::Ok => StatusCode::OK,
        Readiness::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    };

    let report = HealthReport {
        readiness,
        version: env!("CARGO_PKG_VERSION"),
        database,
        schema,
        checked_at: Utc::now(),
    };
    (status, Json(report))
}

async fn schema_status(pool: &DbPool) -> ComponentStatus {
    match migrations::pending_versions(pool).await {
        Ok(pending) if pending.is_empty() => ComponentStatus::ok("all migrations applied"),
        Ok(pending) => ComponentStatus::degraded(format!("{} pending migration(s)", pending.len())),
        Err(error) => ComponentStatus::degraded(format!("migration history unreadable: {error}")),
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::Json;
    use permitdesk_db::{connect_with_settings, migrations};

    use super::{health, Readiness};

    #[tokio::test]
    async fn migrated_database_reports_ok() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");

        let (status, Json(report)) = health(State(pool.clone())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.readiness, Readiness::Ok);
        assert_eq!(report.schema.readiness, Readiness::Ok);
        pool.close().await;
    }

    #[tokio::test]
    async fn unmigrated_schema_is_degraded() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");

        let (status, Json(report)) = health(State(pool.clone())).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.database.readiness, Readiness::Ok);
        assert_eq!(report.schema.message, "1 pending migration(s)");
        pool.close().await;
    }

    #[tokio::test]
    async fn closed_pool_is_degraded() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        pool.close().await;

        let (status, Json(report)) = health(State(pool)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.readiness, Readiness::Degraded);
        assert_eq!(report.database.readiness, Readiness::Degraded);
    }
}
