use permitdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use permitdesk_db::{connect_with_config, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::pdf::{PdfError, PdfGenerator};
use crate::state::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("permit document templates failed to load: {0}")]
    Document(#[from] PdfError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        max_connections = config.database.max_connections,
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let documents = PdfGenerator::from_config(&config.document)?;
    let state = AppState::new(config.clone(), db_pool.clone(), documents);

    Ok(Application { config, db_pool, state })
}

#[cfg(test)]
mod tests {
    use permitdesk_core::config::{ConfigOverrides, LoadOptions, OtpStoreKind};

    use crate::bootstrap::bootstrap;

    fn overrides(jwt_secret: &str) -> LoadOptions {
        LoadOptions {
            config_path: Some("does-not-exist/permitdesk.toml".into()),
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                jwt_secret: Some(jwt_secret.to_string()),
                otp_store: Some(OtpStoreKind::Memory),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_a_short_jwt_secret() {
        let result = bootstrap(overrides("short")).await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("auth.jwt_secret"), "unexpected message: {message}");
    }

    #[tokio::test]
    async fn bootstrap_connects_migrates_and_seeds_roles() {
        let app = bootstrap(overrides("a-sufficiently-long-secret"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('users', 'roles', 'permit_requests', 'permit_approvals', 'workers', 'audit_logs')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 6);

        let roles = app.state.roles.list().await.expect("roles");
        assert_eq!(roles.len(), 4);

        app.db_pool.close().await;
    }
}
