mod approvals;
mod auth;
mod bootstrap;
mod document;
mod error;
mod health;
mod mis;
mod pdf;
mod permits;
mod roles;
mod routes;
mod state;
mod users;

use std::time::Duration;

use anyhow::{Context, Result};
use permitdesk_core::config::{AppConfig, LoadOptions};
use permitdesk_core::OtpService;
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use permitdesk_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        public_base_url = %app.config.server.public_base_url,
        "permitdesk-server listening"
    );

    let sweeper = tokio::spawn(sweep_expired_codes(app.state.otp.clone()));
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    axum::serve(listener, routes::router(app.state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(
        event_name = "system.server.stopping",
        grace_secs = grace.as_secs(),
        "permitdesk-server stopping"
    );
    sweeper.abort();
    if tokio::time::timeout(grace, app.db_pool.close()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.pool_close_timeout",
            "database pool did not close within the grace period"
        );
    }

    Ok(())
}

async fn sweep_expired_codes(otp: OtpService) {
    let mut ticker = tokio::time::interval(otp.sweep_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match otp.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => tracing::debug!(
                event_name = "auth.otp.purged",
                purged,
                "expired one-time codes removed"
            ),
            Err(error) => tracing::warn!(
                event_name = "auth.otp.purge_failed",
                error = %error,
                "failed to purge expired one-time codes"
            ),
        }
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            error = %error,
            "failed to listen for shutdown signal"
        );
    }
}
