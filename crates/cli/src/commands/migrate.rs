use permitdesk_db::{connect_with_config, migrations};

use crate::commands::{exit_codes, load_config, runtime, CommandFailure, CommandResult};

pub fn run() -> CommandResult {
    match apply() {
        Ok(0) => CommandResult::success("migrate", "database schema already up to date"),
        Ok(applied) => {
            CommandResult::success("migrate", format!("applied {applied} pending migration(s)"))
        }
        Err(failure) => failure.into_result("migrate"),
    }
}

fn apply() -> Result<usize, CommandFailure> {
    let config = load_config()?;
    runtime()?.block_on(async {
        let pool = connect_with_config(&config.database).await.map_err(|error| {
            CommandFailure::new("db_connectivity", error.to_string(), exit_codes::DB_CONNECT)
        })?;
        let pending = migrations::pending_versions(&pool).await.map_err(|error| {
            CommandFailure::new("migration", error.to_string(), exit_codes::MIGRATION)
        })?;
        migrations::run_pending(&pool).await.map_err(|error| {
            CommandFailure::new("migration", error.to_string(), exit_codes::MIGRATION)
        })?;
        pool.close().await;
        Ok(pending.len())
    })
}
