pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "permitdesk",
    about = "PermitDesk operator CLI",
    long_about = "Apply migrations, inspect configuration, check readiness and bootstrap the \
                  first administrator account.",
    after_help = "Examples:\n  permitdesk doctor --json\n  permitdesk migrate\n  \
                  PERMITDESK_ADMIN_PASSWORD='change me now' permitdesk create-admin \
                  --email admin@example.com --first-name Site --last-name Admin"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database connectivity and document rendering readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Create an approved ADMIN account, or promote an existing one")]
    CreateAdmin(commands::create_admin::CreateAdminArgs),
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::CreateAdmin(args) => commands::create_admin::run(args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
