use std::env;
use std::io::{self, BufRead};

use chrono::Utc;
use clap::Args;
use permitdesk_core::config::AppConfig;
use permitdesk_core::domain::role::RoleName;
use permitdesk_core::domain::user::{
    is_plausible_email, normalize_email, User, UserId, MIN_PASSWORD_LEN,
};
use permitdesk_db::repositories::{SqlUserRepository, UserRepository};
use permitdesk_db::{connect_with_config, migrations};
use secrecy::{ExposeSecret, SecretString};

use crate::commands::{exit_codes, load_config, runtime, CommandFailure, CommandResult};

pub const ADMIN_PASSWORD_ENV: &str = "PERMITDESK_ADMIN_PASSWORD";

#[derive(Debug, Clone, Args)]
pub struct CreateAdminArgs {
    #[arg(long)]
    pub email: String,
    /// Visible in shell history; prefer `--password-stdin` or PERMITDESK_ADMIN_PASSWORD.
    #[arg(long, conflicts_with = "password_stdin")]
    pub password: Option<String>,
    /// Read the password from the first line of standard input.
    #[arg(long)]
    pub password_stdin: bool,
    #[arg(long, default_value = "System")]
    pub first_name: String,
    #[arg(long, default_value = "Administrator")]
    pub last_name: String,
}

#[derive(Debug)]
enum Outcome {
    Created(UserId),
    Promoted(UserId),
}

pub fn run(args: CreateAdminArgs) -> CommandResult {
    let result = load_config().and_then(|config| {
        let password =
            resolve_password(&args, env::var(ADMIN_PASSWORD_ENV).ok(), io::stdin().lock())?;
        validate(&args, &password)?;
        runtime()?.block_on(provision(&config, &args, &password))
    });

    match result {
        Ok(Outcome::Created(id)) => CommandResult::success(
            "create-admin",
            format!("created administrator {} ({id})", normalize_email(&args.email)),
        ),
        Ok(Outcome::Promoted(id)) => CommandResult::success(
            "create-admin",
            format!("promoted existing account {} ({id}) to ADMIN", normalize_email(&args.email)),
        ),
        Err(failure) => failure.into_result("create-admin"),
    }
}

/// `--password-stdin` wins, then `--password`, then the environment.
fn resolve_password(
    args: &CreateAdminArgs,
    env_value: Option<String>,
    mut stdin: impl BufRead,
) -> Result<SecretString, CommandFailure> {
    let invalid = |message: String| {
        CommandFailure::new("invalid_input", message, exit_codes::INVALID_INPUT)
    };

    if args.password_stdin {
        let mut line = String::new();
        stdin
            .read_line(&mut line)
            .map_err(|error| invalid(format!("failed to read password from stdin: {error}")))?;
        let password = line.trim_end_matches(['\r', '\n']).to_string();
        return Ok(SecretString::from(password));
    }
    if let Some(password) = args.password.clone() {
        return Ok(SecretString::from(password));
    }
    match env_value {
        Some(password) if !password.is_empty() => Ok(SecretString::from(password)),
        _ => Err(invalid(format!(
            "a password is required: pass --password-stdin or set {ADMIN_PASSWORD_ENV}"
        ))),
    }
}

fn validate(args: &CreateAdminArgs, password: &SecretString) -> Result<(), CommandFailure> {
    if !is_plausible_email(&args.email) {
        return Err(CommandFailure::new(
            "invalid_input",
            format!("`{}` is not a valid email address", args.email),
            exit_codes::INVALID_INPUT,
        ));
    }
    if password.expose_secret().chars().count() < MIN_PASSWORD_LEN {
        return Err(CommandFailure::new(
            "invalid_input",
            format!("password must be at least {MIN_PASSWORD_LEN} characters"),
            exit_codes::INVALID_INPUT,
        ));
    }
    if args.first_name.trim().is_empty() || args.last_name.trim().is_empty() {
        return Err(CommandFailure::new(
            "invalid_input",
            "first and last name must not be blank",
            exit_codes::INVALID_INPUT,
        ));
    }
    Ok(())
}

async fn provision(
    config: &AppConfig,
    args: &CreateAdminArgs,
    password: &SecretString,
) -> Result<Outcome, CommandFailure> {
    let pool = connect_with_config(&config.database).await.map_err(|error| {
        CommandFailure::new("db_connectivity", error.to_string(), exit_codes::DB_CONNECT)
    })?;
    migrations::run_pending(&pool).await.map_err(|error| {
        CommandFailure::new("migration", error.to_string(), exit_codes::MIGRATION)
    })?;

    let account_failure =
        |error: String| CommandFailure::new("account", error, exit_codes::ACCOUNT);
    let users = SqlUserRepository::new(pool.clone());
    let email = normalize_email(&args.email);
    let password_hash = bcrypt::hash(password.expose_secret(), config.auth.bcrypt_cost)
        .map_err(|error| account_failure(format!("failed to hash password: {error}")))?;
    let now = Utc::now();

    let outcome = match users.find_by_email(&email).await {
        Ok(Some(mut user)) => {
            user.role = RoleName::Admin;
            user.requested_role = None;
            user.password_hash = password_hash;
            user.is_active = true;
            user.is_approved = true;
            user.approved_at = Some(now);
            user.rejection_reason = None;
            user.updated_at = now;
            users.update(&user).await.map_err(|error| account_failure(error.to_string()))?;
            Outcome::Promoted(user.id)
        }
        Ok(None) => {
            let user = User {
                id: UserId::new(),
                email,
                password_hash,
                first_name: args.first_name.trim().to_string(),
                last_name: args.last_name.trim().to_string(),
                department: None,
                phone: None,
                role: RoleName::Admin,
                requested_role: None,
                is_active: true,
                is_approved: true,
                approved_by: None,
                approved_at: Some(now),
                rejection_reason: None,
                created_at: now,
                updated_at: now,
            };
            users.insert(&user).await.map_err(|error| account_failure(error.to_string()))?;
            Outcome::Created(user.id)
        }
        Err(error) => return Err(account_failure(error.to_string())),
    };

    pool.close().await;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use secrecy::{ExposeSecret, SecretString};

    use super::{resolve_password, validate, CreateAdminArgs};
    use crate::commands::exit_codes;

    fn args(email: &str, password: Option<&str>) -> CreateAdminArgs {
        CreateAdminArgs {
            email: email.to_string(),
            password: password.map(str::to_string),
            password_stdin: false,
            first_name: "Site".to_string(),
            last_name: "Admin".to_string(),
        }
    }

    fn secret(raw: &str) -> SecretString {
        SecretString::from(raw.to_string())
    }

    #[test]
    fn rejects_malformed_input_before_touching_the_database() {
        let failure =
            validate(&args("not-an-email", None), &secret("long-enough-pass")).expect_err("email");
        assert_eq!(failure.exit_code, exit_codes::INVALID_INPUT);

        let failure =
            validate(&args("admin@example.com", None), &secret("short")).expect_err("password");
        assert!(failure.message.contains("at least 8"));

        assert!(validate(&args("admin@example.com", None), &secret("long-enough-pass")).is_ok());
    }

    #[test]
    fn password_comes_from_stdin_flag_or_environment() {
        let mut from_stdin = args("admin@example.com", None);
        from_stdin.password_stdin = true;
        let resolved =
            resolve_password(&from_stdin, Some("ignored".to_string()), &b"piped-pass\n"[..])
                .expect("stdin password");
        assert_eq!(resolved.expose_secret(), "piped-pass");

        let resolved = resolve_password(
            &args("admin@example.com", Some("flag-pass")),
            Some("env-pass".to_string()),
            &b""[..],
        )
        .expect("flag password");
        assert_eq!(resolved.expose_secret(), "flag-pass");

        let env_only = args("admin@example.com", None);
        let resolved = resolve_password(&env_only, Some("env-pass".to_string()), &b""[..])
            .expect("env password");
        assert_eq!(resolved.expose_secret(), "env-pass");

        let failure = resolve_password(&args("admin@example.com", None), None, &b""[..])
            .expect_err("missing password");
        assert_eq!(failure.exit_code, exit_codes::INVALID_INPUT);
        assert!(failure.message.contains("PERMITDESK_ADMIN_PASSWORD"));
    }
}
