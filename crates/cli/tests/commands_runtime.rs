use std::env;
use std::sync::{Mutex, OnceLock};

use permitdesk_cli::commands::create_admin::{self, CreateAdminArgs};
use permitdesk_cli::commands::{config, doctor, migrate};
use serde_json::Value;

const SECRET: &str = "integration-test-secret";

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(
        &[("PERMITDESK_DATABASE_URL", "sqlite::memory:"), ("PERMITDESK_AUTH_JWT_SECRET", SECRET)],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 0, "expected successful migrate run");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "migrate");
            assert_eq!(payload["status"], "ok");
            assert_eq!(payload["message"], "applied 1 pending migration(s)");
        },
    );
}

#[test]
fn migrate_returns_config_failure_without_jwt_secret() {
    with_env(&[("PERMITDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn migrate_is_idempotent_against_a_file_database() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = file_database_url(&dir);
    with_env(&[("PERMITDESK_DATABASE_URL", &url), ("PERMITDESK_AUTH_JWT_SECRET", SECRET)], || {
        assert_eq!(migrate::run().exit_code, 0);

        let second = migrate::run();
        assert_eq!(second.exit_code, 0);
        assert_eq!(parse_payload(&second.output)["message"], "database schema already up to date");
    });
}

#[test]
fn doctor_flags_an_unmigrated_database() {
    with_env(
        &[("PERMITDESK_DATABASE_URL", "sqlite::memory:"), ("PERMITDESK_AUTH_JWT_SECRET", SECRET)],
        || {
            let result = doctor::run(true);
            assert_eq!(result.exit_code, 8, "pending migrations should fail the doctor run");

            let report = parse_payload(&result.output);
            assert_eq!(report["overall_status"], "fail");
            assert_eq!(check_status(&report, "config_validation"), "pass");
            assert_eq!(check_status(&report, "database_connectivity"), "pass");
            assert_eq!(check_status(&report, "schema_migrations"), "fail");
        },
    );
}

#[test]
fn doctor_passes_database_checks_after_migrate() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = file_database_url(&dir);
    with_env(&[("PERMITDESK_DATABASE_URL", &url), ("PERMITDESK_AUTH_JWT_SECRET", SECRET)], || {
        assert_eq!(migrate::run().exit_code, 0);

        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "warnings alone must not fail the doctor run");
        let report = parse_payload(&result.output);
        assert_eq!(check_status(&report, "schema_migrations"), "pass");
        assert_ne!(report["overall_status"], "fail");
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 8);
        assert!(result.output.contains("- [fail] config_validation"));
        assert!(result.output.contains("- [skip] database_connectivity"));
    });
}

#[test]
fn create_admin_creates_then_promotes() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = file_database_url(&dir);
    with_env(
        &[
            ("PERMITDESK_DATABASE_URL", &url),
            ("PERMITDESK_AUTH_JWT_SECRET", SECRET),
            ("PERMITDESK_AUTH_BCRYPT_COST", "4"),
            ("PERMITDESK_ADMIN_PASSWORD", "change-me-now"),
        ],
        || {
            let args = CreateAdminArgs {
                email: "Ops@Example.com".to_string(),
                password: None,
                password_stdin: false,
                first_name: "Ops".to_string(),
                last_name: "Lead".to_string(),
            };

            let first = create_admin::run(args.clone());
            assert_eq!(first.exit_code, 0, "unexpected output: {}", first.output);
            let message = parse_payload(&first.output)["message"].as_str().map(str::to_string);
            let message = message.unwrap_or_default();
            assert!(message.starts_with("created administrator ops@example.com"), "{message}");

            let second = create_admin::run(args);
            assert_eq!(second.exit_code, 0);
            let message = parse_payload(&second.output)["message"].as_str().map(str::to_string);
            assert!(message.unwrap_or_default().starts_with("promoted existing account"));
        },
    );
}

#[test]
fn config_reports_sources_and_redacts_the_jwt_secret() {
    with_env(
        &[("PERMITDESK_DATABASE_URL", "sqlite::memory:"), ("PERMITDESK_AUTH_JWT_SECRET", SECRET)],
        || {
            let output = config::run();
            assert!(output.contains("- database.url = sqlite::memory: (source: env"));
            assert!(output.contains("- auth.jwt_secret = in***"));
            assert!(!output.contains(SECRET));
            assert!(output.contains("- otp.ttl_secs = 300 (source: default)"));
        },
    );
}

fn file_database_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join("permitdesk.db").display())
}

fn check_status(report: &Value, name: &str) -> String {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .and_then(|check| check["status"].as_str())
        .unwrap_or("missing")
        .to_string()
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "PERMITDESK_DATABASE_URL",
        "PERMITDESK_DATABASE_MAX_CONNECTIONS",
        "PERMITDESK_DATABASE_TIMEOUT_SECS",
        "PERMITDESK_SERVER_BIND_ADDRESS",
        "PERMITDESK_SERVER_PORT",
        "PERMITDESK_SERVER_PUBLIC_BASE_URL",
        "PERMITDESK_SERVER_STATIC_DIR",
        "PERMITDESK_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "PERMITDESK_AUTH_JWT_SECRET",
        "PERMITDESK_AUTH_TOKEN_TTL_HOURS",
        "PERMITDESK_AUTH_BCRYPT_COST",
        "PERMITDESK_OTP_TTL_SECS",
        "PERMITDESK_OTP_CODE_LENGTH",
        "PERMITDESK_OTP_STORE",
        "PERMITDESK_DOCUMENT_COMPANY_NAME",
        "PERMITDESK_DOCUMENT_TEMPLATE_DIR",
        "PERMITDESK_LOGGING_LEVEL",
        "PERMITDESK_LOGGING_FORMAT",
        "PERMITDESK_LOG_LEVEL",
        "PERMITDESK_LOG_FORMAT",
        "PERMITDESK_ADMIN_PASSWORD",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
