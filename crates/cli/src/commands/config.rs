use std::env;
use std::fs;
use std::path::Path;

use permitdesk_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key_path: &'static str,
    env_key: &'static str,
    value: String,
}

impl Field {
    fn new(key_path: &'static str, env_key: &'static str, value: impl Into<String>) -> Self {
        Self { key_path, env_key, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key_path, field.value));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let database = &config.database;
    let server = &config.server;
    let auth = &config.auth;
    let otp = &config.otp;
    let document = &config.document;
    let logging = &config.logging;

    vec![
        Field::new("database.url", "PERMITDESK_DATABASE_URL", database.url.as_str()),
        Field::new(
            "database.max_connections",
            "PERMITDESK_DATABASE_MAX_CONNECTIONS",
            database.max_connections.to_string(),
        ),
        Field::new(
            "database.timeout_secs",
            "PERMITDESK_DATABASE_TIMEOUT_SECS",
            database.timeout_secs.to_string(),
        ),
        Field::new(
            "server.bind_address",
            "PERMITDESK_SERVER_BIND_ADDRESS",
            server.bind_address.as_str(),
        ),
        Field::new("server.port", "PERMITDESK_SERVER_PORT", server.port.to_string()),
        Field::new(
            "server.public_base_url",
            "PERMITDESK_SERVER_PUBLIC_BASE_URL",
            server.public_base_url.as_str(),
        ),
        Field::new(
            "server.static_dir",
            "PERMITDESK_SERVER_STATIC_DIR",
            server.static_dir.as_deref().unwrap_or("<unset>"),
        ),
        Field::new(
            "server.graceful_shutdown_secs",
            "PERMITDESK_SERVER_GRACEFUL_SHUTDOWN_SECS",
            server.graceful_shutdown_secs.to_string(),
        ),
        Field::new(
            "auth.jwt_secret",
            "PERMITDESK_AUTH_JWT_SECRET",
            redact_secret(auth.jwt_secret.expose_secret()),
        ),
        Field::new(
            "auth.token_ttl_hours",
            "PERMITDESK_AUTH_TOKEN_TTL_HOURS",
            auth.token_ttl_hours.to_string(),
        ),
        Field::new("auth.bcrypt_cost", "PERMITDESK_AUTH_BCRYPT_COST", auth.bcrypt_cost.to_string()),
        Field::new("otp.ttl_secs", "PERMITDESK_OTP_TTL_SECS", otp.ttl_secs.to_string()),
        Field::new("otp.code_length", "PERMITDESK_OTP_CODE_LENGTH", otp.code_length.to_string()),
        Field::new("otp.store", "PERMITDESK_OTP_STORE", format!("{:?}", otp.store)),
        Field::new(
            "document.company_name",
            "PERMITDESK_DOCUMENT_COMPANY_NAME",
            document.company_name.as_str(),
        ),
        Field::new(
            "document.template_dir",
            "PERMITDESK_DOCUMENT_TEMPLATE_DIR",
            document.template_dir.as_str(),
        ),
        Field::new("logging.level", "PERMITDESK_LOGGING_LEVEL", logging.level.as_str()),
        Field::new("logging.format", "PERMITDESK_LOGGING_FORMAT", format!("{:?}", logging.format)),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps only enough of the secret to tell two deployments apart.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    let prefix: String = trimmed.chars().take(2).collect();
    format!("{prefix}*** ({} chars)", trimmed.chars().count())
}
