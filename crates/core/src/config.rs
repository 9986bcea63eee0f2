use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["permitdesk.toml", "config/permitdesk.toml"];

const MIN_JWT_SECRET_LEN: usize = 16;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub otp: OtpConfig,
    pub document: DocumentConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Base URL printed on permit documents for the public verification page.
    pub public_base_url: String,
    /// Pre-built frontend bundle served for non-API paths, if set.
    pub static_dir: Option<String>,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: SecretString,
    pub token_ttl_hours: u64,
    pub bcrypt_cost: u32,
}

#[derive(Clone, Debug)]
pub struct OtpConfig {
    pub ttl_secs: u64,
    pub code_length: u32,
    pub store: OtpStoreKind,
}

#[derive(Clone, Debug)]
pub struct DocumentConfig {
    pub company_name: String,
    pub template_dir: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpStoreKind {
    Database,
    Memory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub jwt_secret: Option<String>,
    pub bcrypt_cost: Option<u32>,
    pub server_port: Option<u16>,
    pub otp_store: Option<OtpStoreKind>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://permitdesk.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                public_base_url: "http://localhost:8080".to_string(),
                static_dir: None,
                graceful_shutdown_secs: 15,
            },
            auth: AuthConfig {
                jwt_secret: String::new().into(),
                token_ttl_hours: 24,
                bcrypt_cost: 12,
            },
            otp: OtpConfig { ttl_secs: 300, code_length: 6, store: OtpStoreKind::Database },
            document: DocumentConfig {
                company_name: "PermitDesk".to_string(),
                template_dir: "templates/permits".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl std::str::FromStr for OtpStoreKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "database" | "db" => Ok(Self::Database),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::Validation(format!(
                "unsupported otp store `{other}` (expected database|memory)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(public_base_url) = server.public_base_url {
                self.server.public_base_url = public_base_url;
            }
            if let Some(static_dir) = server.static_dir {
                self.server.static_dir = Some(static_dir);
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(jwt_secret_value) = auth.jwt_secret {
                self.auth.jwt_secret = secret_value(jwt_secret_value);
            }
            if let Some(token_ttl_hours) = auth.token_ttl_hours {
                self.auth.token_ttl_hours = token_ttl_hours;
            }
            if let Some(bcrypt_cost) = auth.bcrypt_cost {
                self.auth.bcrypt_cost = bcrypt_cost;
            }
        }

        if let Some(otp) = patch.otp {
            if let Some(ttl_secs) = otp.ttl_secs {
                self.otp.ttl_secs = ttl_secs;
            }
            if let Some(code_length) = otp.code_length {
                self.otp.code_length = code_length;
            }
            if let Some(store) = otp.store {
                self.otp.store = store;
            }
        }

        if let Some(document) = patch.document {
            if let Some(company_name) = document.company_name {
                self.document.company_name = company_name;
            }
            if let Some(template_dir) = document.template_dir {
                self.document.template_dir = template_dir;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PERMITDESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PERMITDESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("PERMITDESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PERMITDESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PERMITDESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PERMITDESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PERMITDESK_SERVER_PORT") {
            self.server.port = parse_u16("PERMITDESK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PERMITDESK_SERVER_PUBLIC_BASE_URL") {
            self.server.public_base_url = value;
        }
        if let Some(value) = read_env("PERMITDESK_SERVER_STATIC_DIR") {
            self.server.static_dir = Some(value);
        }
        if let Some(value) = read_env("PERMITDESK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PERMITDESK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("PERMITDESK_AUTH_JWT_SECRET") {
            self.auth.jwt_secret = secret_value(value);
        }
        if let Some(value) = read_env("PERMITDESK_AUTH_TOKEN_TTL_HOURS") {
            self.auth.token_ttl_hours = parse_u64("PERMITDESK_AUTH_TOKEN_TTL_HOURS", &value)?;
        }
        if let Some(value) = read_env("PERMITDESK_AUTH_BCRYPT_COST") {
            self.auth.bcrypt_cost = parse_u32("PERMITDESK_AUTH_BCRYPT_COST", &value)?;
        }

        if let Some(value) = read_env("PERMITDESK_OTP_TTL_SECS") {
            self.otp.ttl_secs = parse_u64("PERMITDESK_OTP_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("PERMITDESK_OTP_CODE_LENGTH") {
            self.otp.code_length = parse_u32("PERMITDESK_OTP_CODE_LENGTH", &value)?;
        }
        if let Some(value) = read_env("PERMITDESK_OTP_STORE") {
            self.otp.store = value.parse()?;
        }

        if let Some(value) = read_env("PERMITDESK_DOCUMENT_COMPANY_NAME") {
            self.document.company_name = value;
        }
        if let Some(value) = read_env("PERMITDESK_DOCUMENT_TEMPLATE_DIR") {
            self.document.template_dir = value;
        }

        let log_level =
            read_env("PERMITDESK_LOGGING_LEVEL").or_else(|| read_env("PERMITDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PERMITDESK_LOGGING_FORMAT").or_else(|| read_env("PERMITDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(jwt_secret) = overrides.jwt_secret {
            self.auth.jwt_secret = secret_value(jwt_secret);
        }
        if let Some(bcrypt_cost) = overrides.bcrypt_cost {
            self.auth.bcrypt_cost = bcrypt_cost;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(store) = overrides.otp_store {
            self.otp.store = store;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_auth(&self.auth)?;
        validate_otp(&self.otp)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Returns the first config file that exists, honouring an explicit path when given.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    let base_url = server.public_base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "server.public_base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    let secret = auth.jwt_secret.expose_secret();
    if secret.trim().is_empty() {
        return Err(ConfigError::Validation(
            "auth.jwt_secret is required (set PERMITDESK_AUTH_JWT_SECRET or [auth] jwt_secret)"
                .to_string(),
        ));
    }
    if secret.len() < MIN_JWT_SECRET_LEN {
        return Err(ConfigError::Validation(format!(
            "auth.jwt_secret must be at least {MIN_JWT_SECRET_LEN} characters long"
        )));
    }

    if auth.token_ttl_hours == 0 || auth.token_ttl_hours > 24 * 30 {
        return Err(ConfigError::Validation(
            "auth.token_ttl_hours must be in range 1..=720".to_string(),
        ));
    }

    if !(4..=31).contains(&auth.bcrypt_cost) {
        return Err(ConfigError::Validation(
            "auth.bcrypt_cost must be in range 4..=31".to_string(),
        ));
    }

    Ok(())
}

fn validate_otp(otp: &OtpConfig) -> Result<(), ConfigError> {
    if otp.ttl_secs == 0 || otp.ttl_secs > 3600 {
        return Err(ConfigError::Validation("otp.ttl_secs must be in range 1..=3600".to_string()));
    }

    if !(4..=10).contains(&otp.code_length) {
        return Err(ConfigError::Validation("otp.code_length must be in range 4..=10".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    auth: Option<AuthPatch>,
    otp: Option<OtpPatch>,
    document: Option<DocumentPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    public_base_url: Option<String>,
    static_dir: Option<String>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    jwt_secret: Option<String>,
    token_ttl_hours: Option<u64>,
    bcrypt_cost: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct OtpPatch {
    ttl_secs: Option<u64>,
    code_length: Option<u32>,
    store: Option<OtpStoreKind>,
}

#[derive(Debug, Default, Deserialize)]
struct DocumentPatch {
    company_name: Option<String>,
    template_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
