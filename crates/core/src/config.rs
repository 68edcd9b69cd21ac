use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub secrets: SecretsConfig,
    pub scheduling: SchedulingConfig,
    pub sweep: SweepConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SecretsConfig {
    pub secret_id: String,
    pub endpoint: String,
    pub api_token: Option<SecretString>,
    pub cache_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SchedulingConfig {
    pub client_id: String,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SweepConfig {
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
    pub calendar_window_hours: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub secret_id: Option<String>,
    pub scheduling_client_id: Option<String>,
    pub sweep_interval_secs: Option<u64>,
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
                url: "sqlite://slotguard.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            secrets: SecretsConfig {
                secret_id: String::new(),
                endpoint: "https://payload.lockbox.api.cloud.yandex.net".to_string(),
                api_token: None,
                cache_ttl_secs: 300,
            },
            scheduling: SchedulingConfig { client_id: String::new(), request_timeout_secs: 30 },
            sweep: SweepConfig { interval_secs: 60, request_timeout_secs: 20, calendar_window_hours: 24 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("slotguard.toml"));
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

        if let Some(secrets) = patch.secrets {
            if let Some(secret_id) = secrets.secret_id {
                self.secrets.secret_id = secret_id;
            }
            if let Some(endpoint) = secrets.endpoint {
                self.secrets.endpoint = endpoint;
            }
            if let Some(api_token) = secrets.api_token {
                self.secrets.api_token = Some(secret_value(api_token));
            }
            if let Some(cache_ttl_secs) = secrets.cache_ttl_secs {
                self.secrets.cache_ttl_secs = cache_ttl_secs;
            }
        }

        if let Some(scheduling) = patch.scheduling {
            if let Some(client_id) = scheduling.client_id {
                self.scheduling.client_id = client_id;
            }
            if let Some(request_timeout_secs) = scheduling.request_timeout_secs {
                self.scheduling.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(sweep) = patch.sweep {
            if let Some(interval_secs) = sweep.interval_secs {
                self.sweep.interval_secs = interval_secs;
            }
            if let Some(request_timeout_secs) = sweep.request_timeout_secs {
                self.sweep.request_timeout_secs = request_timeout_secs;
            }
            if let Some(calendar_window_hours) = sweep.calendar_window_hours {
                self.sweep.calendar_window_hours = calendar_window_hours;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("SLOTGUARD_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SLOTGUARD_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("SLOTGUARD_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SLOTGUARD_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("SLOTGUARD_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SLOTGUARD_SECRETS_SECRET_ID") {
            self.secrets.secret_id = value;
        }
        if let Some(value) = read_env("SLOTGUARD_SECRETS_ENDPOINT") {
            self.secrets.endpoint = value;
        }
        if let Some(value) = read_env("SLOTGUARD_SECRETS_API_TOKEN") {
            self.secrets.api_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("SLOTGUARD_SECRETS_CACHE_TTL_SECS") {
            self.secrets.cache_ttl_secs = parse_u64("SLOTGUARD_SECRETS_CACHE_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("SLOTGUARD_SCHEDULING_CLIENT_ID") {
            self.scheduling.client_id = value;
        }
        if let Some(value) = read_env("SLOTGUARD_SCHEDULING_REQUEST_TIMEOUT_SECS") {
            self.scheduling.request_timeout_secs =
                parse_u64("SLOTGUARD_SCHEDULING_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SLOTGUARD_SWEEP_INTERVAL_SECS") {
            self.sweep.interval_secs = parse_u64("SLOTGUARD_SWEEP_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("SLOTGUARD_SWEEP_REQUEST_TIMEOUT_SECS") {
            self.sweep.request_timeout_secs =
                parse_u64("SLOTGUARD_SWEEP_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("SLOTGUARD_SWEEP_CALENDAR_WINDOW_HOURS") {
            self.sweep.calendar_window_hours =
                parse_u32("SLOTGUARD_SWEEP_CALENDAR_WINDOW_HOURS", &value)?;
        }

        if let Some(value) = read_env("SLOTGUARD_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SLOTGUARD_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("SLOTGUARD_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("SLOTGUARD_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("SLOTGUARD_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("SLOTGUARD_LOGGING_LEVEL").or_else(|| read_env("SLOTGUARD_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SLOTGUARD_LOGGING_FORMAT").or_else(|| read_env("SLOTGUARD_LOG_FORMAT"));
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
        if let Some(secret_id) = overrides.secret_id {
            self.secrets.secret_id = secret_id;
        }
        if let Some(client_id) = overrides.scheduling_client_id {
            self.scheduling.client_id = client_id;
        }
        if let Some(interval_secs) = overrides.sweep_interval_secs {
            self.sweep.interval_secs = interval_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_secrets(&self.secrets)?;
        validate_scheduling(&self.scheduling)?;
        validate_sweep(&self.sweep)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("slotguard.toml"), PathBuf::from("config/slotguard.toml")]
        .into_iter()
        .find(|path| path.exists())
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

fn validate_secrets(secrets: &SecretsConfig) -> Result<(), ConfigError> {
    if secrets.secret_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "secrets.secret_id is required (set SLOTGUARD_SECRETS_SECRET_ID to the id of the secret holding reviewer tokens)"
                .to_string(),
        ));
    }

    let endpoint = secrets.endpoint.trim();
    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        return Err(ConfigError::Validation(
            "secrets.endpoint must start with http:// or https://".to_string(),
        ));
    }

    let blank_token =
        secrets.api_token.as_ref().map(|token| token.expose_secret().trim().is_empty());
    if blank_token == Some(true) {
        return Err(ConfigError::Validation(
            "secrets.api_token must not be blank when provided".to_string(),
        ));
    }

    if secrets.cache_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "secrets.cache_ttl_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_scheduling(scheduling: &SchedulingConfig) -> Result<(), ConfigError> {
    if scheduling.client_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "scheduling.client_id is required (set SLOTGUARD_SCHEDULING_CLIENT_ID)".to_string(),
        ));
    }

    if scheduling.request_timeout_secs == 0 || scheduling.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "scheduling.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_sweep(sweep: &SweepConfig) -> Result<(), ConfigError> {
    if sweep.interval_secs == 0 {
        return Err(ConfigError::Validation(
            "sweep.interval_secs must be greater than zero".to_string(),
        ));
    }
    if sweep.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "sweep.request_timeout_secs must be greater than zero".to_string(),
        ));
    }
    if sweep.calendar_window_hours == 0 {
        return Err(ConfigError::Validation(
            "sweep.calendar_window_hours must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
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
    secrets: Option<SecretsPatch>,
    scheduling: Option<SchedulingPatch>,
    sweep: Option<SweepPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SecretsPatch {
    secret_id: Option<String>,
    endpoint: Option<String>,
    api_token: Option<String>,
    cache_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulingPatch {
    client_id: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SweepPatch {
    interval_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    calendar_window_hours: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
