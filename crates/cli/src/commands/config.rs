use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use slotguard_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::commands::CommandResult;

/// Effective configuration with the source of every value. Secrets are redacted.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let file_path = detect_config_path();
    let file_doc = load_config_file_doc(file_path.as_deref());
    let sources = Sources { file_doc: file_doc.as_ref(), file_path: file_path.as_deref() };

    let api_token = config
        .secrets
        .api_token
        .as_ref()
        .map(|token| redact_token(token.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    let fields: Vec<(&str, String)> = vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("secrets.secret_id", config.secrets.secret_id.clone()),
        ("secrets.endpoint", config.secrets.endpoint.clone()),
        ("secrets.api_token", api_token),
        ("secrets.cache_ttl_secs", config.secrets.cache_ttl_secs.to_string()),
        ("scheduling.client_id", config.scheduling.client_id.clone()),
        ("scheduling.request_timeout_secs", config.scheduling.request_timeout_secs.to_string()),
        ("sweep.interval_secs", config.sweep.interval_secs.to_string()),
        ("sweep.request_timeout_secs", config.sweep.request_timeout_secs.to_string()),
        ("sweep.calendar_window_hours", config.sweep.calendar_window_hours.to_string()),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.health_check_port", config.server.health_check_port.to_string()),
        ("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", config.logging.format.as_str().to_string()),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(fields.iter().map(|(key, value)| render_line(key, value, sources.of(key))));
    CommandResult::success("config", lines.join("\n"))
}

struct Sources<'a> {
    file_doc: Option<&'a Value>,
    file_path: Option<&'a Path>,
}

impl Sources<'_> {
    fn of(&self, key_path: &str) -> String {
        let env_key = env_key(key_path);
        if env::var_os(&env_key).is_some() {
            return format!("env ({env_key})");
        }

        if self.file_doc.is_some_and(|doc| contains_path(doc, key_path)) {
            let file_path = self
                .file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }

        "default".to_string()
    }
}

/// `secrets.secret_id` -> `SLOTGUARD_SECRETS_SECRET_ID`.
fn env_key(key_path: &str) -> String {
    format!("SLOTGUARD_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("slotguard.toml"), PathBuf::from("config/slotguard.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a short prefix so operators can tell tokens apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('.') {
        if prefix.len() <= 4 {
            return format!("{prefix}.***");
        }
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::{env_key, redact_token};

    #[test]
    fn env_keys_follow_the_section_layout() {
        assert_eq!(env_key("secrets.secret_id"), "SLOTGUARD_SECRETS_SECRET_ID");
        assert_eq!(env_key("sweep.interval_secs"), "SLOTGUARD_SWEEP_INTERVAL_SECS");
    }

    #[test]
    fn tokens_never_leak_past_their_prefix() {
        assert_eq!(redact_token("t1.super-secret-value"), "t1.***");
        assert_eq!(redact_token("plain-secret"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }
}
