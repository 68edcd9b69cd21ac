use std::env;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use slotguard_cli::commands::{config, migrate, requests, settings, sweep, whitelist};
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_database(|| {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn commands_return_config_failure_without_required_ids() {
    with_env(&[("SLOTGUARD_DATABASE_URL", "sqlite::memory:")], || {
        for result in [migrate::run(), sweep::run(), config::run(), whitelist::list("alice")] {
            assert_eq!(result.exit_code, 2, "expected config validation failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "config_validation");
        }
    });
}

#[test]
fn config_redacts_the_secret_store_token() {
    with_env(
        &[
            ("SLOTGUARD_DATABASE_URL", "sqlite::memory:"),
            ("SLOTGUARD_SECRETS_SECRET_ID", "e6q-secret"),
            ("SLOTGUARD_SCHEDULING_CLIENT_ID", "s21-client"),
            ("SLOTGUARD_SECRETS_API_TOKEN", "t1.super-secret-value"),
        ],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);

            let payload = parse_payload(&result.output);
            let message = payload["message"].as_str().unwrap_or_default();
            assert!(message.contains("secrets.api_token = t1.*** (source: env (SLOTGUARD_SECRETS_API_TOKEN))"));
            assert!(message.contains("secrets.secret_id = e6q-secret"));
            assert!(!message.contains("super-secret-value"));
        },
    );
}

#[test]
fn whitelist_entries_can_be_added_listed_and_removed() {
    with_database(|| {
        assert_eq!(migrate::run().exit_code, 0);

        let added = whitelist::add("alice", Some("go-concurrency"), None);
        assert_eq!(added.exit_code, 0);
        assert_eq!(parse_payload(&added.output)["data"]["entry_type"], "PROJECT");
        let repeated = whitelist::add("alice", Some("go-concurrency"), None);
        assert!(parse_payload(&repeated.output)["message"]
            .as_str()
            .unwrap_or_default()
            .contains("already whitelisted"));
        assert_eq!(whitelist::add("alice", None, Some("Go")).exit_code, 0);

        let listed = parse_payload(&whitelist::list("alice").output);
        assert_eq!(listed["data"].as_array().map(Vec::len), Some(2));

        let removed = parse_payload(&whitelist::remove("alice", "Go").output);
        assert_eq!(removed["message"], "removed 1 whitelist entries");
        let listed = parse_payload(&whitelist::list("alice").output);
        assert_eq!(listed["data"].as_array().map(Vec::len), Some(1));
    });
}

#[test]
fn whitelist_add_needs_exactly_one_name() {
    with_database(|| {
        assert_eq!(migrate::run().exit_code, 0);

        let result = whitelist::add("alice", Some("go-concurrency"), Some("Go"));

        assert_eq!(result.exit_code, 7);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
    });
}

#[test]
fn settings_start_from_defaults_and_accept_known_keys() {
    with_database(|| {
        assert_eq!(migrate::run().exit_code, 0);

        let shown = parse_payload(&settings::show("alice").output);
        assert_eq!(shown["data"]["response_deadline_shift_minutes"], 20);
        assert_eq!(shown["data"]["notify_whitelist_timeout"], true);

        let updated = settings::set("alice", "notify_whitelist_timeout", "false");
        assert_eq!(updated.exit_code, 0);
        assert_eq!(parse_payload(&updated.output)["data"]["notify_whitelist_timeout"], false);

        let rejected = settings::set("alice", "favourite_colour", "blue");
        assert_eq!(rejected.exit_code, 7);
        let payload = parse_payload(&rejected.output);
        assert_eq!(payload["error_class"], "invalid_input");
        assert!(payload["message"].as_str().unwrap_or_default().contains("cleanup_durations_minutes"));
    });
}

#[test]
fn requests_and_sweep_run_against_an_empty_store() {
    with_database(|| {
        assert_eq!(migrate::run().exit_code, 0);

        let listed = parse_payload(&requests::list(Some("alice"), &[]).output);
        assert_eq!(listed["status"], "ok");
        assert_eq!(listed["data"].as_array().map(Vec::len), Some(0));

        let bad_status = requests::list(None, &["PENDING".to_string()]);
        assert_eq!(bad_status.exit_code, 7);

        let swept = sweep::run();
        assert_eq!(swept.exit_code, 0);
        let payload = parse_payload(&swept.output);
        assert_eq!(payload["command"], "sweep");
        assert_eq!(payload["data"]["examined"], 0);
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

/// Runs `test_fn` against a fresh database file with the required ids configured.
fn with_database(test_fn: impl FnOnce()) {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("slotguard.db").display());
    with_env(
        &[
            ("SLOTGUARD_DATABASE_URL", url.as_str()),
            ("SLOTGUARD_SECRETS_SECRET_ID", "e6q-secret"),
            ("SLOTGUARD_SCHEDULING_CLIENT_ID", "s21-client"),
        ],
        test_fn,
    );
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "SLOTGUARD_DATABASE_URL",
        "SLOTGUARD_DATABASE_MAX_CONNECTIONS",
        "SLOTGUARD_DATABASE_TIMEOUT_SECS",
        "SLOTGUARD_SECRETS_SECRET_ID",
        "SLOTGUARD_SECRETS_ENDPOINT",
        "SLOTGUARD_SECRETS_API_TOKEN",
        "SLOTGUARD_SECRETS_CACHE_TTL_SECS",
        "SLOTGUARD_SCHEDULING_CLIENT_ID",
        "SLOTGUARD_SCHEDULING_REQUEST_TIMEOUT_SECS",
        "SLOTGUARD_SWEEP_INTERVAL_SECS",
        "SLOTGUARD_SWEEP_REQUEST_TIMEOUT_SECS",
        "SLOTGUARD_SWEEP_CALENDAR_WINDOW_HOURS",
        "SLOTGUARD_SERVER_BIND_ADDRESS",
        "SLOTGUARD_SERVER_HEALTH_CHECK_PORT",
        "SLOTGUARD_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "SLOTGUARD_LOGGING_LEVEL",
        "SLOTGUARD_LOGGING_FORMAT",
        "SLOTGUARD_LOG_LEVEL",
        "SLOTGUARD_LOG_FORMAT",
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
