//! Lockbox-style secret store over HTTP.
//!
//! The secret holds one JSON document with every reviewer's tokens, stored as the text
//! value of a single payload entry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use slotguard_core::config::SecretsConfig;
use slotguard_core::credentials::{SecretPayload, SecretStore, SecretStoreError};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Entry keys that may carry the token document, in the order they are tried.
const PAYLOAD_ENTRY_KEYS: [&str; 4] = ["users", "payload", "tokens", ""];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadResponse {
    #[serde(default)]
    entries: Vec<PayloadEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadEntry {
    #[serde(default)]
    key: String,
    #[serde(default)]
    text_value: String,
}

#[derive(Clone)]
pub struct HttpSecretStore {
    endpoint: String,
    secret_id: String,
    api_token: Option<SecretString>,
    client: reqwest::Client,
}

impl HttpSecretStore {
    pub fn new(
        endpoint: impl Into<String>,
        secret_id: impl Into<String>,
        api_token: Option<SecretString>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { endpoint: endpoint.into(), secret_id: secret_id.into(), api_token, client }
    }

    pub fn from_config(config: &SecretsConfig) -> Self {
        Self::new(&config.endpoint, &config.secret_id, config.api_token.clone())
    }

    fn payload_url(&self) -> String {
        format!(
            "{}/lockbox/v1/secrets/{}/payload",
            self.endpoint.trim_end_matches('/'),
            self.secret_id
        )
    }
}

#[async_trait]
impl SecretStore for HttpSecretStore {
    async fn fetch_payload(&self) -> Result<SecretPayload, SecretStoreError> {
        let mut request = self.client.get(self.payload_url());
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| SecretStoreError::Transport(error.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(SecretStoreError::Status { status: status.as_u16() });
        }

        let body = response
            .json::<PayloadResponse>()
            .await
            .map_err(|error| SecretStoreError::Decode(error.to_string()))?;
        decode_entries(&body.entries)
    }
}

fn decode_entries(entries: &[PayloadEntry]) -> Result<SecretPayload, SecretStoreError> {
    let document = PAYLOAD_ENTRY_KEYS.iter().find_map(|key| {
        entries
            .iter()
            .find(|entry| entry.key == *key && !entry.text_value.is_empty())
            .map(|entry| entry.text_value.as_str())
    });

    match document {
        Some(document) => serde_json::from_str(document)
            .map_err(|error| SecretStoreError::Decode(error.to_string())),
        None => Ok(SecretPayload::default()),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use secrecy::{ExposeSecret, SecretString};
    use serde_json::{json, Value};

    use slotguard_core::credentials::{SecretStore, SecretStoreError};

    use super::HttpSecretStore;

    async fn spawn_payload_server(status: StatusCode, body: Value) -> String {
        let app = Router::new().route(
            "/lockbox/v1/secrets/secret-1/payload",
            get(move |headers: HeaderMap| {
                let body = body.clone();
                async move {
                    let authorized = headers
                        .get("authorization")
                        .and_then(|value| value.to_str().ok())
                        .map(|value| value == "Bearer iam-token")
                        .unwrap_or(false);
                    if authorized {
                        (status, Json(body))
                    } else {
                        (StatusCode::UNAUTHORIZED, Json(json!({ "message": "no token" })))
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        format!("http://{addr}")
    }

    fn store(endpoint: String, token: Option<&str>) -> HttpSecretStore {
        HttpSecretStore::new(endpoint, "secret-1", token.map(|token| SecretString::from(token.to_string())))
    }

    #[tokio::test]
    async fn fetch_payload_reads_the_users_entry() {
        let document = json!({
            "version": 3,
            "users": {
                "alice": {
                    "access_token": "a-1",
                    "refresh_token": "r-1",
                    "issue_time": 1_760_000_000,
                    "expiry_time": 1_760_003_600
                }
            }
        });
        let endpoint = spawn_payload_server(
            StatusCode::OK,
            json!({ "entries": [
                { "key": "other", "textValue": "ignored" },
                { "key": "users", "textValue": document.to_string() }
            ]}),
        )
        .await;

        let payload = store(endpoint, Some("iam-token")).fetch_payload().await.expect("payload");

        assert_eq!(payload.version, 3);
        let alice = payload.users.get("alice").expect("alice tokens");
        assert_eq!(alice.access_token.expose_secret(), "a-1");
        assert!(alice.expires_at.is_some());
    }

    #[tokio::test]
    async fn payload_without_token_entry_is_empty() {
        let endpoint =
            spawn_payload_server(StatusCode::OK, json!({ "entries": [{ "key": "misc", "textValue": "x" }] }))
                .await;

        let payload = store(endpoint, Some("iam-token")).fetch_payload().await.expect("payload");

        assert!(payload.users.is_empty());
    }

    #[tokio::test]
    async fn non_ok_status_and_bad_documents_are_errors() {
        let endpoint = spawn_payload_server(StatusCode::OK, json!({ "entries": [] })).await;
        let unauthorized = store(endpoint, None).fetch_payload().await;
        assert_eq!(unauthorized.err(), Some(SecretStoreError::Status { status: 401 }));

        let endpoint = spawn_payload_server(
            StatusCode::OK,
            json!({ "entries": [{ "key": "tokens", "textValue": "{not json" }] }),
        )
        .await;
        let broken = store(endpoint, Some("iam-token")).fetch_payload().await;
        assert!(matches!(broken, Err(SecretStoreError::Decode(_))));
    }
}
