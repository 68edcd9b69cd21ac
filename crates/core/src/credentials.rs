//! Reviewer token cache in front of the secret store.
//!
//! The store only supports whole-payload reads, so the cache holds one snapshot of every
//! reviewer's tokens. Readers share the snapshot through an `Arc`; a refresh builds a new
//! snapshot and swaps it in under the write lock, so a reader never sees a partial one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::time::from_unix_seconds;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SecretStoreError {
    #[error("secret store transport failure: {0}")]
    Transport(String),
    #[error("secret store returned status {status}")]
    Status { status: u16 },
    #[error("secret payload could not be decoded: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("no stored tokens for reviewer `{reviewer_login}`")]
    NotFound { reviewer_login: String },
    #[error(transparent)]
    Fetch(#[from] SecretStoreError),
    #[error("{0} is not supported by the secret store")]
    NotImplemented(&'static str),
}

/// Access and refresh tokens for one reviewer. `Debug` never prints token values.
#[derive(Clone, Debug, Deserialize)]
#[serde(from = "RawUserTokens")]
pub struct UserTokens {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl UserTokens {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: SecretString::from(refresh_token.into()),
            issued_at: None,
            expires_at: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|expires_at| expires_at <= now).unwrap_or(false)
    }
}

#[derive(Deserialize)]
struct RawUserTokens {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    issue_time: i64,
    #[serde(default)]
    expiry_time: i64,
}

impl From<RawUserTokens> for UserTokens {
    fn from(raw: RawUserTokens) -> Self {
        let unix = |seconds: i64| (seconds > 0).then(|| from_unix_seconds(seconds)).flatten();
        Self {
            access_token: SecretString::from(raw.access_token),
            refresh_token: SecretString::from(raw.refresh_token),
            issued_at: unix(raw.issue_time),
            expires_at: unix(raw.expiry_time),
        }
    }
}

/// Everything the secret store holds, keyed by reviewer login.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SecretPayload {
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub users: HashMap<String, UserTokens>,
}

impl SecretPayload {
    pub fn with_user(mut self, reviewer_login: impl Into<String>, tokens: UserTokens) -> Self {
        self.users.insert(reviewer_login.into(), tokens);
        self
    }
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn fetch_payload(&self) -> Result<SecretPayload, SecretStoreError>;
}

#[derive(Debug)]
struct CachedSnapshot {
    payload: Arc<SecretPayload>,
    expires_at: Instant,
}

impl CachedSnapshot {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

pub struct CredentialCache {
    store: Arc<dyn SecretStore>,
    ttl: Duration,
    snapshot: RwLock<Option<CachedSnapshot>>,
    refresh_gate: Mutex<()>,
}

impl CredentialCache {
    pub fn new(store: Arc<dyn SecretStore>, ttl: Duration) -> Self {
        Self { store, ttl, snapshot: RwLock::new(None), refresh_gate: Mutex::new(()) }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, reviewer_login: &str) -> Result<UserTokens, CredentialError> {
        if let Some(payload) = self.fresh_payload().await {
            return lookup(&payload, reviewer_login);
        }

        // Only one refresh at a time; late arrivals reuse what the winner fetched.
        let _gate = self.refresh_gate.lock().await;
        if let Some(payload) = self.fresh_payload().await {
            return lookup(&payload, reviewer_login);
        }

        let payload = self.refresh().await?;
        lookup(&payload, reviewer_login)
    }

    pub async fn invalidate(&self) {
        *self.snapshot.write().await = None;
    }

    /// Seeds the cache directly, skipping the secret store.
    pub async fn set_snapshot(&self, payload: SecretPayload, ttl: Duration) {
        *self.snapshot.write().await =
            Some(CachedSnapshot { payload: Arc::new(payload), expires_at: Instant::now() + ttl });
    }

    pub async fn has_fresh_snapshot(&self) -> bool {
        self.fresh_payload().await.is_some()
    }

    pub async fn store_tokens(
        &self,
        reviewer_login: &str,
        _tokens: UserTokens,
    ) -> Result<(), CredentialError> {
        self.invalidate().await;
        warn!(event_name = "credentials.write_rejected", reviewer_login, "token write-back is not supported");
        Err(CredentialError::NotImplemented("storing reviewer tokens"))
    }

    pub async fn delete_tokens(&self, reviewer_login: &str) -> Result<(), CredentialError> {
        self.invalidate().await;
        warn!(event_name = "credentials.write_rejected", reviewer_login, "token deletion is not supported");
        Err(CredentialError::NotImplemented("deleting reviewer tokens"))
    }

    async fn fresh_payload(&self) -> Option<Arc<SecretPayload>> {
        let snapshot = self.snapshot.read().await;
        match snapshot.as_ref() {
            Some(cached) if cached.is_fresh() => Some(Arc::clone(&cached.payload)),
            _ => None,
        }
    }

    async fn refresh(&self) -> Result<Arc<SecretPayload>, CredentialError> {
        match self.store.fetch_payload().await {
            Ok(payload) => {
                let payload = Arc::new(payload);
                *self.snapshot.write().await = Some(CachedSnapshot {
                    payload: Arc::clone(&payload),
                    expires_at: Instant::now() + self.ttl,
                });
                info!(
                    event_name = "credentials.refreshed",
                    version = payload.version,
                    reviewers = payload.users.len(),
                    "credential snapshot refreshed"
                );
                Ok(payload)
            }
            Err(error) => {
                *self.snapshot.write().await = None;
                warn!(event_name = "credentials.refresh_failed", error = %error, "credential refresh failed");
                Err(CredentialError::Fetch(error))
            }
        }
    }
}

fn lookup(payload: &SecretPayload, reviewer_login: &str) -> Result<UserTokens, CredentialError> {
    payload
        .users
        .get(reviewer_login)
        .cloned()
        .ok_or_else(|| CredentialError::NotFound { reviewer_login: reviewer_login.to_owned() })
}
