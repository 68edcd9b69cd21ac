use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use slotguard_core::domain::project::ProjectFamily;
use slotguard_core::domain::review::{ReviewRequest, ReviewRequestId, ReviewStatus, StatusTransition};
use slotguard_core::domain::user::{SettingUpdate, User, UserSettings, UserStatus};
use slotguard_core::domain::whitelist::WhitelistEntry;
use slotguard_core::time::decode_timestamp;

pub mod memory;
pub mod project_family;
pub mod review_request;
pub mod settings;
pub mod user;
pub mod whitelist;

pub use memory::{
    InMemoryProjectFamilyRepository, InMemoryReviewRequestRepository, InMemorySettingsRepository,
    InMemoryUserRepository, InMemoryWhitelistRepository,
};
pub use project_family::SqlProjectFamilyRepository;
pub use review_request::SqlReviewRequestRepository;
pub use settings::SqlSettingsRepository;
pub use user::SqlUserRepository;
pub use whitelist::SqlWhitelistRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Outcome of a conditioned status write. `Stale` means another writer moved the request
/// first; callers treat it as already handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionResult {
    Applied,
    Stale,
}

impl TransitionResult {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    pub(crate) fn from_rows_affected(rows: u64) -> Self {
        if rows == 1 {
            Self::Applied
        } else {
            Self::Stale
        }
    }
}

#[async_trait]
pub trait ReviewRequestRepository: Send + Sync {
    /// Fails with [`RepositoryError::Conflict`] when the slot already has a non-final request.
    async fn create(&self, request: &ReviewRequest) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &ReviewRequestId)
        -> Result<Option<ReviewRequest>, RepositoryError>;

    /// The active request for the slot, or the most recent final one.
    async fn find_by_calendar_slot_id(
        &self,
        calendar_slot_id: &str,
    ) -> Result<Option<ReviewRequest>, RepositoryError>;

    async fn list_by_statuses(
        &self,
        statuses: &[ReviewStatus],
    ) -> Result<Vec<ReviewRequest>, RepositoryError>;

    async fn list_by_reviewer_and_statuses(
        &self,
        reviewer_login: &str,
        statuses: &[ReviewStatus],
    ) -> Result<Vec<ReviewRequest>, RepositoryError>;

    async fn list_expired_waiting_for_approve(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReviewRequest>, RepositoryError>;

    async fn compare_and_set_status(
        &self,
        id: &ReviewRequestId,
        transition: &StatusTransition,
    ) -> Result<TransitionResult, RepositoryError>;

    /// Requests whose slot cancellation is outstanding and was last attempted at or
    /// before `attempted_before`.
    async fn list_pending_slot_cancellations(
        &self,
        attempted_before: DateTime<Utc>,
    ) -> Result<Vec<ReviewRequest>, RepositoryError>;

    /// Takes over an outstanding cancellation, conditioned on the attempt time last seen.
    async fn claim_slot_cancellation(
        &self,
        id: &ReviewRequestId,
        last_attempt: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<TransitionResult, RepositoryError>;

    /// Clears the outstanding marker once the platform confirmed the cancellation.
    async fn complete_slot_cancellation(
        &self,
        id: &ReviewRequestId,
    ) -> Result<TransitionResult, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_login(&self, reviewer_login: &str) -> Result<Option<User>, RepositoryError>;
    async fn find_by_telegram_chat_id(&self, chat_id: i64) -> Result<Option<User>, RepositoryError>;
    async fn upsert(&self, user: &User) -> Result<(), RepositoryError>;
    async fn update_status(
        &self,
        reviewer_login: &str,
        status: UserStatus,
    ) -> Result<bool, RepositoryError>;
    async fn list_active(&self) -> Result<Vec<User>, RepositoryError>;
    async fn record_auth_success(
        &self,
        reviewer_login: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
    async fn record_auth_failure(
        &self,
        reviewer_login: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn find(&self, reviewer_login: &str) -> Result<Option<UserSettings>, RepositoryError>;
    /// Inserts the default row when missing and returns the stored settings.
    async fn ensure_defaults(&self, reviewer_login: &str) -> Result<UserSettings, RepositoryError>;
    async fn upsert(&self, settings: &UserSettings) -> Result<(), RepositoryError>;
    /// Returns `false` when the reviewer has no settings row.
    async fn update(
        &self,
        reviewer_login: &str,
        update: SettingUpdate,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait WhitelistRepository: Send + Sync {
    async fn list_for_reviewer(
        &self,
        reviewer_login: &str,
    ) -> Result<Vec<WhitelistEntry>, RepositoryError>;
    /// Returns `false` when the entry already existed.
    async fn add(&self, entry: &WhitelistEntry) -> Result<bool, RepositoryError>;
    /// Removes every entry with this name regardless of type; returns how many went.
    async fn remove(&self, reviewer_login: &str, name: &str) -> Result<u64, RepositoryError>;
    async fn is_whitelisted(
        &self,
        reviewer_login: &str,
        project_name: Option<&str>,
        family_label: Option<&str>,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ProjectFamilyRepository: Send + Sync {
    /// Swaps the whole catalogue; readers see either the old or the new set.
    async fn replace_all(&self, families: &[ProjectFamily]) -> Result<(), RepositoryError>;
    async fn list_all(&self) -> Result<Vec<ProjectFamily>, RepositoryError>;
    async fn family_for_project(
        &self,
        project_name: &str,
    ) -> Result<Option<String>, RepositoryError>;
    async fn projects_in_family(&self, family_label: &str) -> Result<Vec<String>, RepositoryError>;
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    decode_timestamp(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
