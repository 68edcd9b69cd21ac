use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Some(Self::Active),
            "INACTIVE" => Some(Self::Inactive),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub reviewer_login: String,
    pub status: UserStatus,
    pub telegram_chat_id: i64,
    pub created_at: DateTime<Utc>,
    pub last_auth_success_at: Option<DateTime<Utc>>,
    pub last_auth_failure_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(reviewer_login: impl Into<String>, telegram_chat_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            reviewer_login: reviewer_login.into(),
            status: UserStatus::Active,
            telegram_chat_id,
            created_at: now,
            last_auth_success_at: None,
            last_auth_failure_at: None,
        }
    }
}

/// Per-reviewer knobs. One row per reviewer, created with [`UserSettings::defaults_for`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub reviewer_login: String,
    pub response_deadline_shift_minutes: i32,
    pub non_whitelist_cancel_delay_minutes: i32,
    pub notify_whitelist_timeout: bool,
    pub notify_non_whitelist_cancel: bool,
    pub slot_shift_threshold_minutes: i32,
    pub slot_shift_duration_minutes: i32,
    pub cleanup_durations_minutes: i32,
}

impl UserSettings {
    pub fn defaults_for(reviewer_login: impl Into<String>) -> Self {
        Self {
            reviewer_login: reviewer_login.into(),
            response_deadline_shift_minutes: 20,
            non_whitelist_cancel_delay_minutes: 5,
            notify_whitelist_timeout: true,
            notify_non_whitelist_cancel: true,
            slot_shift_threshold_minutes: 25,
            slot_shift_duration_minutes: 15,
            cleanup_durations_minutes: 15,
        }
    }

    pub fn apply(&mut self, update: SettingUpdate) {
        match update {
            SettingUpdate::ResponseDeadlineShiftMinutes(value) => {
                self.response_deadline_shift_minutes = value
            }
            SettingUpdate::NonWhitelistCancelDelayMinutes(value) => {
                self.non_whitelist_cancel_delay_minutes = value
            }
            SettingUpdate::NotifyWhitelistTimeout(value) => self.notify_whitelist_timeout = value,
            SettingUpdate::NotifyNonWhitelistCancel(value) => {
                self.notify_non_whitelist_cancel = value
            }
            SettingUpdate::SlotShiftThresholdMinutes(value) => {
                self.slot_shift_threshold_minutes = value
            }
            SettingUpdate::SlotShiftDurationMinutes(value) => {
                self.slot_shift_duration_minutes = value
            }
            SettingUpdate::CleanupDurationsMinutes(value) => self.cleanup_durations_minutes = value,
        }
    }
}

/// A single-field settings change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingUpdate {
    ResponseDeadlineShiftMinutes(i32),
    NonWhitelistCancelDelayMinutes(i32),
    NotifyWhitelistTimeout(bool),
    NotifyNonWhitelistCancel(bool),
    SlotShiftThresholdMinutes(i32),
    SlotShiftDurationMinutes(i32),
    CleanupDurationsMinutes(i32),
}

impl SettingUpdate {
    pub const KEYS: [&'static str; 7] = [
        "response_deadline_shift_minutes",
        "non_whitelist_cancel_delay_minutes",
        "notify_whitelist_timeout",
        "notify_non_whitelist_cancel",
        "slot_shift_threshold_minutes",
        "slot_shift_duration_minutes",
        "cleanup_durations_minutes",
    ];

    /// Storage column touched by this update.
    pub fn column(&self) -> &'static str {
        match self {
            Self::ResponseDeadlineShiftMinutes(_) => "response_deadline_shift_minutes",
            Self::NonWhitelistCancelDelayMinutes(_) => "non_whitelist_cancel_delay_minutes",
            Self::NotifyWhitelistTimeout(_) => "notify_whitelist_timeout",
            Self::NotifyNonWhitelistCancel(_) => "notify_non_whitelist_cancel",
            Self::SlotShiftThresholdMinutes(_) => "slot_shift_threshold_minutes",
            Self::SlotShiftDurationMinutes(_) => "slot_shift_duration_minutes",
            Self::CleanupDurationsMinutes(_) => "cleanup_durations_minutes",
        }
    }

    pub fn parse(key: &str, value: &str) -> Result<Self, DomainError> {
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        match key.as_str() {
            "response_deadline_shift_minutes" => {
                parse_minutes(&key, value).map(Self::ResponseDeadlineShiftMinutes)
            }
            "non_whitelist_cancel_delay_minutes" => {
                parse_minutes(&key, value).map(Self::NonWhitelistCancelDelayMinutes)
            }
            "notify_whitelist_timeout" => parse_flag(&key, value).map(Self::NotifyWhitelistTimeout),
            "notify_non_whitelist_cancel" => {
                parse_flag(&key, value).map(Self::NotifyNonWhitelistCancel)
            }
            "slot_shift_threshold_minutes" => {
                parse_minutes(&key, value).map(Self::SlotShiftThresholdMinutes)
            }
            "slot_shift_duration_minutes" => {
                parse_minutes(&key, value).map(Self::SlotShiftDurationMinutes)
            }
            "cleanup_durations_minutes" => {
                parse_minutes(&key, value).map(Self::CleanupDurationsMinutes)
            }
            other => Err(DomainError::InvariantViolation(format!(
                "unknown setting `{other}` (expected one of {})",
                Self::KEYS.join("|")
            ))),
        }
    }
}

fn parse_minutes(key: &str, value: &str) -> Result<i32, DomainError> {
    match value.parse::<i32>() {
        Ok(minutes) if minutes >= 0 => Ok(minutes),
        _ => Err(DomainError::InvariantViolation(format!(
            "setting `{key}` expects a non-negative number of minutes, got `{value}`"
        ))),
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, DomainError> {
    value.to_ascii_lowercase().parse::<bool>().map_err(|_| {
        DomainError::InvariantViolation(format!("setting `{key}` expects true|false, got `{value}`"))
    })
}

#[cfg(test)]
mod tests {
    use super::{SettingUpdate, UserSettings, UserStatus};

    #[test]
    fn defaults_match_product_settings() {
        let settings = UserSettings::defaults_for("alice");

        assert_eq!(settings.reviewer_login, "alice");
        assert_eq!(settings.response_deadline_shift_minutes, 20);
        assert_eq!(settings.non_whitelist_cancel_delay_minutes, 5);
        assert!(settings.notify_whitelist_timeout);
        assert!(settings.notify_non_whitelist_cancel);
        assert_eq!(settings.slot_shift_threshold_minutes, 25);
        assert_eq!(settings.slot_shift_duration_minutes, 15);
        assert_eq!(settings.cleanup_durations_minutes, 15);
    }

    #[test]
    fn setting_update_parses_and_applies() {
        let mut settings = UserSettings::defaults_for("alice");

        let update = SettingUpdate::parse("Response_Deadline_Shift_Minutes", " 30 ").expect("parse");
        assert_eq!(update.column(), "response_deadline_shift_minutes");
        settings.apply(update);
        settings.apply(SettingUpdate::parse("notify_whitelist_timeout", "FALSE").expect("parse"));

        assert_eq!(settings.response_deadline_shift_minutes, 30);
        assert!(!settings.notify_whitelist_timeout);
    }

    #[test]
    fn setting_update_rejects_unknown_keys_and_negative_minutes() {
        assert!(SettingUpdate::parse("favourite_colour", "blue").is_err());
        assert!(SettingUpdate::parse("cleanup_durations_minutes", "-1").is_err());
        assert!(SettingUpdate::parse("notify_non_whitelist_cancel", "maybe").is_err());
    }

    #[test]
    fn user_status_round_trips() {
        for status in [UserStatus::Active, UserStatus::Inactive] {
            assert_eq!(UserStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(UserStatus::parse("suspended"), None);
    }
}
