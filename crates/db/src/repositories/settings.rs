use sqlx::Row;

use slotguard_core::domain::user::{SettingUpdate, UserSettings};

use super::{RepositoryError, SettingsRepository};
use crate::DbPool;

const COLUMNS: &str = "reviewer_login, response_deadline_shift_minutes,
                       non_whitelist_cancel_delay_minutes, notify_whitelist_timeout,
                       notify_non_whitelist_cancel, slot_shift_threshold_minutes,
                       slot_shift_duration_minutes, cleanup_durations_minutes";

pub struct SqlSettingsRepository {
    pool: DbPool,
}

impl SqlSettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_settings(row: &sqlx::sqlite::SqliteRow) -> Result<UserSettings, RepositoryError> {
    Ok(UserSettings {
        reviewer_login: row.try_get("reviewer_login")?,
        response_deadline_shift_minutes: row.try_get("response_deadline_shift_minutes")?,
        non_whitelist_cancel_delay_minutes: row.try_get("non_whitelist_cancel_delay_minutes")?,
        notify_whitelist_timeout: row.try_get("notify_whitelist_timeout")?,
        notify_non_whitelist_cancel: row.try_get("notify_non_whitelist_cancel")?,
        slot_shift_threshold_minutes: row.try_get("slot_shift_threshold_minutes")?,
        slot_shift_duration_minutes: row.try_get("slot_shift_duration_minutes")?,
        cleanup_durations_minutes: row.try_get("cleanup_durations_minutes")?,
    })
}

#[async_trait::async_trait]
impl SettingsRepository for SqlSettingsRepository {
    async fn find(&self, reviewer_login: &str) -> Result<Option<UserSettings>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {COLUMNS} FROM user_settings WHERE reviewer_login = ?"))
                .bind(reviewer_login)
                .fetch_optional(&self.pool)
                .await?;

        row.as_ref().map(row_to_settings).transpose()
    }

    async fn ensure_defaults(&self, reviewer_login: &str) -> Result<UserSettings, RepositoryError> {
        let defaults = UserSettings::defaults_for(reviewer_login);
        sqlx::query(&format!(
            "INSERT INTO user_settings ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(reviewer_login) DO NOTHING"
        ))
        .bind(&defaults.reviewer_login)
        .bind(defaults.response_deadline_shift_minutes)
        .bind(defaults.non_whitelist_cancel_delay_minutes)
        .bind(defaults.notify_whitelist_timeout)
        .bind(defaults.notify_non_whitelist_cancel)
        .bind(defaults.slot_shift_threshold_minutes)
        .bind(defaults.slot_shift_duration_minutes)
        .bind(defaults.cleanup_durations_minutes)
        .execute(&self.pool)
        .await?;

        self.find(reviewer_login).await?.ok_or_else(|| {
            RepositoryError::Decode(format!("settings for `{reviewer_login}` vanished after insert"))
        })
    }

    async fn upsert(&self, settings: &UserSettings) -> Result<(), RepositoryError> {
        sqlx::query(&format!(
            "INSERT INTO user_settings ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(reviewer_login) DO UPDATE SET
                 response_deadline_shift_minutes = excluded.response_deadline_shift_minutes,
                 non_whitelist_cancel_delay_minutes = excluded.non_whitelist_cancel_delay_minutes,
                 notify_whitelist_timeout = excluded.notify_whitelist_timeout,
                 notify_non_whitelist_cancel = excluded.notify_non_whitelist_cancel,
                 slot_shift_threshold_minutes = excluded.slot_shift_threshold_minutes,
                 slot_shift_duration_minutes = excluded.slot_shift_duration_minutes,
                 cleanup_durations_minutes = excluded.cleanup_durations_minutes"
        ))
        .bind(&settings.reviewer_login)
        .bind(settings.response_deadline_shift_minutes)
        .bind(settings.non_whitelist_cancel_delay_minutes)
        .bind(settings.notify_whitelist_timeout)
        .bind(settings.notify_non_whitelist_cancel)
        .bind(settings.slot_shift_threshold_minutes)
        .bind(settings.slot_shift_duration_minutes)
        .bind(settings.cleanup_durations_minutes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(
        &self,
        reviewer_login: &str,
        update: SettingUpdate,
    ) -> Result<bool, RepositoryError> {
        // Column names come from a closed enum, never from caller input.
        let sql = format!("UPDATE user_settings SET {} = ? WHERE reviewer_login = ?", update.column());
        let query = sqlx::query(&sql);
        let query = match update {
            SettingUpdate::ResponseDeadlineShiftMinutes(value)
            | SettingUpdate::NonWhitelistCancelDelayMinutes(value)
            | SettingUpdate::SlotShiftThresholdMinutes(value)
            | SettingUpdate::SlotShiftDurationMinutes(value)
            | SettingUpdate::CleanupDurationsMinutes(value) => query.bind(value),
            SettingUpdate::NotifyWhitelistTimeout(flag)
            | SettingUpdate::NotifyNonWhitelistCancel(flag) => query.bind(flag),
        };

        let result = query.bind(reviewer_login).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }
}
