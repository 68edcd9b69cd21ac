use slotguard_core::domain::user::SettingUpdate;
use slotguard_db::repositories::{SettingsRepository, SqlSettingsRepository};

use crate::commands::{run_with_pool, to_data, CommandResult, Failure};

/// Prints the reviewer's settings, creating the default row on first use.
pub fn show(reviewer_login: &str) -> CommandResult {
    run_with_pool("settings.show", |_config, pool| async move {
        let settings = SqlSettingsRepository::new(pool).ensure_defaults(reviewer_login).await?;
        Ok::<_, Failure>(CommandResult::success_with_data(
            "settings.show",
            format!("settings for {reviewer_login}"),
            to_data(&settings),
        ))
    })
}

pub fn set(reviewer_login: &str, key: &str, value: &str) -> CommandResult {
    run_with_pool("settings.set", |_config, pool| async move {
        let update = SettingUpdate::parse(key, value).map_err(|error| {
            Failure::invalid_input(format!("{error} (known keys: {})", SettingUpdate::KEYS.join(", ")))
        })?;

        let repository = SqlSettingsRepository::new(pool);
        repository.ensure_defaults(reviewer_login).await?;
        repository.update(reviewer_login, update).await?;
        let settings = repository.ensure_defaults(reviewer_login).await?;
        Ok::<_, Failure>(CommandResult::success_with_data(
            "settings.set",
            format!("updated {} for {reviewer_login}", update.column()),
            to_data(&settings),
        ))
    })
}
