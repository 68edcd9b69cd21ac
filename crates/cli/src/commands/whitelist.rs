use slotguard_core::domain::whitelist::WhitelistEntry;
use slotguard_db::repositories::{SqlWhitelistRepository, WhitelistRepository};

use crate::commands::{run_with_pool, to_data, CommandResult, Failure};

pub fn list(reviewer_login: &str) -> CommandResult {
    run_with_pool("whitelist.list", |_config, pool| async move {
        let entries = SqlWhitelistRepository::new(pool).list_for_reviewer(reviewer_login).await?;
        Ok::<_, Failure>(CommandResult::success_with_data(
            "whitelist.list",
            format!("{} whitelist entries for {reviewer_login}", entries.len()),
            to_data(&entries),
        ))
    })
}

/// Exactly one of `project` and `family` must be given.
pub fn add(reviewer_login: &str, project: Option<&str>, family: Option<&str>) -> CommandResult {
    run_with_pool("whitelist.add", |_config, pool| async move {
        let entry = match (project, family) {
            (Some(name), None) => WhitelistEntry::project(reviewer_login, name.trim()),
            (None, Some(name)) => WhitelistEntry::family(reviewer_login, name.trim()),
            _ => return Err(Failure::invalid_input("pass exactly one of --project or --family")),
        };
        if entry.name.is_empty() {
            return Err(Failure::invalid_input("whitelist entry name must not be blank"));
        }

        let added = SqlWhitelistRepository::new(pool).add(&entry).await?;
        let message = if added {
            format!("whitelisted {} `{}` for {reviewer_login}", entry.entry_type.as_str(), entry.name)
        } else {
            format!("{} `{}` was already whitelisted", entry.entry_type.as_str(), entry.name)
        };
        Ok::<_, Failure>(CommandResult::success_with_data("whitelist.add", message, to_data(&entry)))
    })
}

pub fn remove(reviewer_login: &str, name: &str) -> CommandResult {
    run_with_pool("whitelist.remove", |_config, pool| async move {
        let removed = SqlWhitelistRepository::new(pool).remove(reviewer_login, name).await?;
        Ok::<_, Failure>(CommandResult::success(
            "whitelist.remove",
            format!("removed {removed} whitelist entries"),
        ))
    })
}
