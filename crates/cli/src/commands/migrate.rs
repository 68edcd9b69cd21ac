use slotguard_db::migrations;

use crate::commands::{run_with_pool, CommandResult, Failure};

pub fn run() -> CommandResult {
    run_with_pool("migrate", |_config, pool| async move {
        migrations::run_pending(&pool)
            .await
            .map_err(|error| Failure::new("migration", error.to_string(), 5))?;
        Ok::<_, Failure>(CommandResult::success("migrate", "applied pending migrations"))
    })
}
