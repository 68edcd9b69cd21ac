use slotguard_core::domain::review::ReviewStatus;
use slotguard_db::repositories::{ReviewRequestRepository, SqlReviewRequestRepository};

use crate::commands::{run_with_pool, to_data, CommandResult, Failure};

/// Lists review requests, optionally narrowed to one reviewer. With no statuses given
/// only in-flight requests are shown.
pub fn list(reviewer_login: Option<&str>, statuses: &[String]) -> CommandResult {
    run_with_pool("requests.list", |_config, pool| async move {
        let statuses = parse_statuses(statuses)?;
        let repository = SqlReviewRequestRepository::new(pool);
        let requests = match reviewer_login {
            Some(login) => repository.list_by_reviewer_and_statuses(login, &statuses).await?,
            None => repository.list_by_statuses(&statuses).await?,
        };
        Ok::<_, Failure>(CommandResult::success_with_data(
            "requests.list",
            format!("{} review requests", requests.len()),
            to_data(&requests),
        ))
    })
}

fn parse_statuses(raw: &[String]) -> Result<Vec<ReviewStatus>, Failure> {
    if raw.is_empty() {
        return Ok(ReviewStatus::INTERMEDIATE.to_vec());
    }
    raw.iter()
        .map(|value| {
            ReviewStatus::parse(value)
                .ok_or_else(|| Failure::invalid_input(format!("unknown review status `{value}`")))
        })
        .collect()
}
