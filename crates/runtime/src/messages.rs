//! Reviewer-facing message texts.

use chrono::{DateTime, Utc};

use slotguard_core::domain::review::{ReviewRequest, ReviewStatus};
use slotguard_core::lifecycle::{CallbackData, NotificationKind};
use slotguard_core::time::{format_for_message, format_short};

use crate::ports::InlineButton;

fn project_label(request: &ReviewRequest) -> &str {
    request.project_name.as_deref().unwrap_or("unknown project")
}

pub fn decision_prompt(request: &ReviewRequest, decision_deadline: DateTime<Utc>) -> String {
    let family = request
        .family_label
        .as_deref()
        .map(|family| format!(" ({family})"))
        .unwrap_or_default();
    format!(
        "New review booked: {}{family}\nStarts: {}\nConfirm before {} or the slot is cancelled.",
        project_label(request),
        format_for_message(request.review_start_time),
        format_for_message(decision_deadline),
    )
}

pub fn decision_buttons(request: &ReviewRequest) -> Vec<InlineButton> {
    vec![
        InlineButton::new("Approve", CallbackData::approve(&request.id).to_string()),
        InlineButton::new("Decline", CallbackData::decline(&request.id).to_string()),
    ]
}

/// Replacement text for the prompt once the request is final.
pub fn resolved_prompt(request: &ReviewRequest, status: ReviewStatus) -> String {
    let verdict = match status {
        ReviewStatus::Approved => "approved",
        ReviewStatus::Cancelled => "declined, slot cancelled",
        ReviewStatus::AutoCancelled => "no answer in time, slot cancelled",
        _ => status.as_str(),
    };
    format!(
        "Review {} at {}: {verdict}.",
        project_label(request),
        format_short(request.review_start_time)
    )
}

pub fn notification(request: &ReviewRequest, kind: NotificationKind) -> String {
    match kind {
        NotificationKind::DecisionTimedOut => format!(
            "The review of {} at {} was not confirmed in time and has been cancelled.",
            project_label(request),
            format_short(request.review_start_time)
        ),
        NotificationKind::NotWhitelistedCancelled => format!(
            "The review of {} at {} was cancelled: the project is not on your whitelist.",
            project_label(request),
            format_short(request.review_start_time)
        ),
    }
}
