use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::review::{ReviewStatus, StatusTransition};
use crate::domain::user::UserSettings;

/// Triggers that can move a review request forward.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    ProjectResolved {
        project_name: String,
        family_label: Option<String>,
        notification_id: Option<String>,
    },
    WhitelistMatched,
    WhitelistMissed {
        cancel_at: DateTime<Utc>,
    },
    DecisionWindowOpened,
    ReviewerPrompted {
        decision_deadline: DateTime<Utc>,
        telegram_message_id: Option<String>,
    },
    ReviewerApproved {
        at: DateTime<Utc>,
    },
    ReviewerDeclined {
        at: DateTime<Utc>,
    },
    DecisionDeadlinePassed {
        at: DateTime<Utc>,
    },
    NonWhitelistDeadlinePassed {
        at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProjectResolved { .. } => "project_resolved",
            Self::WhitelistMatched => "whitelist_matched",
            Self::WhitelistMissed { .. } => "whitelist_missed",
            Self::DecisionWindowOpened => "decision_window_opened",
            Self::ReviewerPrompted { .. } => "reviewer_prompted",
            Self::ReviewerApproved { .. } => "reviewer_approved",
            Self::ReviewerDeclined { .. } => "reviewer_declined",
            Self::DecisionDeadlinePassed { .. } => "decision_deadline_passed",
            Self::NonWhitelistDeadlinePassed { .. } => "non_whitelist_deadline_passed",
        }
    }
}

/// Per-reviewer switches that shape the emitted side effects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleContext {
    pub notify_whitelist_timeout: bool,
    pub notify_non_whitelist_cancel: bool,
}

impl Default for LifecycleContext {
    fn default() -> Self {
        Self { notify_whitelist_timeout: true, notify_non_whitelist_cancel: true }
    }
}

impl From<&UserSettings> for LifecycleContext {
    fn from(settings: &UserSettings) -> Self {
        Self {
            notify_whitelist_timeout: settings.notify_whitelist_timeout,
            notify_non_whitelist_cancel: settings.notify_non_whitelist_cancel,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    DecisionTimedOut,
    NotWhitelistedCancelled,
}

/// Side effects the caller must perform after the status write commits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleAction {
    CheckWhitelist,
    PromptReviewer,
    CancelSlot,
    /// Replace the prompt buttons with the final decision.
    ResolvePrompt,
    NotifyReviewer(NotificationKind),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ReviewStatus,
    pub to: ReviewStatus,
    pub event: LifecycleEvent,
    pub actions: Vec<LifecycleAction>,
    pub transition: StatusTransition,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleStep {
    Applied(TransitionOutcome),
    /// The request already reached a final status; the trigger is absorbed.
    AlreadyFinal(ReviewStatus),
}

impl LifecycleStep {
    pub fn outcome(&self) -> Option<&TransitionOutcome> {
        match self {
            Self::Applied(outcome) => Some(outcome),
            Self::AlreadyFinal(_) => None,
        }
    }
}
