use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::review::{ReviewStatus, StatusTransition, TransitionChanges};
use crate::lifecycle::states::{
    LifecycleAction, LifecycleContext, LifecycleEvent, LifecycleStep, NotificationKind,
    TransitionOutcome,
};

/// Pure review-request state machine. Holds no state; every decision is a function of the
/// current status, the trigger and the reviewer's notification switches.
#[derive(Clone, Copy, Debug, Default)]
pub struct LifecycleEngine;

impl LifecycleEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn initial_status(&self) -> ReviewStatus {
        ReviewStatus::UnknownProjectReview
    }

    pub fn apply(
        &self,
        current: ReviewStatus,
        event: &LifecycleEvent,
        context: &LifecycleContext,
    ) -> Result<LifecycleStep, LifecycleError> {
        if current.is_final() {
            return Ok(LifecycleStep::AlreadyFinal(current));
        }
        transition(current, event, context).map(LifecycleStep::Applied)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: ReviewStatus,
        event: &LifecycleEvent,
        context: &LifecycleContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<LifecycleStep, LifecycleError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(LifecycleStep::Applied(outcome)) => sink.emit(
                AuditEvent::new(audit, "lifecycle.transition_applied", AuditCategory::Lifecycle)
                    .with_outcome(AuditOutcome::Success)
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", event.name()),
            ),
            Ok(LifecycleStep::AlreadyFinal(status)) => sink.emit(
                AuditEvent::new(audit, "lifecycle.trigger_absorbed", AuditCategory::Lifecycle)
                    .with_outcome(AuditOutcome::Success)
                    .with_metadata("status", status.as_str())
                    .with_metadata("event", event.name()),
            ),
            Err(error) => sink.emit(
                AuditEvent::new(audit, "lifecycle.transition_rejected", AuditCategory::Lifecycle)
                    .with_outcome(AuditOutcome::Rejected)
                    .with_metadata("error", error.to_string()),
            ),
        }
        result
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("invalid transition from {status} using event {event}")]
    InvalidTransition { status: ReviewStatus, event: &'static str },
}

fn transition(
    current: ReviewStatus,
    event: &LifecycleEvent,
    context: &LifecycleContext,
) -> Result<TransitionOutcome, LifecycleError> {
    use LifecycleAction::{CancelSlot, CheckWhitelist, NotifyReviewer, PromptReviewer, ResolvePrompt};
    use LifecycleEvent::{
        DecisionDeadlinePassed, DecisionWindowOpened, NonWhitelistDeadlinePassed,
        ProjectResolved, ReviewerApproved, ReviewerDeclined, ReviewerPrompted, WhitelistMatched,
        WhitelistMissed,
    };
    use ReviewStatus::{
        Approved, AutoCancelled, AutoCancelledNotWhitelisted, Cancelled, KnownProjectReview,
        NeedToApprove, NotWhitelisted, UnknownProjectReview, WaitingForApprove, Whitelisted,
    };

    let mut changes = TransitionChanges::default();
    let (to, actions) = match (current, event) {
        (UnknownProjectReview, ProjectResolved { project_name, family_label, notification_id }) => {
            changes.project_name = Some(project_name.clone());
            changes.family_label = family_label.clone();
            changes.notification_id = notification_id.clone();
            (KnownProjectReview, vec![CheckWhitelist])
        }
        (KnownProjectReview, WhitelistMatched) | (NotWhitelisted, WhitelistMatched) => {
            (Whitelisted, Vec::new())
        }
        (KnownProjectReview, WhitelistMissed { cancel_at }) => {
            changes.non_whitelist_cancel_at = Some(*cancel_at);
            (NotWhitelisted, Vec::new())
        }
        (NotWhitelisted, NonWhitelistDeadlinePassed { at }) => {
            changes.decided_at = Some(*at);
            changes.slot_cancel_attempted_at = Some(*at);
            let mut actions = vec![CancelSlot];
            if context.notify_non_whitelist_cancel {
                actions.push(NotifyReviewer(NotificationKind::NotWhitelistedCancelled));
            }
            (AutoCancelledNotWhitelisted, actions)
        }
        (Whitelisted, DecisionWindowOpened) => (NeedToApprove, vec![PromptReviewer]),
        (NeedToApprove, ReviewerPrompted { decision_deadline, telegram_message_id }) => {
            changes.decision_deadline = Some(*decision_deadline);
            changes.telegram_message_id = telegram_message_id.clone();
            (WaitingForApprove, Vec::new())
        }
        (WaitingForApprove, ReviewerApproved { at }) => {
            changes.decided_at = Some(*at);
            (Approved, vec![ResolvePrompt])
        }
        (WaitingForApprove, ReviewerDeclined { at }) => {
            changes.decided_at = Some(*at);
            changes.slot_cancel_attempted_at = Some(*at);
            (Cancelled, vec![CancelSlot, ResolvePrompt])
        }
        (WaitingForApprove, DecisionDeadlinePassed { at }) => {
            changes.decided_at = Some(*at);
            changes.slot_cancel_attempted_at = Some(*at);
            let mut actions = vec![CancelSlot, ResolvePrompt];
            if context.notify_whitelist_timeout {
                actions.push(NotifyReviewer(NotificationKind::DecisionTimedOut));
            }
            (AutoCancelled, actions)
        }
        _ => {
            return Err(LifecycleError::InvalidTransition { status: current, event: event.name() });
        }
    };

    Ok(TransitionOutcome {
        from: current,
        to,
        event: event.clone(),
        actions,
        transition: StatusTransition::new(current, to, changes),
    })
}
