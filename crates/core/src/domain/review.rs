use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewRequestId(pub String);

impl ReviewRequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ReviewRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a booked review slot.
///
/// The first six variants are intermediate and may still change; the last four are
/// final and absorb every further trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    UnknownProjectReview,
    KnownProjectReview,
    Whitelisted,
    NotWhitelisted,
    NeedToApprove,
    WaitingForApprove,
    Approved,
    Cancelled,
    AutoCancelled,
    AutoCancelledNotWhitelisted,
}

impl ReviewStatus {
    pub const ALL: [ReviewStatus; 10] = [
        Self::UnknownProjectReview,
        Self::KnownProjectReview,
        Self::Whitelisted,
        Self::NotWhitelisted,
        Self::NeedToApprove,
        Self::WaitingForApprove,
        Self::Approved,
        Self::Cancelled,
        Self::AutoCancelled,
        Self::AutoCancelledNotWhitelisted,
    ];

    pub const INTERMEDIATE: [ReviewStatus; 6] = [
        Self::UnknownProjectReview,
        Self::KnownProjectReview,
        Self::Whitelisted,
        Self::NotWhitelisted,
        Self::NeedToApprove,
        Self::WaitingForApprove,
    ];

    pub const FINAL: [ReviewStatus; 4] =
        [Self::Approved, Self::Cancelled, Self::AutoCancelled, Self::AutoCancelledNotWhitelisted];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownProjectReview => "UNKNOWN_PROJECT_REVIEW",
            Self::KnownProjectReview => "KNOWN_PROJECT_REVIEW",
            Self::Whitelisted => "WHITELISTED",
            Self::NotWhitelisted => "NOT_WHITELISTED",
            Self::NeedToApprove => "NEED_TO_APPROVE",
            Self::WaitingForApprove => "WAITING_FOR_APPROVE",
            Self::Approved => "APPROVED",
            Self::Cancelled => "CANCELLED",
            Self::AutoCancelled => "AUTO_CANCELLED",
            Self::AutoCancelledNotWhitelisted => "AUTO_CANCELLED_NOT_WHITELISTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|status| status.as_str() == normalized)
    }

    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Approved
                | Self::Cancelled
                | Self::AutoCancelled
                | Self::AutoCancelledNotWhitelisted
        )
    }

    pub fn is_intermediate(&self) -> bool {
        !self.is_final()
    }

    /// Final statuses that take the booked slot back from the scheduling platform.
    pub fn cancels_slot(&self) -> bool {
        matches!(self, Self::Cancelled | Self::AutoCancelled | Self::AutoCancelledNotWhitelisted)
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub id: ReviewRequestId,
    pub reviewer_login: String,
    pub calendar_slot_id: String,
    pub booking_id: String,
    pub project_name: Option<String>,
    pub family_label: Option<String>,
    pub status: ReviewStatus,
    pub review_start_time: DateTime<Utc>,
    pub decision_deadline: Option<DateTime<Utc>>,
    pub non_whitelist_cancel_at: Option<DateTime<Utc>>,
    pub notification_id: Option<String>,
    pub telegram_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    /// Set while the slot cancellation is outstanding; holds the start of the latest attempt.
    pub slot_cancel_attempted_at: Option<DateTime<Utc>>,
}

impl ReviewRequest {
    /// A freshly booked slot whose project is not known yet.
    pub fn discovered(
        reviewer_login: impl Into<String>,
        calendar_slot_id: impl Into<String>,
        booking_id: impl Into<String>,
        review_start_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReviewRequestId::generate(),
            reviewer_login: reviewer_login.into(),
            calendar_slot_id: calendar_slot_id.into(),
            booking_id: booking_id.into(),
            project_name: None,
            family_label: None,
            status: ReviewStatus::UnknownProjectReview,
            review_start_time,
            decision_deadline: None,
            non_whitelist_cancel_at: None,
            notification_id: None,
            telegram_message_id: None,
            created_at: now,
            decided_at: None,
            slot_cancel_attempted_at: None,
        }
    }

    /// At most one deadline is set, and only while in the status that owns it. A pending
    /// slot cancellation only exists on a cancelling final status.
    pub fn deadline_fields_consistent(&self) -> bool {
        let decision_ok =
            self.decision_deadline.is_none() || self.status == ReviewStatus::WaitingForApprove;
        let cancel_ok =
            self.non_whitelist_cancel_at.is_none() || self.status == ReviewStatus::NotWhitelisted;
        let slot_ok = self.slot_cancel_attempted_at.is_none() || self.status.cancels_slot();
        decision_ok && cancel_ok && slot_ok
    }

    pub fn slot_cancel_pending(&self) -> bool {
        self.slot_cancel_attempted_at.is_some()
    }

    /// Applies a conditioned write in memory. Returns `false` when the expected status
    /// does not match, leaving the request untouched.
    pub fn apply_transition(&mut self, transition: &StatusTransition) -> bool {
        if self.status != transition.expected() {
            return false;
        }

        let changes = transition.changes();
        self.status = transition.next();
        if let Some(project_name) = &changes.project_name {
            self.project_name = Some(project_name.clone());
        }
        if let Some(family_label) = &changes.family_label {
            self.family_label = Some(family_label.clone());
        }
        if let Some(notification_id) = &changes.notification_id {
            self.notification_id = Some(notification_id.clone());
        }
        if let Some(telegram_message_id) = &changes.telegram_message_id {
            self.telegram_message_id = Some(telegram_message_id.clone());
        }
        self.decision_deadline = changes.decision_deadline;
        self.non_whitelist_cancel_at = changes.non_whitelist_cancel_at;
        if changes.decided_at.is_some() {
            self.decided_at = changes.decided_at;
        }
        if changes.slot_cancel_attempted_at.is_some() {
            self.slot_cancel_attempted_at = changes.slot_cancel_attempted_at;
        }
        true
    }
}

/// Field updates that ride along with a status change. `None` keeps the stored value for
/// the descriptive fields; the two deadlines are always rewritten.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionChanges {
    pub project_name: Option<String>,
    pub family_label: Option<String>,
    pub notification_id: Option<String>,
    pub telegram_message_id: Option<String>,
    pub decision_deadline: Option<DateTime<Utc>>,
    pub non_whitelist_cancel_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
    /// Marks the slot cancellation as outstanding in the same write as the status change.
    pub slot_cancel_attempted_at: Option<DateTime<Utc>>,
}

/// Compare-and-set request for a review status.
///
/// Construction normalizes the deadline fields against `next`, so a persisted row can
/// only carry `decision_deadline` while waiting for approval and
/// `non_whitelist_cancel_at` while not whitelisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    expected: ReviewStatus,
    next: ReviewStatus,
    changes: TransitionChanges,
}

impl StatusTransition {
    pub fn new(expected: ReviewStatus, next: ReviewStatus, mut changes: TransitionChanges) -> Self {
        if next != ReviewStatus::WaitingForApprove {
            changes.decision_deadline = None;
        }
        if next != ReviewStatus::NotWhitelisted {
            changes.non_whitelist_cancel_at = None;
        }
        if !next.is_final() {
            changes.decided_at = None;
        }
        if !next.cancels_slot() {
            changes.slot_cancel_attempted_at = None;
        }
        Self { expected, next, changes }
    }

    pub fn expected(&self) -> ReviewStatus {
        self.expected
    }

    pub fn next(&self) -> ReviewStatus {
        self.next
    }

    pub fn changes(&self) -> &TransitionChanges {
        &self.changes
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{ReviewRequest, ReviewStatus, StatusTransition, TransitionChanges};

    fn request() -> ReviewRequest {
        let start = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).single().expect("valid time");
        ReviewRequest::discovered("alice", "slot-1", "booking-1", start, start - Duration::hours(3))
    }

    #[test]
    fn status_round_trips_from_storage_encoding() {
        for status in ReviewStatus::ALL {
            assert_eq!(ReviewStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReviewStatus::parse(" waiting_for_approve "), Some(ReviewStatus::WaitingForApprove));
        assert_eq!(ReviewStatus::parse("PENDING"), None);
    }

    #[test]
    fn final_and_intermediate_partition_all_statuses() {
        for status in ReviewStatus::FINAL {
            assert!(status.is_final());
        }
        for status in ReviewStatus::INTERMEDIATE {
            assert!(status.is_intermediate());
        }
        assert_eq!(ReviewStatus::FINAL.len() + ReviewStatus::INTERMEDIATE.len(), ReviewStatus::ALL.len());
    }

    #[test]
    fn transition_drops_deadline_that_does_not_belong_to_next_status() {
        let now = Utc::now();
        let transition = StatusTransition::new(
            ReviewStatus::KnownProjectReview,
            ReviewStatus::Whitelisted,
            TransitionChanges {
                decision_deadline: Some(now),
                non_whitelist_cancel_at: Some(now),
                decided_at: Some(now),
                ..TransitionChanges::default()
            },
        );

        assert_eq!(transition.changes().decision_deadline, None);
        assert_eq!(transition.changes().non_whitelist_cancel_at, None);
        assert_eq!(transition.changes().decided_at, None);
    }

    #[test]
    fn pending_slot_cancellation_only_rides_on_cancelling_statuses() {
        let now = Utc::now();
        let pending = TransitionChanges { slot_cancel_attempted_at: Some(now), ..TransitionChanges::default() };

        let approved =
            StatusTransition::new(ReviewStatus::WaitingForApprove, ReviewStatus::Approved, pending.clone());
        let declined = StatusTransition::new(ReviewStatus::WaitingForApprove, ReviewStatus::Cancelled, pending);

        assert_eq!(approved.changes().slot_cancel_attempted_at, None);
        assert_eq!(declined.changes().slot_cancel_attempted_at, Some(now));

        let mut request = request();
        request.status = ReviewStatus::WaitingForApprove;
        assert!(request.apply_transition(&declined));
        assert!(request.slot_cancel_pending());
        assert!(request.deadline_fields_consistent());

        request.status = ReviewStatus::Approved;
        assert!(!request.deadline_fields_consistent());
    }

    #[test]
    fn apply_transition_rejects_stale_expected_status() {
        let mut request = request();
        let transition = StatusTransition::new(
            ReviewStatus::WaitingForApprove,
            ReviewStatus::AutoCancelled,
            TransitionChanges::default(),
        );

        assert!(!request.apply_transition(&transition));
        assert_eq!(request.status, ReviewStatus::UnknownProjectReview);
    }

    #[test]
    fn apply_transition_clears_cancel_time_once_whitelisted() {
        let mut request = request();
        let cancel_at = Utc::now() + Duration::minutes(5);
        request.status = ReviewStatus::NotWhitelisted;
        request.non_whitelist_cancel_at = Some(cancel_at);
        request.project_name = Some("go-concurrency".to_string());

        let applied = request.apply_transition(&StatusTransition::new(
            ReviewStatus::NotWhitelisted,
            ReviewStatus::Whitelisted,
            TransitionChanges::default(),
        ));

        assert!(applied);
        assert_eq!(request.status, ReviewStatus::Whitelisted);
        assert_eq!(request.non_whitelist_cancel_at, None);
        assert_eq!(request.project_name.as_deref(), Some("go-concurrency"));
        assert!(request.deadline_fields_consistent());
    }
}
