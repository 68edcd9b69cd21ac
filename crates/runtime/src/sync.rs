//! Pulls state from the scheduling platform: booked slots become review requests, the
//! project catalogue is refreshed, and free slots close to their start are pushed back.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use slotguard_core::credentials::UserTokens;
use slotguard_core::domain::calendar::{find_notification_for_slot, CalendarBooking, ExternalNotification};
use slotguard_core::domain::project::extract_families;
use slotguard_core::time::{minutes, should_shift_slot_at, slot_duration_minutes};

use crate::error::ServiceError;
use crate::service::ReviewLifecycleService;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CalendarSyncReport {
    pub bookings_seen: usize,
    pub discovered: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub failed: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotShiftReport {
    pub shifted: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl ReviewLifecycleService {
    /// Turns every untracked booking in `[now, now + window]` into a review request and
    /// resolves its project from the booking task or, failing that, from the platform
    /// notification stamped at the slot start.
    pub async fn sync_calendar(
        &self,
        reviewer_login: &str,
        now: DateTime<Utc>,
    ) -> Result<CalendarSyncReport, ServiceError> {
        let tokens = self.credentials.get(reviewer_login).await?;
        let snapshot = self
            .scheduling
            .fetch_calendar_events(&tokens, now, now + self.options.calendar_window)
            .await?;

        let mut report = CalendarSyncReport { bookings_seen: snapshot.bookings.len(), ..Default::default() };
        let mut notifications: Option<Vec<ExternalNotification>> = None;

        for booking in &snapshot.bookings {
            let discovered = match self
                .discover_booking(reviewer_login, &booking.event_slot_id, &booking.id, booking.start, now)
                .await
            {
                Ok(Some(request)) => request,
                Ok(None) => continue,
                Err(error) => {
                    report.failed += 1;
                    warn!(
                        event_name = "calendar_sync.discover_failed",
                        reviewer_login,
                        booking_id = %booking.id,
                        error = %error,
                        "booking could not be tracked"
                    );
                    continue;
                }
            };
            report.discovered += 1;

            if booking.project_name.as_deref().map_or(true, str::is_empty) && notifications.is_none() {
                notifications = Some(self.load_notifications(reviewer_login, &tokens).await);
            }
            let Some((project_name, notification_id)) =
                project_for_booking(booking, notifications.as_deref().unwrap_or_default())
            else {
                report.unresolved += 1;
                info!(
                    event_name = "calendar_sync.project_unresolved",
                    review_request_id = %discovered.id,
                    reviewer_login,
                    "booking project not known yet"
                );
                continue;
            };

            match self.resolve_project(&discovered, &project_name, notification_id, now).await {
                Ok(_) => report.resolved += 1,
                Err(error) => {
                    report.failed += 1;
                    warn!(
                        event_name = "calendar_sync.resolve_failed",
                        review_request_id = %discovered.id,
                        reviewer_login,
                        error = %error,
                        "booking project could not be recorded"
                    );
                }
            }
        }

        info!(
            event_name = "calendar_sync.completed",
            reviewer_login,
            bookings_seen = report.bookings_seen,
            discovered = report.discovered,
            resolved = report.resolved,
            unresolved = report.unresolved,
            failed = report.failed,
            "calendar sync completed"
        );
        Ok(report)
    }

    /// Reloads the shared project catalogue from the reviewer's project graph.
    pub async fn refresh_project_families(&self, reviewer_login: &str) -> Result<usize, ServiceError> {
        let tokens = self.credentials.get(reviewer_login).await?;
        let student_id = self.scheduling.fetch_current_student_id(&tokens).await?;
        let graph = self.scheduling.fetch_project_graph(&tokens, &student_id).await?;
        let families = extract_families(&graph);

        self.repositories.project_families.replace_all(&families).await?;
        info!(
            event_name = "project_families.refreshed",
            reviewer_login,
            families = graph.nodes.len(),
            projects = families.len(),
            "project catalogue replaced"
        );
        Ok(families.len())
    }

    /// Moves free slots that start within the reviewer's threshold later by the shift
    /// duration, or deletes them when the remainder would be shorter than the cleanup
    /// duration.
    pub async fn shift_free_slots(
        &self,
        reviewer_login: &str,
        now: DateTime<Utc>,
    ) -> Result<SlotShiftReport, ServiceError> {
        let settings = self.settings_for(reviewer_login).await?;
        let tokens = self.credentials.get(reviewer_login).await?;
        let snapshot = self
            .scheduling
            .fetch_calendar_events(&tokens, now, now + self.options.calendar_window)
            .await?;

        let mut report = SlotShiftReport::default();
        for slot in snapshot.free_slots() {
            if !should_shift_slot_at(now, slot.start, settings.slot_shift_threshold_minutes) {
                continue;
            }

            let new_start = slot.start + minutes(settings.slot_shift_duration_minutes);
            let remaining = slot_duration_minutes(new_start, slot.end);
            let result = if remaining < i64::from(settings.cleanup_durations_minutes) {
                self.scheduling.delete_slot(&tokens, &slot.id).await.map(|()| {
                    report.deleted += 1;
                    "deleted"
                })
            } else {
                self.scheduling.shift_slot(&tokens, &slot.id, new_start, slot.end).await.map(|()| {
                    report.shifted += 1;
                    "shifted"
                })
            };

            match result {
                Ok(outcome) => info!(
                    event_name = "slot_shift.applied",
                    reviewer_login,
                    slot_id = %slot.id,
                    outcome,
                    remaining_minutes = remaining,
                    "free slot adjusted"
                ),
                Err(error) => {
                    report.failed += 1;
                    warn!(
                        event_name = "slot_shift.failed",
                        reviewer_login,
                        slot_id = %slot.id,
                        error = %error,
                        "free slot could not be adjusted"
                    );
                }
            }
        }

        Ok(report)
    }

    async fn load_notifications(
        &self,
        reviewer_login: &str,
        tokens: &UserTokens,
    ) -> Vec<ExternalNotification> {
        match self
            .scheduling
            .fetch_notifications(tokens, 0, self.options.notification_page_size)
            .await
        {
            Ok(notifications) => notifications,
            Err(error) => {
                warn!(
                    event_name = "calendar_sync.notifications_failed",
                    reviewer_login,
                    error = %error,
                    "notifications unavailable; bookings stay unresolved"
                );
                Vec::new()
            }
        }
    }
}

/// Project name and the notification it came from, if any.
fn project_for_booking(
    booking: &CalendarBooking,
    notifications: &[ExternalNotification],
) -> Option<(String, Option<String>)> {
    if let Some(project_name) = booking.project_name.as_deref().filter(|name| !name.is_empty()) {
        return Some((project_name.to_string(), None));
    }

    find_notification_for_slot(notifications, &booking.event_slot_id, booking.start)
        .filter(|notification| !notification.message.trim().is_empty())
        .map(|notification| (notification.message.trim().to_string(), Some(notification.id.clone())))
}
