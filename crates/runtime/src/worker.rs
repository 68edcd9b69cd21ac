use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use slotguard_core::time::now_utc;

use crate::error::ServiceError;
use crate::service::{ReviewLifecycleService, SweepReport};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub reviewers: usize,
    pub discovered: usize,
    pub slots_adjusted: usize,
    pub reviewer_failures: usize,
    pub sweep: SweepReport,
}

/// Completion time of the worker's last successful cycle.
#[derive(Clone, Debug)]
pub struct Heartbeat {
    last_cycle: watch::Receiver<Option<DateTime<Utc>>>,
}

impl Heartbeat {
    /// A heartbeat no worker updates.
    pub fn detached(last_cycle: Option<DateTime<Utc>>) -> Self {
        let (_sender, last_cycle) = watch::channel(last_cycle);
        Self { last_cycle }
    }

    pub fn last_cycle(&self) -> Option<DateTime<Utc>> {
        *self.last_cycle.borrow()
    }
}

/// Periodic driver: calendar sync and slot shifting per active reviewer, then one sweep.
pub struct SweepWorker {
    service: Arc<ReviewLifecycleService>,
    interval: Duration,
    heartbeat: watch::Sender<Option<DateTime<Utc>>>,
}

impl SweepWorker {
    pub fn new(service: Arc<ReviewLifecycleService>, interval: Duration) -> Self {
        let (heartbeat, _) = watch::channel(None);
        Self { service, interval, heartbeat }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn heartbeat(&self) -> Heartbeat {
        Heartbeat { last_cycle: self.heartbeat.subscribe() }
    }

    /// Runs cycles until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        self.refresh_catalogue().await;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            event_name = "worker.started",
            interval_secs = self.interval.as_secs(),
            "sweep worker started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = now_utc();
                    match self.run_cycle(now).await {
                        Ok(_) => {
                            self.heartbeat.send_replace(Some(now));
                        }
                        Err(error) => {
                            warn!(event_name = "worker.cycle_failed", error = %error, "worker cycle failed");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(event_name = "worker.stopped", "sweep worker stopped");
    }

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, ServiceError> {
        let reviewers = self.service.repositories().users.list_active().await?;
        let mut report = CycleReport { reviewers: reviewers.len(), ..CycleReport::default() };

        for reviewer in &reviewers {
            let login = reviewer.reviewer_login.as_str();
            match self.service.sync_calendar(login, now).await {
                Ok(sync) => report.discovered += sync.discovered,
                Err(error) => {
                    report.reviewer_failures += 1;
                    warn!(
                        event_name = "worker.calendar_sync_failed",
                        reviewer_login = login,
                        error = %error,
                        "calendar sync failed"
                    );
                }
            }
            match self.service.shift_free_slots(login, now).await {
                Ok(shift) => report.slots_adjusted += shift.shifted + shift.deleted,
                Err(error) => {
                    report.reviewer_failures += 1;
                    warn!(
                        event_name = "worker.slot_shift_failed",
                        reviewer_login = login,
                        error = %error,
                        "slot shifting failed"
                    );
                }
            }
        }

        report.sweep = self.service.sweep(now).await?;
        Ok(report)
    }

    /// The catalogue is global; the first reviewer whose tokens work refreshes it.
    async fn refresh_catalogue(&self) {
        let reviewers = match self.service.repositories().users.list_active().await {
            Ok(reviewers) => reviewers,
            Err(error) => {
                warn!(event_name = "worker.catalogue_skipped", error = %error, "no reviewers to refresh with");
                return;
            }
        };

        for reviewer in reviewers {
            match self.service.refresh_project_families(&reviewer.reviewer_login).await {
                Ok(_) => return,
                Err(error) => warn!(
                    event_name = "worker.catalogue_refresh_failed",
                    reviewer_login = %reviewer.reviewer_login,
                    error = %error,
                    "project catalogue refresh failed"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use slotguard_core::domain::calendar::{CalendarBooking, CalendarSnapshot};
    use slotguard_core::domain::review::ReviewStatus;
    use slotguard_core::domain::user::{User, UserStatus};
    use slotguard_core::domain::whitelist::WhitelistEntry;
    use tokio::sync::watch;

    use super::SweepWorker;
    use crate::fakes::{at, Harness};

    #[tokio::test]
    async fn cycle_syncs_active_reviewers_then_sweeps() {
        let harness = Harness::new().await;
        harness.repositories.users.upsert(&User::new("bob", 200, at(8, 0))).await.expect("bob");
        harness.repositories.users.update_status("bob", UserStatus::Inactive).await.expect("deactivate");
        harness
            .repositories
            .whitelist
            .add(&WhitelistEntry::project("alice", "go-concurrency"))
            .await
            .expect("whitelist");
        *harness.scheduling.calendar.lock().expect("calendar") = CalendarSnapshot {
            slots: Vec::new(),
            bookings: vec![CalendarBooking {
                id: "booking-1".to_string(),
                event_slot_id: "slot-1".to_string(),
                start: at(14, 0),
                end: at(14, 30),
                project_name: Some("go-concurrency".to_string()),
            }],
        };
        let worker = SweepWorker::new(Arc::clone(&harness.service), Duration::from_secs(60));

        let report = worker.run_cycle(at(13, 25)).await.expect("cycle");

        assert_eq!(report.reviewers, 1);
        assert_eq!(report.discovered, 1);
        assert_eq!(report.reviewer_failures, 0);
        let request = harness
            .repositories
            .review_requests
            .find_by_calendar_slot_id("slot-1")
            .await
            .expect("lookup")
            .expect("tracked");
        assert_eq!(request.status, ReviewStatus::WaitingForApprove);
        assert_eq!(harness.messenger.sent().len(), 1);
    }

    #[tokio::test]
    async fn worker_beats_after_a_cycle_and_stops_on_shutdown() {
        let harness = Harness::new().await;
        let worker = SweepWorker::new(Arc::clone(&harness.service), Duration::from_secs(3600));
        let heartbeat = worker.heartbeat();
        assert_eq!(heartbeat.last_cycle(), None);
        let (sender, receiver) = watch::channel(false);

        let handle = tokio::spawn(worker.run(receiver));
        tokio::time::timeout(Duration::from_secs(5), async {
            while heartbeat.last_cycle().is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("first cycle completes");
        sender.send(true).expect("worker listening");

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker stops")
            .expect("worker task");
    }
}
