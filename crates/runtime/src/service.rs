//! Review-request orchestration.
//!
//! Every status change goes through [`ReviewLifecycleService::advance`]: the pure engine
//! picks the next status, the store applies it as a compare-and-set, and side effects run
//! only when that write was ours. A stale write means another worker already moved the
//! request, so its effects are never repeated.
//!
//! Slot cancellations are the one effect that must eventually land. The status write marks
//! the cancellation as outstanding and a confirmed cancellation clears the mark; sweeps
//! retry whatever is still marked.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use slotguard_core::audit::{AuditContext, AuditSink};
use slotguard_core::config::SweepConfig;
use slotguard_core::credentials::CredentialCache;
use slotguard_core::domain::review::{ReviewRequest, ReviewRequestId, ReviewStatus};
use slotguard_core::domain::user::UserSettings;
use slotguard_core::lifecycle::{
    parse_callback_data, CallbackAction, LifecycleAction, LifecycleContext, LifecycleEngine,
    LifecycleEvent, LifecycleStep, NotificationKind,
};
use slotguard_core::time::{decision_deadline, decision_window_open, is_expired_at, non_whitelist_cancel_at_from};
use slotguard_db::repositories::{
    InMemoryProjectFamilyRepository, InMemoryReviewRequestRepository, InMemorySettingsRepository,
    InMemoryUserRepository, InMemoryWhitelistRepository, ProjectFamilyRepository,
    ReviewRequestRepository, SettingsRepository, SqlProjectFamilyRepository,
    SqlReviewRequestRepository, SqlSettingsRepository, SqlUserRepository, SqlWhitelistRepository,
    UserRepository, WhitelistRepository,
};
use slotguard_db::{DbPool, RepositoryError};

use crate::error::ServiceError;
use crate::messages;
use crate::ports::{MessageHandle, Messenger, Recipient, SchedulingApi};

#[derive(Clone)]
pub struct Repositories {
    pub review_requests: Arc<dyn ReviewRequestRepository>,
    pub users: Arc<dyn UserRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub whitelist: Arc<dyn WhitelistRepository>,
    pub project_families: Arc<dyn ProjectFamilyRepository>,
}

impl Repositories {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            review_requests: Arc::new(SqlReviewRequestRepository::new(pool.clone())),
            users: Arc::new(SqlUserRepository::new(pool.clone())),
            settings: Arc::new(SqlSettingsRepository::new(pool.clone())),
            whitelist: Arc::new(SqlWhitelistRepository::new(pool.clone())),
            project_families: Arc::new(SqlProjectFamilyRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            review_requests: Arc::new(InMemoryReviewRequestRepository::default()),
            users: Arc::new(InMemoryUserRepository::default()),
            settings: Arc::new(InMemorySettingsRepository::default()),
            whitelist: Arc::new(InMemoryWhitelistRepository::default()),
            project_families: Arc::new(InMemoryProjectFamilyRepository::default()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Upper bound for handling one request inside a sweep.
    pub request_timeout: Duration,
    /// How far ahead calendar sync looks for bookings.
    pub calendar_window: chrono::Duration,
    pub notification_page_size: i64,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(20),
            calendar_window: chrono::Duration::hours(24),
            notification_page_size: 50,
        }
    }
}

impl ServiceOptions {
    pub fn from_config(config: &SweepConfig) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            calendar_window: chrono::Duration::hours(i64::from(config.calendar_window_hours)),
            ..Self::default()
        }
    }
}

/// Result of feeding one trigger to a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Advance {
    Applied { request: ReviewRequest, follow_ups: Vec<LifecycleAction> },
    Stale,
    AlreadyFinal(ReviewStatus),
}

/// Latest known state of a request after a chain of triggers. `raced` is set when
/// another writer moved it during the chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Settled {
    pub request: ReviewRequest,
    pub raced: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecisionOutcome {
    Recorded(ReviewRequest),
    /// The request was already final, possibly decided by a concurrent sweep.
    AlreadyDecided(ReviewStatus),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub promoted: usize,
    pub prompted: usize,
    pub auto_cancelled: usize,
    pub auto_cancelled_not_whitelisted: usize,
    pub raced: usize,
    pub cancellations_retried: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl SweepReport {
    pub fn changed(&self) -> usize {
        self.promoted + self.prompted + self.auto_cancelled + self.auto_cancelled_not_whitelisted
    }

    fn record(&mut self, before: &ReviewRequest, settled: &Settled) {
        if settled.raced {
            self.raced += 1;
            return;
        }
        if before.slot_cancel_pending() && !settled.request.slot_cancel_pending() {
            self.cancellations_retried += 1;
        }
        let (before, after) = (before.status, settled.request.status);
        if before == after {
            return;
        }
        match after {
            ReviewStatus::AutoCancelled => self.auto_cancelled += 1,
            ReviewStatus::AutoCancelledNotWhitelisted => self.auto_cancelled_not_whitelisted += 1,
            ReviewStatus::WaitingForApprove => self.prompted += 1,
            _ if before == ReviewStatus::NotWhitelisted => self.promoted += 1,
            _ => {}
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SweepStage {
    PendingSlotCancel,
    DecisionExpired,
    KnownProject,
    NotWhitelisted,
    Whitelisted,
    NeedToApprove,
}

impl SweepStage {
    /// Outstanding cancellations from earlier passes go first, then decision timeouts. The
    /// whitelist re-check runs before any non-whitelist cancellation of the same request.
    const ORDER: [SweepStage; 6] = [
        Self::PendingSlotCancel,
        Self::DecisionExpired,
        Self::KnownProject,
        Self::NotWhitelisted,
        Self::Whitelisted,
        Self::NeedToApprove,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Self::PendingSlotCancel => "pending_slot_cancel",
            Self::DecisionExpired => "decision_expired",
            Self::KnownProject => "known_project",
            Self::NotWhitelisted => "not_whitelisted",
            Self::Whitelisted => "whitelisted",
            Self::NeedToApprove => "need_to_approve",
        }
    }
}

pub struct ReviewLifecycleService {
    pub(crate) repositories: Repositories,
    pub(crate) credentials: Arc<CredentialCache>,
    pub(crate) scheduling: Arc<dyn SchedulingApi>,
    pub(crate) messenger: Arc<dyn Messenger>,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) engine: LifecycleEngine,
    pub(crate) options: ServiceOptions,
}

impl ReviewLifecycleService {
    pub fn new(
        repositories: Repositories,
        credentials: Arc<CredentialCache>,
        scheduling: Arc<dyn SchedulingApi>,
        messenger: Arc<dyn Messenger>,
        audit: Arc<dyn AuditSink>,
        options: ServiceOptions,
    ) -> Self {
        Self {
            repositories,
            credentials,
            scheduling,
            messenger,
            audit,
            engine: LifecycleEngine::new(),
            options,
        }
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repositories
    }

    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Starts tracking a booked slot. Returns `None` when the slot already has a request,
    /// including one created concurrently by another worker.
    pub async fn discover_booking(
        &self,
        reviewer_login: &str,
        calendar_slot_id: &str,
        booking_id: &str,
        review_start_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<ReviewRequest>, ServiceError> {
        if self.repositories.review_requests.find_by_calendar_slot_id(calendar_slot_id).await?.is_some() {
            debug!(
                event_name = "lifecycle.booking_known",
                reviewer_login,
                calendar_slot_id,
                "booking already tracked"
            );
            return Ok(None);
        }

        let request = ReviewRequest::discovered(
            reviewer_login,
            calendar_slot_id,
            booking_id,
            review_start_time,
            now,
        );
        match self.repositories.review_requests.create(&request).await {
            Ok(()) => {
                info!(
                    event_name = "lifecycle.request_discovered",
                    review_request_id = %request.id,
                    reviewer_login,
                    calendar_slot_id,
                    "review request created for booked slot"
                );
                Ok(Some(request))
            }
            Err(RepositoryError::Conflict(_)) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    /// Records the project of a freshly discovered request and runs the whitelist gate.
    pub async fn resolve_project(
        &self,
        request: &ReviewRequest,
        project_name: &str,
        notification_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ReviewRequest, ServiceError> {
        let settings = self.settings_for(&request.reviewer_login).await?;
        let family_label = self.repositories.project_families.family_for_project(project_name).await?;
        let event = LifecycleEvent::ProjectResolved {
            project_name: project_name.to_string(),
            family_label,
            notification_id,
        };

        let settled = match self.advance(request, event, &settings, "calendar_sync").await? {
            Advance::Applied { request: updated, follow_ups }
                if follow_ups.contains(&LifecycleAction::CheckWhitelist) =>
            {
                self.check_whitelist_with(&updated, &settings, now, "calendar_sync").await?
            }
            other => self.settle(request, other).await?,
        };
        Ok(settled.request)
    }

    /// Runs the whitelist gate for a request whose project is known.
    pub async fn check_whitelist(
        &self,
        request: &ReviewRequest,
        now: DateTime<Utc>,
    ) -> Result<ReviewRequest, ServiceError> {
        let settings = self.settings_for(&request.reviewer_login).await?;
        Ok(self.check_whitelist_with(request, &settings, now, "lifecycle").await?.request)
    }

    /// Applies the reviewer's answer to a pending prompt.
    pub async fn record_decision(
        &self,
        review_request_id: &ReviewRequestId,
        action: CallbackAction,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome, ServiceError> {
        let request = self.require_request(review_request_id).await?;
        let settings = self.settings_for(&request.reviewer_login).await?;
        let event = match action {
            CallbackAction::Approve => LifecycleEvent::ReviewerApproved { at: now },
            CallbackAction::Decline => LifecycleEvent::ReviewerDeclined { at: now },
        };

        match self.advance(&request, event, &settings, "reviewer").await? {
            Advance::Applied { request, .. } => Ok(DecisionOutcome::Recorded(request)),
            Advance::AlreadyFinal(status) => Ok(DecisionOutcome::AlreadyDecided(status)),
            Advance::Stale => {
                let current = self.require_request(review_request_id).await?;
                Ok(DecisionOutcome::AlreadyDecided(current.status))
            }
        }
    }

    /// Handles a button press. The chat must belong to the request's reviewer.
    pub async fn handle_callback(
        &self,
        raw: &str,
        chat_id: i64,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome, ServiceError> {
        let data = parse_callback_data(raw)?;
        let request = self.require_request(&data.review_request_id).await?;
        let owner = self.repositories.users.find_by_telegram_chat_id(chat_id).await?;
        if owner.map(|user| user.reviewer_login) != Some(request.reviewer_login.clone()) {
            warn!(
                event_name = "lifecycle.callback_foreign_chat",
                review_request_id = %request.id,
                chat_id,
                "callback from a chat that does not own the request"
            );
            return Err(ServiceError::NotFound {
                entity: "review request",
                key: data.review_request_id.0,
            });
        }

        self.record_decision(&data.review_request_id, data.action, now).await
    }

    /// One pass over every in-flight request. Each request is bounded by the configured
    /// timeout; failures are counted and left for the next pass.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, ServiceError> {
        let mut report = SweepReport::default();

        for stage in SweepStage::ORDER {
            let requests = self.stage_requests(stage, now).await?;
            for request in requests {
                report.examined += 1;
                let bounded =
                    tokio::time::timeout(self.options.request_timeout, self.sweep_request(stage, &request, now))
                        .await;
                match bounded {
                    Ok(Ok(settled)) => report.record(&request, &settled),
                    Ok(Err(error)) => {
                        report.failed += 1;
                        warn!(
                            event_name = "sweep.request_failed",
                            stage = stage.as_str(),
                            review_request_id = %request.id,
                            reviewer_login = %request.reviewer_login,
                            error = %error,
                            "sweep could not process review request"
                        );
                    }
                    Err(_) => {
                        report.timed_out += 1;
                        warn!(
                            event_name = "sweep.request_timed_out",
                            stage = stage.as_str(),
                            review_request_id = %request.id,
                            reviewer_login = %request.reviewer_login,
                            timeout_secs = self.options.request_timeout.as_secs(),
                            "sweep gave up on review request"
                        );
                    }
                }
            }
        }

        info!(
            event_name = "sweep.completed",
            examined = report.examined,
            promoted = report.promoted,
            prompted = report.prompted,
            auto_cancelled = report.auto_cancelled,
            auto_cancelled_not_whitelisted = report.auto_cancelled_not_whitelisted,
            raced = report.raced,
            cancellations_retried = report.cancellations_retried,
            failed = report.failed,
            timed_out = report.timed_out,
            "sweep completed"
        );
        Ok(report)
    }

    async fn stage_requests(
        &self,
        stage: SweepStage,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReviewRequest>, ServiceError> {
        let store = &self.repositories.review_requests;
        let requests = match stage {
            SweepStage::PendingSlotCancel => {
                // An attempt younger than one request timeout may still be in flight.
                let lease = chrono::Duration::from_std(self.options.request_timeout)
                    .unwrap_or_else(|_| chrono::Duration::zero());
                store.list_pending_slot_cancellations(now - lease).await?
            }
            SweepStage::DecisionExpired => store.list_expired_waiting_for_approve(now).await?,
            SweepStage::KnownProject => store.list_by_statuses(&[ReviewStatus::KnownProjectReview]).await?,
            SweepStage::NotWhitelisted => store.list_by_statuses(&[ReviewStatus::NotWhitelisted]).await?,
            SweepStage::Whitelisted => store.list_by_statuses(&[ReviewStatus::Whitelisted]).await?,
            SweepStage::NeedToApprove => store.list_by_statuses(&[ReviewStatus::NeedToApprove]).await?,
        };
        Ok(requests)
    }

    async fn sweep_request(
        &self,
        stage: SweepStage,
        request: &ReviewRequest,
        now: DateTime<Utc>,
    ) -> Result<Settled, ServiceError> {
        let settings = self.settings_for(&request.reviewer_login).await?;
        match stage {
            SweepStage::PendingSlotCancel => self.retry_slot_cancel(request, now).await,
            SweepStage::DecisionExpired => {
                let advance = self
                    .advance(request, LifecycleEvent::DecisionDeadlinePassed { at: now }, &settings, "sweep")
                    .await?;
                self.settle(request, advance).await
            }
            SweepStage::KnownProject => self.check_whitelist_with(request, &settings, now, "sweep").await,
            SweepStage::NotWhitelisted => self.recheck_not_whitelisted(request, &settings, now).await,
            SweepStage::Whitelisted => self.open_decision_window(request, &settings, now, "sweep").await,
            SweepStage::NeedToApprove => self.prompt_reviewer(request, &settings, now, "sweep").await,
        }
    }

    /// Takes over an outstanding slot cancellation. The claim is a conditioned write on the
    /// last attempt time, so concurrent sweeps retry a given slot at most once.
    async fn retry_slot_cancel(
        &self,
        request: &ReviewRequest,
        now: DateTime<Utc>,
    ) -> Result<Settled, ServiceError> {
        let Some(last_attempt) = request.slot_cancel_attempted_at else {
            return Ok(Settled { request: request.clone(), raced: false });
        };
        let claimed = self
            .repositories
            .review_requests
            .claim_slot_cancellation(&request.id, last_attempt, now)
            .await?;
        if !claimed.is_applied() {
            return self.settle(request, Advance::Stale).await;
        }

        info!(
            event_name = "lifecycle.slot_cancel_retry",
            review_request_id = %request.id,
            reviewer_login = %request.reviewer_login,
            calendar_slot_id = %request.calendar_slot_id,
            last_attempt = %last_attempt,
            "retrying outstanding slot cancellation"
        );
        self.try_cancel_slot(request).await?;
        log_slot_cancelled(request);

        let mut cancelled = request.clone();
        cancelled.slot_cancel_attempted_at = None;
        Ok(Settled { request: cancelled, raced: false })
    }

    /// Membership is re-read before the cancel deadline is looked at, so a reviewer who
    /// whitelisted the project in time always wins.
    async fn recheck_not_whitelisted(
        &self,
        request: &ReviewRequest,
        settings: &UserSettings,
        now: DateTime<Utc>,
    ) -> Result<Settled, ServiceError> {
        if self.is_whitelisted(request).await? {
            return match self.advance(request, LifecycleEvent::WhitelistMatched, settings, "sweep").await? {
                Advance::Applied { request: updated, .. } => {
                    self.open_decision_window(&updated, settings, now, "sweep").await
                }
                other => self.settle(request, other).await,
            };
        }

        let expired = request.non_whitelist_cancel_at.is_some_and(|cancel_at| is_expired_at(now, cancel_at));
        if !expired {
            return Ok(Settled { request: request.clone(), raced: false });
        }

        let advance = self
            .advance(request, LifecycleEvent::NonWhitelistDeadlinePassed { at: now }, settings, "sweep")
            .await?;
        self.settle(request, advance).await
    }

    async fn check_whitelist_with(
        &self,
        request: &ReviewRequest,
        settings: &UserSettings,
        now: DateTime<Utc>,
        actor: &'static str,
    ) -> Result<Settled, ServiceError> {
        let event = if self.is_whitelisted(request).await? {
            LifecycleEvent::WhitelistMatched
        } else {
            LifecycleEvent::WhitelistMissed {
                cancel_at: non_whitelist_cancel_at_from(now, settings.non_whitelist_cancel_delay_minutes),
            }
        };

        match self.advance(request, event, settings, actor).await? {
            Advance::Applied { request: updated, .. } if updated.status == ReviewStatus::Whitelisted => {
                self.open_decision_window(&updated, settings, now, actor).await
            }
            other => self.settle(request, other).await,
        }
    }

    async fn open_decision_window(
        &self,
        request: &ReviewRequest,
        settings: &UserSettings,
        now: DateTime<Utc>,
        actor: &'static str,
    ) -> Result<Settled, ServiceError> {
        if !decision_window_open(now, request.review_start_time, settings.response_deadline_shift_minutes) {
            return Ok(Settled { request: request.clone(), raced: false });
        }

        match self.advance(request, LifecycleEvent::DecisionWindowOpened, settings, actor).await? {
            Advance::Applied { request: updated, follow_ups }
                if follow_ups.contains(&LifecycleAction::PromptReviewer) =>
            {
                self.prompt_reviewer(&updated, settings, now, actor).await
            }
            other => self.settle(request, other).await,
        }
    }

    /// Sends the approve/decline prompt. Delivery failures leave the request in
    /// NEED_TO_APPROVE so the next sweep prompts again.
    async fn prompt_reviewer(
        &self,
        request: &ReviewRequest,
        settings: &UserSettings,
        now: DateTime<Utc>,
        actor: &'static str,
    ) -> Result<Settled, ServiceError> {
        let deadline = decision_deadline(request.review_start_time, settings.response_deadline_shift_minutes);
        if is_expired_at(now, deadline) {
            return self.expire_unprompted(request, settings, deadline, now, actor).await;
        }

        let unchanged = Settled { request: request.clone(), raced: false };
        let Some(recipient) = self.recipient(&request.reviewer_login).await? else {
            warn!(
                event_name = "lifecycle.prompt_skipped",
                review_request_id = %request.id,
                reviewer_login = %request.reviewer_login,
                "reviewer has no chat to prompt"
            );
            return Ok(unchanged);
        };

        let text = messages::decision_prompt(request, deadline);
        let handle = match self
            .messenger
            .notify(&recipient, &text, &messages::decision_buttons(request))
            .await
        {
            Ok(handle) => handle,
            Err(error) => {
                warn!(
                    event_name = "lifecycle.prompt_failed",
                    review_request_id = %request.id,
                    reviewer_login = %request.reviewer_login,
                    error = %error,
                    "decision prompt not delivered"
                );
                return Ok(unchanged);
            }
        };

        let event = LifecycleEvent::ReviewerPrompted {
            decision_deadline: deadline,
            telegram_message_id: Some(handle.message_id.clone()),
        };
        let advance = self.advance(request, event, settings, actor).await?;
        if !matches!(advance, Advance::Applied { .. }) {
            // Another worker prompted first; drop the duplicate.
            if let Err(error) = self.messenger.delete(&handle).await {
                warn!(
                    event_name = "lifecycle.prompt_cleanup_failed",
                    review_request_id = %request.id,
                    error = %error,
                    "duplicate prompt could not be deleted"
                );
            }
        }
        self.settle(request, advance).await
    }

    /// The answer window closed before a prompt went out. No prompt is sent; the request is
    /// recorded as waiting and expires in the same pass.
    async fn expire_unprompted(
        &self,
        request: &ReviewRequest,
        settings: &UserSettings,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
        actor: &'static str,
    ) -> Result<Settled, ServiceError> {
        info!(
            event_name = "lifecycle.prompt_too_late",
            review_request_id = %request.id,
            reviewer_login = %request.reviewer_login,
            decision_deadline = %deadline,
            "decision deadline passed before the reviewer was prompted"
        );

        let prompted = LifecycleEvent::ReviewerPrompted { decision_deadline: deadline, telegram_message_id: None };
        match self.advance(request, prompted, settings, actor).await? {
            Advance::Applied { request: waiting, .. } => {
                let expired = self
                    .advance(&waiting, LifecycleEvent::DecisionDeadlinePassed { at: now }, settings, actor)
                    .await?;
                self.settle(&waiting, expired).await
            }
            other => self.settle(request, other).await,
        }
    }

    /// Applies one trigger: engine decision, conditioned write, then the side effects of
    /// a write that landed. Follow-up transitions are handed back to the caller.
    pub(crate) async fn advance(
        &self,
        request: &ReviewRequest,
        event: LifecycleEvent,
        settings: &UserSettings,
        actor: &'static str,
    ) -> Result<Advance, ServiceError> {
        let context = LifecycleContext::from(settings);
        let audit = AuditContext::new(
            Some(request.id.clone()),
            Some(request.reviewer_login.clone()),
            request.id.0.clone(),
            actor,
        );
        let step =
            self.engine.apply_with_audit(request.status, &event, &context, self.audit.as_ref(), &audit)?;
        let outcome = match step {
            LifecycleStep::AlreadyFinal(status) => return Ok(Advance::AlreadyFinal(status)),
            LifecycleStep::Applied(outcome) => outcome,
        };

        let written = self
            .repositories
            .review_requests
            .compare_and_set_status(&request.id, &outcome.transition)
            .await?;
        if !written.is_applied() {
            info!(
                event_name = "lifecycle.stale_write",
                review_request_id = %request.id,
                reviewer_login = %request.reviewer_login,
                expected = outcome.from.as_str(),
                "status moved concurrently; trigger dropped"
            );
            return Ok(Advance::Stale);
        }

        let mut updated = request.clone();
        updated.apply_transition(&outcome.transition);
        info!(
            event_name = "lifecycle.status_changed",
            review_request_id = %updated.id,
            reviewer_login = %updated.reviewer_login,
            from = outcome.from.as_str(),
            to = outcome.to.as_str(),
            trigger = event.name(),
            "review request status changed"
        );

        let mut follow_ups = Vec::new();
        for action in outcome.actions {
            match action {
                LifecycleAction::CancelSlot => {
                    if self.cancel_slot(&updated).await {
                        updated.slot_cancel_attempted_at = None;
                    }
                }
                LifecycleAction::ResolvePrompt => self.resolve_prompt(&updated).await,
                LifecycleAction::NotifyReviewer(kind) => self.notify_reviewer(&updated, kind).await,
                LifecycleAction::CheckWhitelist | LifecycleAction::PromptReviewer => {
                    follow_ups.push(action)
                }
            }
        }

        Ok(Advance::Applied { request: updated, follow_ups })
    }

    pub(crate) async fn settle(
        &self,
        request: &ReviewRequest,
        advance: Advance,
    ) -> Result<Settled, ServiceError> {
        match advance {
            Advance::Applied { request, .. } => Ok(Settled { request, raced: false }),
            Advance::Stale | Advance::AlreadyFinal(_) => {
                let current = self.repositories.review_requests.find_by_id(&request.id).await?;
                Ok(Settled { request: current.unwrap_or_else(|| request.clone()), raced: true })
            }
        }
    }

    pub(crate) async fn settings_for(&self, reviewer_login: &str) -> Result<UserSettings, ServiceError> {
        Ok(self.repositories.settings.ensure_defaults(reviewer_login).await?)
    }

    async fn is_whitelisted(&self, request: &ReviewRequest) -> Result<bool, ServiceError> {
        Ok(self
            .repositories
            .whitelist
            .is_whitelisted(
                &request.reviewer_login,
                request.project_name.as_deref(),
                request.family_label.as_deref(),
            )
            .await?)
    }

    async fn require_request(&self, id: &ReviewRequestId) -> Result<ReviewRequest, ServiceError> {
        self.repositories
            .review_requests
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound { entity: "review request", key: id.0.clone() })
    }

    async fn recipient(&self, reviewer_login: &str) -> Result<Option<Recipient>, ServiceError> {
        let user = self.repositories.users.find_by_login(reviewer_login).await?;
        Ok(user.map(|user| Recipient { reviewer_login: user.reviewer_login, chat_id: user.telegram_chat_id }))
    }

    async fn cancel_slot(&self, request: &ReviewRequest) -> bool {
        match self.try_cancel_slot(request).await {
            Ok(()) => {
                log_slot_cancelled(request);
                true
            }
            Err(error) => {
                error!(
                    event_name = "lifecycle.cancel_slot_failed",
                    review_request_id = %request.id,
                    reviewer_login = %request.reviewer_login,
                    calendar_slot_id = %request.calendar_slot_id,
                    error = %error,
                    "slot cancellation not confirmed; left for the next sweep"
                );
                false
            }
        }
    }

    /// Cancels on the platform, then clears the outstanding mark.
    async fn try_cancel_slot(&self, request: &ReviewRequest) -> Result<(), ServiceError> {
        let tokens = self.credentials.get(&request.reviewer_login).await?;
        self.scheduling.cancel_slot(&tokens, &request.calendar_slot_id).await?;
        self.repositories.review_requests.complete_slot_cancellation(&request.id).await?;
        Ok(())
    }

    async fn resolve_prompt(&self, request: &ReviewRequest) {
        if let Err(error) = self.try_resolve_prompt(request).await {
            warn!(
                event_name = "lifecycle.resolve_prompt_failed",
                review_request_id = %request.id,
                error = %error,
                "decision prompt could not be updated"
            );
        }
    }

    async fn try_resolve_prompt(&self, request: &ReviewRequest) -> Result<(), ServiceError> {
        let Some(message_id) = request.telegram_message_id.clone() else {
            return Ok(());
        };
        let Some(recipient) = self.recipient(&request.reviewer_login).await? else {
            return Ok(());
        };
        let handle = MessageHandle { chat_id: recipient.chat_id, message_id };
        self.messenger.edit(&handle, &messages::resolved_prompt(request, request.status)).await?;
        Ok(())
    }

    async fn notify_reviewer(&self, request: &ReviewRequest, kind: NotificationKind) {
        if let Err(error) = self.try_notify_reviewer(request, kind).await {
            warn!(
                event_name = "lifecycle.notify_failed",
                review_request_id = %request.id,
                error = %error,
                "reviewer notification not delivered"
            );
        }
    }

    async fn try_notify_reviewer(
        &self,
        request: &ReviewRequest,
        kind: NotificationKind,
    ) -> Result<(), ServiceError> {
        let Some(recipient) = self.recipient(&request.reviewer_login).await? else {
            return Ok(());
        };
        self.messenger.notify(&recipient, &messages::notification(request, kind), &[]).await?;
        Ok(())
    }
}

fn log_slot_cancelled(request: &ReviewRequest) {
    info!(
        event_name = "lifecycle.slot_cancelled",
        review_request_id = %request.id,
        reviewer_login = %request.reviewer_login,
        calendar_slot_id = %request.calendar_slot_id,
        "slot cancelled on the scheduling platform"
    );
}
