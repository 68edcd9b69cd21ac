use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use slotguard_core::domain::project::ProjectFamily;
use slotguard_core::domain::review::{ReviewRequest, ReviewRequestId, ReviewStatus, StatusTransition};
use slotguard_core::domain::user::{SettingUpdate, User, UserSettings, UserStatus};
use slotguard_core::domain::whitelist::{self, WhitelistEntry};

use super::{
    ProjectFamilyRepository, RepositoryError, ReviewRequestRepository, SettingsRepository,
    TransitionResult, UserRepository, WhitelistRepository,
};

#[derive(Default)]
pub struct InMemoryReviewRequestRepository {
    requests: RwLock<HashMap<String, ReviewRequest>>,
}

impl InMemoryReviewRequestRepository {
    async fn collect_sorted<F>(&self, keep: F) -> Vec<ReviewRequest>
    where
        F: Fn(&ReviewRequest) -> bool,
    {
        let requests = self.requests.read().await;
        let mut matched: Vec<ReviewRequest> =
            requests.values().filter(|request| keep(request)).cloned().collect();
        matched.sort_by(|left, right| {
            left.review_start_time
                .cmp(&right.review_start_time)
                .then_with(|| left.id.0.cmp(&right.id.0))
        });
        matched
    }
}

#[async_trait::async_trait]
impl ReviewRequestRepository for InMemoryReviewRequestRepository {
    async fn create(&self, request: &ReviewRequest) -> Result<(), RepositoryError> {
        if !request.deadline_fields_consistent() {
            return Err(RepositoryError::Conflict(format!(
                "review request `{}` carries a deadline its status does not own",
                request.id
            )));
        }

        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id.0) {
            return Err(RepositoryError::Conflict(format!("review request `{}` exists", request.id)));
        }
        let slot_taken = request.status.is_intermediate()
            && requests.values().any(|existing| {
                existing.calendar_slot_id == request.calendar_slot_id
                    && existing.status.is_intermediate()
            });
        if slot_taken {
            return Err(RepositoryError::Conflict(format!(
                "calendar slot `{}` already has an active review request",
                request.calendar_slot_id
            )));
        }

        requests.insert(request.id.0.clone(), request.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &ReviewRequestId,
    ) -> Result<Option<ReviewRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn find_by_calendar_slot_id(
        &self,
        calendar_slot_id: &str,
    ) -> Result<Option<ReviewRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let found = requests
            .values()
            .filter(|request| request.calendar_slot_id == calendar_slot_id)
            .max_by(|left, right| {
                left.status
                    .is_intermediate()
                    .cmp(&right.status.is_intermediate())
                    .then_with(|| left.created_at.cmp(&right.created_at))
            })
            .cloned();
        Ok(found)
    }

    async fn list_by_statuses(
        &self,
        statuses: &[ReviewStatus],
    ) -> Result<Vec<ReviewRequest>, RepositoryError> {
        Ok(self.collect_sorted(|request| statuses.contains(&request.status)).await)
    }

    async fn list_by_reviewer_and_statuses(
        &self,
        reviewer_login: &str,
        statuses: &[ReviewStatus],
    ) -> Result<Vec<ReviewRequest>, RepositoryError> {
        Ok(self
            .collect_sorted(|request| {
                request.reviewer_login == reviewer_login && statuses.contains(&request.status)
            })
            .await)
    }

    async fn list_expired_waiting_for_approve(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReviewRequest>, RepositoryError> {
        let mut expired = self
            .collect_sorted(|request| {
                request.status == ReviewStatus::WaitingForApprove
                    && request.decision_deadline.is_some_and(|deadline| deadline <= now)
            })
            .await;
        expired.sort_by_key(|request| request.decision_deadline);
        Ok(expired)
    }

    async fn compare_and_set_status(
        &self,
        id: &ReviewRequestId,
        transition: &StatusTransition,
    ) -> Result<TransitionResult, RepositoryError> {
        let mut requests = self.requests.write().await;
        let applied =
            requests.get_mut(&id.0).is_some_and(|request| request.apply_transition(transition));
        Ok(if applied { TransitionResult::Applied } else { TransitionResult::Stale })
    }

    async fn list_pending_slot_cancellations(
        &self,
        attempted_before: DateTime<Utc>,
    ) -> Result<Vec<ReviewRequest>, RepositoryError> {
        let mut pending = self
            .collect_sorted(|request| {
                request.slot_cancel_attempted_at.is_some_and(|attempted| attempted <= attempted_before)
            })
            .await;
        pending.sort_by_key(|request| request.slot_cancel_attempted_at);
        Ok(pending)
    }

    async fn claim_slot_cancellation(
        &self,
        id: &ReviewRequestId,
        last_attempt: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<TransitionResult, RepositoryError> {
        let mut requests = self.requests.write().await;
        Ok(match requests.get_mut(&id.0) {
            Some(request) if request.slot_cancel_attempted_at == Some(last_attempt) => {
                request.slot_cancel_attempted_at = Some(now);
                TransitionResult::Applied
            }
            _ => TransitionResult::Stale,
        })
    }

    async fn complete_slot_cancellation(
        &self,
        id: &ReviewRequestId,
    ) -> Result<TransitionResult, RepositoryError> {
        let mut requests = self.requests.write().await;
        let cleared = requests
            .get_mut(&id.0)
            .and_then(|request| request.slot_cancel_attempted_at.take())
            .is_some();
        Ok(if cleared { TransitionResult::Applied } else { TransitionResult::Stale })
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_login(&self, reviewer_login: &str) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(reviewer_login).cloned())
    }

    async fn find_by_telegram_chat_id(&self, chat_id: i64) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .filter(|user| user.telegram_chat_id == chat_id)
            .min_by_key(|user| user.created_at)
            .cloned())
    }

    async fn upsert(&self, user: &User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        let created_at =
            users.get(&user.reviewer_login).map(|existing| existing.created_at).unwrap_or(user.created_at);
        users.insert(user.reviewer_login.clone(), User { created_at, ..user.clone() });
        Ok(())
    }

    async fn update_status(
        &self,
        reviewer_login: &str,
        status: UserStatus,
    ) -> Result<bool, RepositoryError> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(reviewer_login).map(|user| user.status = status).is_some())
    }

    async fn list_active(&self) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        let mut active: Vec<User> =
            users.values().filter(|user| user.status == UserStatus::Active).cloned().collect();
        active.sort_by(|left, right| left.reviewer_login.cmp(&right.reviewer_login));
        Ok(active)
    }

    async fn record_auth_success(
        &self,
        reviewer_login: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(reviewer_login).map(|user| user.last_auth_success_at = Some(at)).is_some())
    }

    async fn record_auth_failure(
        &self,
        reviewer_login: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(reviewer_login).map(|user| user.last_auth_failure_at = Some(at)).is_some())
    }
}

#[derive(Default)]
pub struct InMemorySettingsRepository {
    settings: RwLock<HashMap<String, UserSettings>>,
}

#[async_trait::async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn find(&self, reviewer_login: &str) -> Result<Option<UserSettings>, RepositoryError> {
        let settings = self.settings.read().await;
        Ok(settings.get(reviewer_login).cloned())
    }

    async fn ensure_defaults(&self, reviewer_login: &str) -> Result<UserSettings, RepositoryError> {
        let mut settings = self.settings.write().await;
        Ok(settings
            .entry(reviewer_login.to_string())
            .or_insert_with(|| UserSettings::defaults_for(reviewer_login))
            .clone())
    }

    async fn upsert(&self, settings: &UserSettings) -> Result<(), RepositoryError> {
        let mut stored = self.settings.write().await;
        stored.insert(settings.reviewer_login.clone(), settings.clone());
        Ok(())
    }

    async fn update(
        &self,
        reviewer_login: &str,
        update: SettingUpdate,
    ) -> Result<bool, RepositoryError> {
        let mut settings = self.settings.write().await;
        Ok(settings.get_mut(reviewer_login).map(|stored| stored.apply(update)).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryWhitelistRepository {
    entries: RwLock<Vec<WhitelistEntry>>,
}

#[async_trait::async_trait]
impl WhitelistRepository for InMemoryWhitelistRepository {
    async fn list_for_reviewer(
        &self,
        reviewer_login: &str,
    ) -> Result<Vec<WhitelistEntry>, RepositoryError> {
        let entries = self.entries.read().await;
        let mut owned: Vec<WhitelistEntry> =
            entries.iter().filter(|entry| entry.reviewer_login == reviewer_login).cloned().collect();
        owned.sort_by(|left, right| {
            left.entry_type.cmp(&right.entry_type).then_with(|| left.name.cmp(&right.name))
        });
        Ok(owned)
    }

    async fn add(&self, entry: &WhitelistEntry) -> Result<bool, RepositoryError> {
        let mut entries = self.entries.write().await;
        if entries.contains(entry) {
            return Ok(false);
        }
        entries.push(entry.clone());
        Ok(true)
    }

    async fn remove(&self, reviewer_login: &str, name: &str) -> Result<u64, RepositoryError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|entry| !(entry.reviewer_login == reviewer_login && entry.name == name));
        Ok((before - entries.len()) as u64)
    }

    async fn is_whitelisted(
        &self,
        reviewer_login: &str,
        project_name: Option<&str>,
        family_label: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(whitelist::is_whitelisted(&entries, reviewer_login, project_name, family_label))
    }
}

#[derive(Default)]
pub struct InMemoryProjectFamilyRepository {
    families: RwLock<BTreeSet<ProjectFamily>>,
}

#[async_trait::async_trait]
impl ProjectFamilyRepository for InMemoryProjectFamilyRepository {
    async fn replace_all(&self, families: &[ProjectFamily]) -> Result<(), RepositoryError> {
        let mut stored = self.families.write().await;
        *stored = families.iter().cloned().collect();
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<ProjectFamily>, RepositoryError> {
        let families = self.families.read().await;
        Ok(families.iter().cloned().collect())
    }

    async fn family_for_project(
        &self,
        project_name: &str,
    ) -> Result<Option<String>, RepositoryError> {
        let families = self.families.read().await;
        Ok(families
            .iter()
            .find(|family| family.project_name == project_name)
            .map(|family| family.family_label.clone()))
    }

    async fn projects_in_family(&self, family_label: &str) -> Result<Vec<String>, RepositoryError> {
        let families = self.families.read().await;
        Ok(families
            .iter()
            .filter(|family| family.family_label == family_label)
            .map(|family| family.project_name.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use slotguard_core::domain::project::ProjectFamily;
    use slotguard_core::domain::review::{ReviewRequest, ReviewStatus, StatusTransition, TransitionChanges};
    use slotguard_core::domain::user::{SettingUpdate, User, UserSettings};
    use slotguard_core::domain::whitelist::WhitelistEntry;

    use crate::repositories::{
        InMemoryProjectFamilyRepository, InMemoryReviewRequestRepository, InMemorySettingsRepository,
        InMemoryUserRepository, InMemoryWhitelistRepository, ProjectFamilyRepository,
        RepositoryError, ReviewRequestRepository, SettingsRepository, TransitionResult,
        UserRepository, WhitelistRepository,
    };

    fn request(slot: &str) -> ReviewRequest {
        let start = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).single().expect("valid time");
        ReviewRequest::discovered("alice", slot, "booking-1", start, start - Duration::hours(2))
    }

    #[tokio::test]
    async fn review_requests_keep_one_active_request_per_slot() {
        let repo = InMemoryReviewRequestRepository::default();
        let first = request("slot-1");
        repo.create(&first).await.expect("create");

        let duplicate = repo.create(&request("slot-1")).await;
        assert!(matches!(duplicate, Err(RepositoryError::Conflict(_))));

        let cancel = StatusTransition::new(
            ReviewStatus::UnknownProjectReview,
            ReviewStatus::Cancelled,
            TransitionChanges { decided_at: Some(Utc::now()), ..TransitionChanges::default() },
        );
        assert_eq!(
            repo.compare_and_set_status(&first.id, &cancel).await.expect("cas"),
            TransitionResult::Applied
        );
        let replacement = request("slot-1");
        repo.create(&replacement).await.expect("slot is free once the first request is final");

        let found = repo.find_by_calendar_slot_id("slot-1").await.expect("find").expect("exists");
        assert_eq!(found.id, replacement.id);
    }

    #[tokio::test]
    async fn review_request_cas_is_conditioned_on_status() {
        let repo = InMemoryReviewRequestRepository::default();
        let stored = request("slot-1");
        repo.create(&stored).await.expect("create");
        let resolve = StatusTransition::new(
            ReviewStatus::UnknownProjectReview,
            ReviewStatus::KnownProjectReview,
            TransitionChanges { project_name: Some("go-basics".to_string()), ..TransitionChanges::default() },
        );

        assert!(repo.compare_and_set_status(&stored.id, &resolve).await.expect("first").is_applied());
        assert!(!repo.compare_and_set_status(&stored.id, &resolve).await.expect("second").is_applied());

        let found = repo.find_by_id(&stored.id).await.expect("find").expect("exists");
        assert_eq!(found.status, ReviewStatus::KnownProjectReview);
        assert_eq!(found.project_name.as_deref(), Some("go-basics"));
    }

    #[tokio::test]
    async fn expired_decisions_include_the_exact_instant() {
        let repo = InMemoryReviewRequestRepository::default();
        let mut stored = request("slot-1");
        let deadline = stored.review_start_time - Duration::minutes(20);
        stored.status = ReviewStatus::WaitingForApprove;
        stored.decision_deadline = Some(deadline);
        repo.create(&stored).await.expect("create");

        assert!(repo
            .list_expired_waiting_for_approve(deadline - Duration::seconds(1))
            .await
            .expect("before")
            .is_empty());
        assert_eq!(repo.list_expired_waiting_for_approve(deadline).await.expect("at").len(), 1);
    }

    #[tokio::test]
    async fn pending_slot_cancellation_follows_the_last_attempt() {
        let repo = InMemoryReviewRequestRepository::default();
        let stored = request("slot-1");
        let decided = stored.review_start_time - Duration::minutes(20);
        repo.create(&stored).await.expect("create");
        let cancel = StatusTransition::new(
            ReviewStatus::UnknownProjectReview,
            ReviewStatus::Cancelled,
            TransitionChanges {
                decided_at: Some(decided),
                slot_cancel_attempted_at: Some(decided),
                ..TransitionChanges::default()
            },
        );
        assert!(repo.compare_and_set_status(&stored.id, &cancel).await.expect("cas").is_applied());

        let retry_at = decided + Duration::minutes(5);
        assert!(repo.claim_slot_cancellation(&stored.id, decided, retry_at).await.expect("claim").is_applied());
        assert!(!repo.claim_slot_cancellation(&stored.id, decided, retry_at).await.expect("stale").is_applied());
        assert!(repo.list_pending_slot_cancellations(decided).await.expect("lease held").is_empty());
        assert_eq!(repo.list_pending_slot_cancellations(retry_at).await.expect("pending").len(), 1);

        assert!(repo.complete_slot_cancellation(&stored.id).await.expect("complete").is_applied());
        assert!(!repo.complete_slot_cancellation(&stored.id).await.expect("done").is_applied());
    }

    #[tokio::test]
    async fn users_settings_and_whitelists_round_trip() {
        let users = InMemoryUserRepository::default();
        let settings = InMemorySettingsRepository::default();
        let whitelist = InMemoryWhitelistRepository::default();

        users.upsert(&User::new("alice", 7, Utc::now())).await.expect("user");
        assert_eq!(
            users.find_by_telegram_chat_id(7).await.expect("find").map(|user| user.reviewer_login),
            Some("alice".to_string())
        );

        assert_eq!(settings.ensure_defaults("alice").await.expect("defaults"), UserSettings::defaults_for("alice"));
        assert!(settings.update("alice", SettingUpdate::SlotShiftDurationMinutes(5)).await.expect("update"));
        assert!(!settings.update("bob", SettingUpdate::SlotShiftDurationMinutes(5)).await.expect("missing"));

        assert!(whitelist.add(&WhitelistEntry::family("alice", "Go")).await.expect("add"));
        assert!(!whitelist.add(&WhitelistEntry::family("alice", "Go")).await.expect("duplicate"));
        assert!(whitelist.is_whitelisted("alice", Some("go-basics"), Some("Go")).await.expect("gate"));
        assert_eq!(whitelist.remove("alice", "Go").await.expect("remove"), 1);
        assert!(!whitelist.is_whitelisted("alice", Some("go-basics"), Some("Go")).await.expect("gate"));
    }

    #[tokio::test]
    async fn project_families_replace_atomically() {
        let repo = InMemoryProjectFamilyRepository::default();
        repo.replace_all(&[ProjectFamily::new("Go", "go-basics")]).await.expect("load");
        repo.replace_all(&[ProjectFamily::new("C", "c-sorts")]).await.expect("reload");

        assert_eq!(repo.family_for_project("go-basics").await.expect("lookup"), None);
        assert_eq!(repo.family_for_project("c-sorts").await.expect("lookup").as_deref(), Some("C"));
        assert_eq!(repo.projects_in_family("C").await.expect("projects"), vec!["c-sorts".to_string()]);
    }
}
