use chrono::{DateTime, Utc};
use sqlx::Row;

use slotguard_core::domain::review::{ReviewRequest, ReviewRequestId, ReviewStatus, StatusTransition};
use slotguard_core::time::encode_timestamp;

use super::{
    parse_optional_timestamp, parse_timestamp, placeholders, RepositoryError,
    ReviewRequestRepository, TransitionResult,
};
use crate::DbPool;

const COLUMNS: &str = "id, reviewer_login, calendar_slot_id, booking_id, project_name, family_label,
                       status, review_start_time, decision_deadline, non_whitelist_cancel_at,
                       notification_id, telegram_message_id, created_at, decided_at,
                       slot_cancel_attempted_at";

pub struct SqlReviewRequestRepository {
    pool: DbPool,
}

impl SqlReviewRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_with_statuses(
        &self,
        reviewer_login: Option<&str>,
        statuses: &[ReviewStatus],
    ) -> Result<Vec<ReviewRequest>, RepositoryError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let reviewer_filter = if reviewer_login.is_some() { "reviewer_login = ? AND " } else { "" };
        let sql = format!(
            "SELECT {COLUMNS} FROM review_requests
             WHERE {reviewer_filter}status IN ({})
             ORDER BY review_start_time ASC, id ASC",
            placeholders(statuses.len())
        );

        let mut query = sqlx::query(&sql);
        if let Some(reviewer_login) = reviewer_login {
            query = query.bind(reviewer_login);
        }
        for status in statuses {
            query = query.bind(status.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_review_request).collect()
    }
}

fn row_to_review_request(row: &sqlx::sqlite::SqliteRow) -> Result<ReviewRequest, RepositoryError> {
    let status: String = row.try_get("status")?;
    let status = ReviewStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown review status `{status}`")))?;

    Ok(ReviewRequest {
        id: ReviewRequestId(row.try_get("id")?),
        reviewer_login: row.try_get("reviewer_login")?,
        calendar_slot_id: row.try_get("calendar_slot_id")?,
        booking_id: row.try_get("booking_id")?,
        project_name: row.try_get("project_name")?,
        family_label: row.try_get("family_label")?,
        status,
        review_start_time: parse_timestamp("review_start_time", row.try_get("review_start_time")?)?,
        decision_deadline: parse_optional_timestamp(
            "decision_deadline",
            row.try_get("decision_deadline")?,
        )?,
        non_whitelist_cancel_at: parse_optional_timestamp(
            "non_whitelist_cancel_at",
            row.try_get("non_whitelist_cancel_at")?,
        )?,
        notification_id: row.try_get("notification_id")?,
        telegram_message_id: row.try_get("telegram_message_id")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        decided_at: parse_optional_timestamp("decided_at", row.try_get("decided_at")?)?,
        slot_cancel_attempted_at: parse_optional_timestamp(
            "slot_cancel_attempted_at",
            row.try_get("slot_cancel_attempted_at")?,
        )?,
    })
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(database) if database.is_unique_violation())
}

#[async_trait::async_trait]
impl ReviewRequestRepository for SqlReviewRequestRepository {
    async fn create(&self, request: &ReviewRequest) -> Result<(), RepositoryError> {
        if !request.deadline_fields_consistent() {
            return Err(RepositoryError::Conflict(format!(
                "review request {} carries a deadline that does not match status {}",
                request.id, request.status
            )));
        }

        let result = sqlx::query(
            "INSERT INTO review_requests (id, reviewer_login, calendar_slot_id, booking_id,
                                          project_name, family_label, status, review_start_time,
                                          decision_deadline, non_whitelist_cancel_at,
                                          notification_id, telegram_message_id, created_at,
                                          decided_at, slot_cancel_attempted_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.reviewer_login)
        .bind(&request.calendar_slot_id)
        .bind(&request.booking_id)
        .bind(&request.project_name)
        .bind(&request.family_label)
        .bind(request.status.as_str())
        .bind(encode_timestamp(request.review_start_time))
        .bind(request.decision_deadline.map(encode_timestamp))
        .bind(request.non_whitelist_cancel_at.map(encode_timestamp))
        .bind(&request.notification_id)
        .bind(&request.telegram_message_id)
        .bind(encode_timestamp(request.created_at))
        .bind(request.decided_at.map(encode_timestamp))
        .bind(request.slot_cancel_attempted_at.map(encode_timestamp))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => Err(RepositoryError::Conflict(format!(
                "calendar slot {} already has an active review request",
                request.calendar_slot_id
            ))),
            Err(error) => Err(error.into()),
        }
    }

    async fn find_by_id(
        &self,
        id: &ReviewRequestId,
    ) -> Result<Option<ReviewRequest>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM review_requests WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_review_request).transpose()
    }

    async fn find_by_calendar_slot_id(
        &self,
        calendar_slot_id: &str,
    ) -> Result<Option<ReviewRequest>, RepositoryError> {
        let finals = ReviewStatus::FINAL.map(|status| format!("'{}'", status.as_str())).join(", ");
        let sql = format!(
            "SELECT {COLUMNS} FROM review_requests
             WHERE calendar_slot_id = ?
             ORDER BY CASE WHEN status IN ({finals}) THEN 1 ELSE 0 END ASC, created_at DESC
             LIMIT 1"
        );
        let row = sqlx::query(&sql).bind(calendar_slot_id).fetch_optional(&self.pool).await?;

        row.as_ref().map(row_to_review_request).transpose()
    }

    async fn list_by_statuses(
        &self,
        statuses: &[ReviewStatus],
    ) -> Result<Vec<ReviewRequest>, RepositoryError> {
        self.fetch_with_statuses(None, statuses).await
    }

    async fn list_by_reviewer_and_statuses(
        &self,
        reviewer_login: &str,
        statuses: &[ReviewStatus],
    ) -> Result<Vec<ReviewRequest>, RepositoryError> {
        self.fetch_with_statuses(Some(reviewer_login), statuses).await
    }

    async fn list_expired_waiting_for_approve(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReviewRequest>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM review_requests
             WHERE status = ? AND decision_deadline IS NOT NULL AND decision_deadline <= ?
             ORDER BY decision_deadline ASC"
        ))
        .bind(ReviewStatus::WaitingForApprove.as_str())
        .bind(encode_timestamp(now))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_review_request).collect()
    }

    async fn compare_and_set_status(
        &self,
        id: &ReviewRequestId,
        transition: &StatusTransition,
    ) -> Result<TransitionResult, RepositoryError> {
        let changes = transition.changes();
        let result = sqlx::query(
            "UPDATE review_requests
             SET status = ?,
                 project_name = COALESCE(?, project_name),
                 family_label = COALESCE(?, family_label),
                 notification_id = COALESCE(?, notification_id),
                 telegram_message_id = COALESCE(?, telegram_message_id),
                 decision_deadline = ?,
                 non_whitelist_cancel_at = ?,
                 decided_at = COALESCE(?, decided_at),
                 slot_cancel_attempted_at = COALESCE(?, slot_cancel_attempted_at)
             WHERE id = ? AND status = ?",
        )
        .bind(transition.next().as_str())
        .bind(&changes.project_name)
        .bind(&changes.family_label)
        .bind(&changes.notification_id)
        .bind(&changes.telegram_message_id)
        .bind(changes.decision_deadline.map(encode_timestamp))
        .bind(changes.non_whitelist_cancel_at.map(encode_timestamp))
        .bind(changes.decided_at.map(encode_timestamp))
        .bind(changes.slot_cancel_attempted_at.map(encode_timestamp))
        .bind(&id.0)
        .bind(transition.expected().as_str())
        .execute(&self.pool)
        .await?;

        Ok(TransitionResult::from_rows_affected(result.rows_affected()))
    }

    async fn list_pending_slot_cancellations(
        &self,
        attempted_before: DateTime<Utc>,
    ) -> Result<Vec<ReviewRequest>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM review_requests
             WHERE slot_cancel_attempted_at IS NOT NULL AND slot_cancel_attempted_at <= ?
             ORDER BY slot_cancel_attempted_at ASC, id ASC"
        ))
        .bind(encode_timestamp(attempted_before))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_review_request).collect()
    }

    async fn claim_slot_cancellation(
        &self,
        id: &ReviewRequestId,
        last_attempt: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<TransitionResult, RepositoryError> {
        let result = sqlx::query(
            "UPDATE review_requests SET slot_cancel_attempted_at = ?
             WHERE id = ? AND slot_cancel_attempted_at = ?",
        )
        .bind(encode_timestamp(now))
        .bind(&id.0)
        .bind(encode_timestamp(last_attempt))
        .execute(&self.pool)
        .await?;

        Ok(TransitionResult::from_rows_affected(result.rows_affected()))
    }

    async fn complete_slot_cancellation(
        &self,
        id: &ReviewRequestId,
    ) -> Result<TransitionResult, RepositoryError> {
        let result = sqlx::query(
            "UPDATE review_requests SET slot_cancel_attempted_at = NULL
             WHERE id = ? AND slot_cancel_attempted_at IS NOT NULL",
        )
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(TransitionResult::from_rows_affected(result.rows_affected()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use slotguard_core::domain::review::{
        ReviewRequest, ReviewRequestId, ReviewStatus, StatusTransition, TransitionChanges,
    };

    use super::SqlReviewRequestRepository;
    use crate::repositories::{RepositoryError, ReviewRequestRepository, TransitionResult};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlReviewRequestRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlReviewRequestRepository::new(pool)
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, hour, minute, 0).single().expect("valid time")
    }

    fn request(slot: &str) -> ReviewRequest {
        ReviewRequest::discovered("alice", slot, format!("booking-{slot}"), at(14, 0), at(9, 0))
    }

    fn with_status(mut request: ReviewRequest, status: ReviewStatus) -> ReviewRequest {
        request.status = status;
        request
    }

    #[tokio::test]
    async fn create_and_find_round_trip_all_fields() {
        let repo = setup().await;
        let mut stored = with_status(request("slot-1"), ReviewStatus::NotWhitelisted);
        stored.project_name = Some("go-concurrency".to_owned());
        stored.family_label = Some("Go".to_owned());
        stored.non_whitelist_cancel_at = Some(at(9, 5));
        stored.notification_id = Some("n-1".to_owned());

        repo.create(&stored).await.expect("create");

        let by_id = repo.find_by_id(&stored.id).await.expect("find").expect("exists");
        let by_slot = repo.find_by_calendar_slot_id("slot-1").await.expect("find").expect("exists");
        assert_eq!(by_id, stored);
        assert_eq!(by_slot, stored);
        assert!(repo.find_by_id(&ReviewRequestId("missing".to_owned())).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn one_active_request_per_slot() {
        let repo = setup().await;
        repo.create(&request("slot-1")).await.expect("first");

        let error = repo.create(&request("slot-1")).await.expect_err("duplicate active slot");
        assert!(matches!(error, RepositoryError::Conflict(_)));

        let mut finished = with_status(request("slot-2"), ReviewStatus::Cancelled);
        finished.decided_at = Some(at(10, 0));
        repo.create(&finished).await.expect("final request");
        repo.create(&request("slot-2")).await.expect("a final request does not block the slot");

        let active = repo.find_by_calendar_slot_id("slot-2").await.expect("find").expect("exists");
        assert_eq!(active.status, ReviewStatus::UnknownProjectReview);
    }

    #[tokio::test]
    async fn create_rejects_inconsistent_deadlines() {
        let repo = setup().await;
        let mut broken = request("slot-1");
        broken.decision_deadline = Some(at(13, 40));

        assert!(matches!(repo.create(&broken).await, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn status_queries_filter_by_status_and_reviewer() {
        let repo = setup().await;
        repo.create(&with_status(request("slot-1"), ReviewStatus::Whitelisted)).await.expect("1");
        repo.create(&with_status(request("slot-2"), ReviewStatus::NeedToApprove)).await.expect("2");
        let mut bob = with_status(request("slot-3"), ReviewStatus::Whitelisted);
        bob.reviewer_login = "bob".to_owned();
        repo.create(&bob).await.expect("3");

        let whitelisted =
            repo.list_by_statuses(&[ReviewStatus::Whitelisted]).await.expect("list");
        assert_eq!(whitelisted.len(), 2);

        let alice = repo
            .list_by_reviewer_and_statuses(
                "alice",
                &[ReviewStatus::Whitelisted, ReviewStatus::NeedToApprove],
            )
            .await
            .expect("list");
        assert_eq!(alice.len(), 2);
        assert!(repo.list_by_statuses(&[]).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn expiry_queries_include_the_deadline_instant() {
        let repo = setup().await;
        let mut waiting = with_status(request("slot-1"), ReviewStatus::WaitingForApprove);
        waiting.decision_deadline = Some(at(13, 40));
        let mut later = with_status(request("slot-2"), ReviewStatus::WaitingForApprove);
        later.decision_deadline = Some(at(13, 41));
        let mut not_whitelisted = with_status(request("slot-3"), ReviewStatus::NotWhitelisted);
        not_whitelisted.non_whitelist_cancel_at = Some(at(13, 40) - Duration::seconds(1));
        for request in [&waiting, &later, &not_whitelisted] {
            repo.create(request).await.expect("create");
        }

        let expired = repo.list_expired_waiting_for_approve(at(13, 40)).await.expect("expired");
        assert_eq!(expired.iter().map(|r| r.id.clone()).collect::<Vec<_>>(), vec![waiting.id]);
    }

    #[tokio::test]
    async fn compare_and_set_applies_once() {
        let repo = setup().await;
        let mut waiting = with_status(request("slot-1"), ReviewStatus::WaitingForApprove);
        waiting.decision_deadline = Some(at(13, 40));
        waiting.telegram_message_id = Some("77".to_owned());
        repo.create(&waiting).await.expect("create");

        let transition = StatusTransition::new(
            ReviewStatus::WaitingForApprove,
            ReviewStatus::AutoCancelled,
            TransitionChanges { decided_at: Some(at(13, 41)), ..TransitionChanges::default() },
        );

        let first = repo.compare_and_set_status(&waiting.id, &transition).await.expect("first");
        let second = repo.compare_and_set_status(&waiting.id, &transition).await.expect("second");
        assert_eq!(first, TransitionResult::Applied);
        assert_eq!(second, TransitionResult::Stale);

        let stored = repo.find_by_id(&waiting.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, ReviewStatus::AutoCancelled);
        assert_eq!(stored.decision_deadline, None);
        assert_eq!(stored.decided_at, Some(at(13, 41)));
        assert_eq!(stored.telegram_message_id.as_deref(), Some("77"));
        assert_eq!(stored.slot_cancel_attempted_at, None);
    }

    #[tokio::test]
    async fn pending_slot_cancellation_is_claimed_once_and_cleared() {
        let repo = setup().await;
        let mut waiting = with_status(request("slot-1"), ReviewStatus::WaitingForApprove);
        waiting.decision_deadline = Some(at(13, 40));
        repo.create(&waiting).await.expect("create");
        let cancel = StatusTransition::new(
            ReviewStatus::WaitingForApprove,
            ReviewStatus::AutoCancelled,
            TransitionChanges {
                decided_at: Some(at(13, 40)),
                slot_cancel_attempted_at: Some(at(13, 40)),
                ..TransitionChanges::default()
            },
        );
        assert!(repo.compare_and_set_status(&waiting.id, &cancel).await.expect("cas").is_applied());

        assert!(repo.list_pending_slot_cancellations(at(13, 39)).await.expect("early").is_empty());
        let pending = repo.list_pending_slot_cancellations(at(13, 40)).await.expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].slot_cancel_attempted_at, Some(at(13, 40)));

        let first = repo.claim_slot_cancellation(&waiting.id, at(13, 40), at(13, 45)).await.expect("claim");
        let second = repo.claim_slot_cancellation(&waiting.id, at(13, 40), at(13, 45)).await.expect("claim");
        assert_eq!(first, TransitionResult::Applied);
        assert_eq!(second, TransitionResult::Stale);

        assert!(repo.complete_slot_cancellation(&waiting.id).await.expect("complete").is_applied());
        assert!(!repo.complete_slot_cancellation(&waiting.id).await.expect("again").is_applied());
        assert!(repo.list_pending_slot_cancellations(at(23, 0)).await.expect("none").is_empty());

        let stored = repo.find_by_id(&waiting.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, ReviewStatus::AutoCancelled);
        assert!(!stored.slot_cancel_pending());
    }

    #[tokio::test]
    async fn compare_and_set_on_unknown_id_is_stale() {
        let repo = setup().await;
        let transition = StatusTransition::new(
            ReviewStatus::KnownProjectReview,
            ReviewStatus::Whitelisted,
            TransitionChanges::default(),
        );

        let result = repo
            .compare_and_set_status(&ReviewRequestId("ghost".to_owned()), &transition)
            .await
            .expect("cas");
        assert_eq!(result, TransitionResult::Stale);
    }
}
