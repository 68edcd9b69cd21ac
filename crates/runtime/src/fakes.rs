//! Recording collaborators shared by the runtime tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use slotguard_core::audit::InMemoryAuditSink;
use slotguard_core::credentials::{
    CredentialCache, SecretPayload, SecretStore, SecretStoreError, UserTokens,
};
use slotguard_core::domain::calendar::{CalendarSnapshot, ExternalNotification};
use slotguard_core::domain::project::ProjectGraph;
use slotguard_core::domain::user::User;

use crate::ports::{
    InlineButton, MessageHandle, Messenger, MessagingError, Recipient, SchedulingApi,
    SchedulingError,
};
use crate::service::{Repositories, ReviewLifecycleService, ServiceOptions};

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, hour, minute, 0).single().expect("valid time")
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: i64,
    pub message_id: String,
    pub text: String,
    pub buttons: Vec<InlineButton>,
}

#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<SentMessage>>,
    edits: Mutex<Vec<(String, String)>>,
    deletes: Mutex<Vec<String>>,
    counter: AtomicUsize,
    pub fail_notify: AtomicBool,
}

impl RecordingMessenger {
    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.sent).clone()
    }

    pub fn edits(&self) -> Vec<(String, String)> {
        lock(&self.edits).clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        lock(&self.deletes).clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn notify(
        &self,
        recipient: &Recipient,
        text: &str,
        buttons: &[InlineButton],
    ) -> Result<MessageHandle, MessagingError> {
        if self.fail_notify.load(Ordering::SeqCst) {
            return Err(MessagingError::Unavailable("chat offline".to_string()));
        }
        let message_id = format!("msg-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        lock(&self.sent).push(SentMessage {
            chat_id: recipient.chat_id,
            message_id: message_id.clone(),
            text: text.to_string(),
            buttons: buttons.to_vec(),
        });
        Ok(MessageHandle { chat_id: recipient.chat_id, message_id })
    }

    async fn edit(&self, handle: &MessageHandle, text: &str) -> Result<(), MessagingError> {
        lock(&self.edits).push((handle.message_id.clone(), text.to_string()));
        Ok(())
    }

    async fn delete(&self, handle: &MessageHandle) -> Result<(), MessagingError> {
        lock(&self.deletes).push(handle.message_id.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSchedulingApi {
    cancelled: Mutex<Vec<String>>,
    shifted: Mutex<Vec<(String, DateTime<Utc>, DateTime<Utc>)>>,
    deleted: Mutex<Vec<String>>,
    pub calendar: Mutex<CalendarSnapshot>,
    pub notifications: Mutex<Vec<ExternalNotification>>,
    pub graph: Mutex<ProjectGraph>,
    pub fail_cancel: AtomicBool,
    /// Applied to every cancellation before it is recorded.
    pub cancel_delay: Mutex<Option<Duration>>,
    pub notification_fetches: AtomicUsize,
}

impl RecordingSchedulingApi {
    pub fn cancelled(&self) -> Vec<String> {
        lock(&self.cancelled).clone()
    }

    pub fn shifted(&self) -> Vec<(String, DateTime<Utc>, DateTime<Utc>)> {
        lock(&self.shifted).clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        lock(&self.deleted).clone()
    }
}

#[async_trait]
impl SchedulingApi for RecordingSchedulingApi {
    async fn cancel_slot(&self, _tokens: &UserTokens, slot_id: &str) -> Result<(), SchedulingError> {
        let delay = *lock(&self.cancel_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(SchedulingError::Transport("connection reset".to_string()));
        }
        lock(&self.cancelled).push(slot_id.to_string());
        Ok(())
    }

    async fn shift_slot(
        &self,
        _tokens: &UserTokens,
        slot_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), SchedulingError> {
        lock(&self.shifted).push((slot_id.to_string(), start, end));
        Ok(())
    }

    async fn delete_slot(&self, _tokens: &UserTokens, slot_id: &str) -> Result<(), SchedulingError> {
        lock(&self.deleted).push(slot_id.to_string());
        Ok(())
    }

    async fn fetch_current_student_id(&self, _tokens: &UserTokens) -> Result<String, SchedulingError> {
        Ok("student-1".to_string())
    }

    async fn fetch_project_graph(
        &self,
        _tokens: &UserTokens,
        _student_id: &str,
    ) -> Result<ProjectGraph, SchedulingError> {
        Ok(lock(&self.graph).clone())
    }

    async fn fetch_calendar_events(
        &self,
        _tokens: &UserTokens,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<CalendarSnapshot, SchedulingError> {
        Ok(lock(&self.calendar).clone())
    }

    async fn fetch_notifications(
        &self,
        _tokens: &UserTokens,
        _offset: i64,
        _limit: i64,
    ) -> Result<Vec<ExternalNotification>, SchedulingError> {
        self.notification_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.notifications).clone())
    }
}

pub struct StaticSecretStore {
    payload: SecretPayload,
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn fetch_payload(&self) -> Result<SecretPayload, SecretStoreError> {
        Ok(self.payload.clone())
    }
}

pub struct Harness {
    pub service: Arc<ReviewLifecycleService>,
    pub repositories: Repositories,
    pub messenger: Arc<RecordingMessenger>,
    pub scheduling: Arc<RecordingSchedulingApi>,
    pub audit: InMemoryAuditSink,
}

impl Harness {
    /// Service over in-memory stores with reviewer `alice` (chat 100) registered and
    /// holding tokens.
    pub async fn new() -> Self {
        Self::with_options(ServiceOptions::default()).await
    }

    pub async fn with_options(options: ServiceOptions) -> Self {
        let repositories = Repositories::in_memory();
        let messenger = Arc::new(RecordingMessenger::default());
        let scheduling = Arc::new(RecordingSchedulingApi::default());
        let audit = InMemoryAuditSink::default();
        let payload = SecretPayload::default().with_user("alice", UserTokens::new("access", "refresh"));
        let credentials = Arc::new(CredentialCache::new(
            Arc::new(StaticSecretStore { payload }),
            Duration::from_secs(300),
        ));

        repositories.users.upsert(&User::new("alice", 100, at(8, 0))).await.expect("seed reviewer");

        let service = Arc::new(ReviewLifecycleService::new(
            repositories.clone(),
            credentials,
            scheduling.clone(),
            messenger.clone(),
            Arc::new(audit.clone()),
            options,
        ));
        Self { service, repositories, messenger, scheduling, audit }
    }
}
