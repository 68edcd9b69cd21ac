//! Collaborators the lifecycle service talks to: the chat messenger and the external
//! scheduling platform. Both are consumed through narrow traits; the logging
//! implementations stand in until a real transport is wired.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use slotguard_core::credentials::UserTokens;
use slotguard_core::domain::calendar::{CalendarSnapshot, ExternalNotification};
use slotguard_core::domain::project::ProjectGraph;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MessagingError {
    #[error("messenger rejected the request: {0}")]
    Rejected(String),
    #[error("messenger unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("scheduling platform rejected the credentials")]
    Unauthorized,
    #[error("scheduling platform request failed: {0}")]
    Transport(String),
    #[error("scheduling platform rejected `{operation}`: {message}")]
    Rejected { operation: &'static str, message: String },
}

/// Chat destination of one reviewer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recipient {
    pub reviewer_login: String,
    pub chat_id: i64,
}

/// Address of a sent message, enough to edit or delete it later.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageHandle {
    pub chat_id: i64,
    pub message_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self { text: text.into(), callback_data: callback_data.into() }
    }
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn notify(
        &self,
        recipient: &Recipient,
        text: &str,
        buttons: &[InlineButton],
    ) -> Result<MessageHandle, MessagingError>;

    async fn edit(&self, handle: &MessageHandle, text: &str) -> Result<(), MessagingError>;

    async fn delete(&self, handle: &MessageHandle) -> Result<(), MessagingError>;
}

/// Calls against the scheduling platform, authenticated as one reviewer.
#[async_trait]
pub trait SchedulingApi: Send + Sync {
    async fn cancel_slot(&self, tokens: &UserTokens, slot_id: &str) -> Result<(), SchedulingError>;

    async fn shift_slot(
        &self,
        tokens: &UserTokens,
        slot_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), SchedulingError>;

    async fn delete_slot(&self, tokens: &UserTokens, slot_id: &str) -> Result<(), SchedulingError>;

    async fn fetch_current_student_id(&self, tokens: &UserTokens) -> Result<String, SchedulingError>;

    async fn fetch_project_graph(
        &self,
        tokens: &UserTokens,
        student_id: &str,
    ) -> Result<ProjectGraph, SchedulingError>;

    async fn fetch_calendar_events(
        &self,
        tokens: &UserTokens,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<CalendarSnapshot, SchedulingError>;

    async fn fetch_notifications(
        &self,
        tokens: &UserTokens,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ExternalNotification>, SchedulingError>;
}

#[derive(Default)]
pub struct LoggingMessenger;

#[async_trait]
impl Messenger for LoggingMessenger {
    async fn notify(
        &self,
        recipient: &Recipient,
        text: &str,
        buttons: &[InlineButton],
    ) -> Result<MessageHandle, MessagingError> {
        let handle = MessageHandle { chat_id: recipient.chat_id, message_id: Uuid::new_v4().to_string() };
        info!(
            event_name = "messenger.notify",
            reviewer_login = %recipient.reviewer_login,
            message_id = %handle.message_id,
            buttons = buttons.len(),
            text,
            "message recorded without a chat transport"
        );
        Ok(handle)
    }

    async fn edit(&self, handle: &MessageHandle, text: &str) -> Result<(), MessagingError> {
        info!(event_name = "messenger.edit", message_id = %handle.message_id, text, "message edit recorded");
        Ok(())
    }

    async fn delete(&self, handle: &MessageHandle) -> Result<(), MessagingError> {
        info!(event_name = "messenger.delete", message_id = %handle.message_id, "message delete recorded");
        Ok(())
    }
}

/// Reports every call and returns empty data. Calendar sync finds nothing to do and
/// cancellations are only logged.
#[derive(Default)]
pub struct LoggingSchedulingApi;

#[async_trait]
impl SchedulingApi for LoggingSchedulingApi {
    async fn cancel_slot(&self, _tokens: &UserTokens, slot_id: &str) -> Result<(), SchedulingError> {
        info!(event_name = "scheduling.cancel_slot", slot_id, "slot cancellation recorded");
        Ok(())
    }

    async fn shift_slot(
        &self,
        _tokens: &UserTokens,
        slot_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), SchedulingError> {
        info!(
            event_name = "scheduling.shift_slot",
            slot_id,
            start = %start,
            end = %end,
            "slot shift recorded"
        );
        Ok(())
    }

    async fn delete_slot(&self, _tokens: &UserTokens, slot_id: &str) -> Result<(), SchedulingError> {
        info!(event_name = "scheduling.delete_slot", slot_id, "slot deletion recorded");
        Ok(())
    }

    async fn fetch_current_student_id(&self, _tokens: &UserTokens) -> Result<String, SchedulingError> {
        Err(SchedulingError::Rejected {
            operation: "fetch_current_student_id",
            message: "no scheduling transport configured".to_string(),
        })
    }

    async fn fetch_project_graph(
        &self,
        _tokens: &UserTokens,
        _student_id: &str,
    ) -> Result<ProjectGraph, SchedulingError> {
        Ok(ProjectGraph::default())
    }

    async fn fetch_calendar_events(
        &self,
        _tokens: &UserTokens,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<CalendarSnapshot, SchedulingError> {
        Ok(CalendarSnapshot::default())
    }

    async fn fetch_notifications(
        &self,
        _tokens: &UserTokens,
        _offset: i64,
        _limit: i64,
    ) -> Result<Vec<ExternalNotification>, SchedulingError> {
        Ok(Vec::new())
    }
}
