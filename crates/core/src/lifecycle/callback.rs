//! Button payloads attached to the approval prompt: `APPROVE:<id>` and `DECLINE:<id>`.

use std::fmt;

use thiserror::Error;

use crate::domain::review::ReviewRequestId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    Approve,
    Decline,
}

impl CallbackAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "APPROVE",
            Self::Decline => "DECLINE",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackData {
    pub action: CallbackAction,
    pub review_request_id: ReviewRequestId,
}

impl CallbackData {
    pub fn approve(id: &ReviewRequestId) -> Self {
        Self { action: CallbackAction::Approve, review_request_id: id.clone() }
    }

    pub fn decline(id: &ReviewRequestId) -> Self {
        Self { action: CallbackAction::Decline, review_request_id: id.clone() }
    }
}

impl fmt::Display for CallbackData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.action.as_str(), self.review_request_id)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CallbackParseError {
    #[error("callback data `{0}` is not in ACTION:id form")]
    Malformed(String),
    #[error("unknown callback action `{0}`")]
    UnknownAction(String),
}

pub fn parse_callback_data(raw: &str) -> Result<CallbackData, CallbackParseError> {
    let (action, id) =
        raw.split_once(':').ok_or_else(|| CallbackParseError::Malformed(raw.to_owned()))?;
    if action.is_empty() || id.is_empty() {
        return Err(CallbackParseError::Malformed(raw.to_owned()));
    }

    let action = match action {
        "APPROVE" => CallbackAction::Approve,
        "DECLINE" => CallbackAction::Decline,
        other => return Err(CallbackParseError::UnknownAction(other.to_owned())),
    };
    Ok(CallbackData { action, review_request_id: ReviewRequestId(id.to_owned()) })
}
