use thiserror::Error;

use crate::credentials::CredentialError;
use crate::lifecycle::{CallbackParseError, LifecycleError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Callback(#[from] CallbackParseError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl ApplicationError {
    /// Stable machine-readable class used by operator tooling.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(_) => "domain",
            Self::NotFound(_) => "not_found",
            Self::Persistence(_) => "persistence",
            Self::Integration(_) => "integration",
            Self::Configuration(_) => "configuration",
            Self::NotImplemented(_) => "not_implemented",
        }
    }

    /// Transient failures are retried by the next trigger or sweep.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Integration(_))
    }
}

impl From<LifecycleError> for ApplicationError {
    fn from(value: LifecycleError) -> Self {
        Self::Domain(DomainError::Lifecycle(value))
    }
}

impl From<CredentialError> for ApplicationError {
    fn from(value: CredentialError) -> Self {
        match value {
            CredentialError::NotFound { .. } => Self::NotFound(value.to_string()),
            CredentialError::Fetch(_) => Self::Integration(value.to_string()),
            CredentialError::NotImplemented(_) => Self::NotImplemented(value.to_string()),
        }
    }
}
