use thiserror::Error;

use slotguard_core::credentials::CredentialError;
use slotguard_core::errors::{ApplicationError, DomainError};
use slotguard_core::lifecycle::{CallbackParseError, LifecycleError};
use slotguard_db::RepositoryError;

use crate::ports::{MessagingError, SchedulingError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),
    #[error(transparent)]
    Messaging(#[from] MessagingError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Callback(#[from] CallbackParseError),
    #[error("{entity} `{key}` not found")]
    NotFound { entity: &'static str, key: String },
    #[error("processing `{key}` exceeded {after_secs}s")]
    Timeout { key: String, after_secs: u64 },
}

impl From<ServiceError> for ApplicationError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::Repository(RepositoryError::Conflict(message)) => {
                Self::Domain(DomainError::InvariantViolation(message))
            }
            ServiceError::Repository(error) => Self::Persistence(error.to_string()),
            ServiceError::Credentials(error) => error.into(),
            ServiceError::Scheduling(error) => Self::Integration(error.to_string()),
            ServiceError::Messaging(error) => Self::Integration(error.to_string()),
            ServiceError::Lifecycle(error) => Self::Domain(DomainError::Lifecycle(error)),
            ServiceError::Callback(error) => Self::Domain(DomainError::Callback(error)),
            error @ ServiceError::NotFound { .. } => Self::NotFound(error.to_string()),
            error @ ServiceError::Timeout { .. } => Self::Integration(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use slotguard_core::credentials::{CredentialError, SecretStoreError};
    use slotguard_core::errors::ApplicationError;
    use slotguard_db::RepositoryError;

    use super::ServiceError;
    use crate::ports::SchedulingError;

    #[test]
    fn service_errors_map_to_application_classes() {
        let cases: Vec<(ServiceError, &str, bool)> = vec![
            (RepositoryError::Decode("bad".to_string()).into(), "persistence", true),
            (RepositoryError::Conflict("slot".to_string()).into(), "domain", false),
            (
                CredentialError::Fetch(SecretStoreError::Status { status: 503 }).into(),
                "integration",
                true,
            ),
            (CredentialError::NotImplemented("token write-back").into(), "not_implemented", false),
            (SchedulingError::Unauthorized.into(), "integration", true),
            (ServiceError::NotFound { entity: "review request", key: "rr-1".to_string() }, "not_found", false),
        ];

        for (error, class, transient) in cases {
            let mapped = ApplicationError::from(error);
            assert_eq!(mapped.error_class(), class);
            assert_eq!(mapped.is_transient(), transient);
        }
    }
}
