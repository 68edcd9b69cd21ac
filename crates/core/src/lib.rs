pub mod audit;
pub mod config;
pub mod credentials;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod time;

pub use credentials::{
    CredentialCache, CredentialError, SecretPayload, SecretStore, SecretStoreError, UserTokens,
};
pub use domain::calendar::{CalendarBooking, CalendarSlot, CalendarSnapshot, ExternalNotification, SlotKind};
pub use domain::project::{extract_families, ProjectFamily, ProjectGraph};
pub use domain::review::{
    ReviewRequest, ReviewRequestId, ReviewStatus, StatusTransition, TransitionChanges,
};
pub use domain::user::{SettingUpdate, User, UserSettings, UserStatus};
pub use domain::whitelist::{is_whitelisted, EntryType, WhitelistEntry};
pub use errors::{ApplicationError, DomainError};
pub use lifecycle::{LifecycleAction, LifecycleEngine, LifecycleError, LifecycleEvent, LifecycleStep};
