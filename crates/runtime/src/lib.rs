pub mod audit;
pub mod error;
pub mod messages;
pub mod ports;
pub mod secrets;
pub mod service;
pub mod sync;
pub mod worker;

#[cfg(test)]
mod fakes;

pub use audit::TracingAuditSink;
pub use error::ServiceError;
pub use ports::{
    InlineButton, LoggingMessenger, LoggingSchedulingApi, MessageHandle, Messenger, MessagingError,
    Recipient, SchedulingApi, SchedulingError,
};
pub use secrets::HttpSecretStore;
pub use service::{DecisionOutcome, Repositories, ReviewLifecycleService, ServiceOptions, SweepReport};
pub use sync::{CalendarSyncReport, SlotShiftReport};
pub use worker::{CycleReport, Heartbeat, SweepWorker};
