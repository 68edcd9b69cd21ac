use slotguard_core::audit::{AuditEvent, AuditOutcome, AuditSink};
use tracing::{info, warn};

/// Forwards audit events to the tracing subscriber.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let review_request_id =
            event.review_request_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown");
        let reviewer_login = event.reviewer_login.as_deref().unwrap_or("unknown");
        let metadata = event
            .metadata
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" ");

        match event.outcome {
            AuditOutcome::Success => info!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                review_request_id,
                reviewer_login,
                actor = %event.actor,
                outcome = event.outcome.as_str(),
                metadata = %metadata,
                "audit event"
            ),
            AuditOutcome::Rejected | AuditOutcome::Failed => warn!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                review_request_id,
                reviewer_login,
                actor = %event.actor,
                outcome = event.outcome.as_str(),
                metadata = %metadata,
                "audit event"
            ),
        }
    }
}
