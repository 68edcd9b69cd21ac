use std::sync::Arc;
use std::time::Duration;

use slotguard_core::credentials::CredentialCache;
use slotguard_core::time::now_utc;
use slotguard_runtime::{
    HttpSecretStore, LoggingMessenger, LoggingSchedulingApi, Repositories, ReviewLifecycleService,
    ServiceOptions, TracingAuditSink,
};

use crate::commands::{run_with_pool, to_data, CommandResult, Failure};

/// One sweep pass over the configured database.
pub fn run() -> CommandResult {
    run_with_pool("sweep", |config, pool| async move {
        let credentials = Arc::new(CredentialCache::new(
            Arc::new(HttpSecretStore::from_config(&config.secrets)),
            Duration::from_secs(config.secrets.cache_ttl_secs),
        ));
        let service = ReviewLifecycleService::new(
            Repositories::sql(pool),
            credentials,
            Arc::new(LoggingSchedulingApi),
            Arc::new(LoggingMessenger),
            Arc::new(TracingAuditSink),
            ServiceOptions::from_config(&config.sweep),
        );

        let report = service.sweep(now_utc()).await?;
        let message = format!(
            "examined {} review requests, changed {}, failed {}, timed out {}",
            report.examined,
            report.changed(),
            report.failed,
            report.timed_out
        );
        Ok::<_, Failure>(CommandResult::success_with_data(
            "sweep",
            message,
            to_data(serde_json::json!({
                "examined": report.examined,
                "promoted": report.promoted,
                "prompted": report.prompted,
                "auto_cancelled": report.auto_cancelled,
                "auto_cancelled_not_whitelisted": report.auto_cancelled_not_whitelisted,
                "raced": report.raced,
                "cancellations_retried": report.cancellations_retried,
                "failed": report.failed,
                "timed_out": report.timed_out,
            })),
        ))
    })
}
