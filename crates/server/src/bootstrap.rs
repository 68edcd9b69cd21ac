use std::sync::Arc;
use std::time::Duration;

use slotguard_core::config::{AppConfig, ConfigError, LoadOptions};
use slotguard_core::credentials::CredentialCache;
use slotguard_db::{connect_with_settings, migrations, DbPool};
use slotguard_runtime::{
    HttpSecretStore, LoggingMessenger, LoggingSchedulingApi, Repositories, ReviewLifecycleService,
    ServiceOptions, TracingAuditSink,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: Arc<ReviewLifecycleService>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Connects the store, applies migrations and wires the lifecycle service.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", correlation_id = "bootstrap", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let credentials = Arc::new(CredentialCache::new(
        Arc::new(HttpSecretStore::from_config(&config.secrets)),
        Duration::from_secs(config.secrets.cache_ttl_secs),
    ));
    let service = Arc::new(ReviewLifecycleService::new(
        Repositories::sql(db_pool.clone()),
        credentials,
        Arc::new(LoggingSchedulingApi),
        Arc::new(LoggingMessenger),
        Arc::new(TracingAuditSink),
        ServiceOptions::from_config(&config.sweep),
    ));

    Ok(Application { config, db_pool, service })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use slotguard_core::config::{ConfigOverrides, LoadOptions};
    use slotguard_core::domain::review::ReviewStatus;

    use crate::bootstrap::bootstrap;

    #[tokio::test]
    async fn bootstrap_fails_fast_without_a_secret_id() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                secret_id: Some("  ".to_string()),
                scheduling_client_id: Some("s21-client".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("secrets.secret_id"));
    }

    #[tokio::test]
    async fn bootstrap_wires_a_service_over_the_migrated_store() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                secret_id: Some("e6q-secret".to_string()),
                scheduling_client_id: Some("s21-client".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('review_requests', 'users', 'user_settings', 'user_project_whitelist', 'project_families')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema should be queryable");
        assert_eq!(table_count, 5);

        let start = Utc.with_ymd_and_hms(2026, 10, 18, 14, 0, 0).single().expect("valid time");
        let discovered = app
            .service
            .discover_booking("alice", "slot-1", "booking-1", start, start - chrono::Duration::hours(5))
            .await
            .expect("discover")
            .expect("new booking");
        assert_eq!(discovered.status, ReviewStatus::UnknownProjectReview);

        let report = app.service.sweep(start - chrono::Duration::hours(4)).await.expect("sweep");
        assert_eq!(report.changed(), 0);

        app.db_pool.close().await;
    }
}
