mod bootstrap;
mod health;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use slotguard_core::config::{AppConfig, LoadOptions};
use slotguard_runtime::SweepWorker;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use slotguard_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let worker = SweepWorker::new(Arc::clone(&app.service), Duration::from_secs(app.config.sweep.interval_secs));
    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        health::HealthState::new(app.db_pool.clone(), worker.heartbeat(), worker.interval()),
    )
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut worker_handle = tokio::spawn(worker.run(shutdown_rx));

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        sweep_interval_secs = app.config.sweep.interval_secs,
        "slotguard-server started"
    );
    tokio::signal::ctrl_c().await?;
    tracing::info!(event_name = "system.server.stopping", correlation_id = "shutdown", "slotguard-server stopping");

    let _ = shutdown_tx.send(true);
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, &mut worker_handle).await.is_err() {
        tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "worker did not stop in time; aborting"
        );
        worker_handle.abort();
    }

    app.db_pool.close().await;
    tracing::info!(event_name = "system.server.stopped", correlation_id = "shutdown", "slotguard-server stopped");
    Ok(())
}
