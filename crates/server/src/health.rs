use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use slotguard_db::{ping, DbPool};
use slotguard_runtime::Heartbeat;
use tracing::{error, info};

/// A worker that misses this many intervals in a row is reported as stalled.
const MISSED_CYCLES_BEFORE_STALL: u32 = 3;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    heartbeat: Heartbeat,
    sweep_interval: Duration,
}

impl HealthState {
    pub fn new(db_pool: DbPool, heartbeat: Heartbeat, sweep_interval: Duration) -> Self {
        Self { db_pool, heartbeat, sweep_interval }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub sweep: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: HealthState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let now = Utc::now();
    let database = database_check(&state.db_pool).await;
    let sweep = sweep_check(state.heartbeat.last_cycle(), state.sweep_interval, now);
    let ready = database.status == "ready" && sweep.status != "stalled";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        sweep,
        checked_at: now.to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match ping(pool).await {
        Ok(()) => HealthCheck { status: "ready", detail: "database ping succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database ping failed: {error}") }
        }
    }
}

fn sweep_check(last_cycle: Option<DateTime<Utc>>, interval: Duration, now: DateTime<Utc>) -> HealthCheck {
    let Some(last_cycle) = last_cycle else {
        return HealthCheck { status: "starting", detail: "no sweep cycle completed yet".to_string() };
    };

    let age_secs = (now - last_cycle).num_seconds().max(0).unsigned_abs();
    let limit_secs = interval.as_secs().saturating_mul(u64::from(MISSED_CYCLES_BEFORE_STALL));
    if age_secs > limit_secs {
        HealthCheck { status: "stalled", detail: format!("last sweep cycle finished {age_secs}s ago") }
    } else {
        HealthCheck { status: "ready", detail: format!("last sweep cycle finished {age_secs}s ago") }
    }
}
