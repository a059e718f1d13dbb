use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use common_bus::Producer;
use common_outbox::RelayConfig;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
struct HealthState {
    registry: prometheus::Registry,
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics(State(state): State<HealthState>) -> String {
    common_observability::render_metrics(&state.registry).unwrap_or_default()
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<()> {
    common_observability::init_tracing("outbox-relay");

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let db = PgPoolOptions::new().max_connections(5).connect(&database_url).await.context("failed to connect to database")?;

    let brokers = env::var("KAFKA_BOOTSTRAP").unwrap_or_else(|_| "localhost:9092".to_string());
    let producer = Producer::new(&brokers).context("failed to create kafka producer")?;

    let config = RelayConfig {
        batch_size: env_parse("OUTBOX_BATCH_SIZE", 100),
        max_attempts: env_parse("OUTBOX_MAX_ATTEMPTS", 5),
        poll_interval: Duration::from_millis(env_parse("OUTBOX_POLL_INTERVAL_MS", 500)),
    };

    let cancel = CancellationToken::new();
    let relay_cancel = cancel.clone();
    let relay_handle = tokio::spawn(common_outbox::run_relay(db, producer, config, relay_cancel));

    let health_state = HealthState { registry: prometheus::Registry::new() };
    let app = Router::new().route("/health", get(health)).route("/metrics", get(metrics)).with_state(health_state);
    let addr = format!("0.0.0.0:{}", env_parse("HEALTH_PORT", 8081u16));
    let listener = TcpListener::bind(&addr).await.context("failed to bind health listener")?;
    info!(%addr, "starting novatune outbox relay");

    tokio::select! {
        result = axum::serve(listener, app) => { result.context("health server error")?; }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            cancel.cancel();
        }
    }

    relay_handle.await.context("relay task panicked")?;
    Ok(())
}

