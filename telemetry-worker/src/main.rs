mod buckets;
mod handler;
mod repo;

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use common_bus::{BusMetrics, ConsumerConfig, Producer, RetryPolicy};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use handler::TelemetryHandler;

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
    common_observability::init_tracing("telemetry-worker");

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let db = PgPoolOptions::new().max_connections(10).connect(&database_url).await.context("failed to connect to database")?;

    let brokers = env::var("KAFKA_BOOTSTRAP").unwrap_or_else(|_| "localhost:9092".to_string());
    let producer = Producer::new(&brokers).context("failed to create kafka producer")?;

    let registry = prometheus::Registry::new();
    let metrics = BusMetrics::new(&registry);

    let consumer_config = ConsumerConfig {
        brokers,
        topic: env::var("TELEMETRY_TOPIC").unwrap_or_else(|_| "dev-telemetry".to_string()),
        group_id: env::var("TELEMETRY_GROUP_ID").unwrap_or_else(|_| "telemetry-worker".to_string()),
        worker_count: env_parse("TELEMETRY_WORKER_COUNT", 8usize),
        dlq_topic: env::var("DLQ_TOPIC").unwrap_or_else(|_| "dev-dlq".to_string()),
        retry: RetryPolicy { max_attempts: env_parse("TELEMETRY_MAX_RETRY_ATTEMPTS", 3), ..RetryPolicy::default() },
    };

    let handler = Arc::new(TelemetryHandler { db });

    let cancel = CancellationToken::new();
    let consumer_cancel = cancel.clone();
    let consumer_handle = tokio::spawn(common_bus::run_consumer(consumer_config, producer, handler, metrics, consumer_cancel));

    let health_state = HealthState { registry };
    let app = Router::new().route("/health", get(health)).route("/metrics", get(metrics)).with_state(health_state);
    let addr = format!("0.0.0.0:{}", env_parse("HEALTH_PORT", 8084u16));
    let listener = TcpListener::bind(&addr).await.context("failed to bind health listener")?;
    info!(%addr, "starting novatune telemetry worker");

    tokio::select! {
        result = axum::serve(listener, app) => { result.context("health server error")?; }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            cancel.cancel();
        }
    }

    consumer_handle.await.context("consumer task panicked")?.context("consumer failed")?;
    Ok(())
}

