mod reclaim;
mod repo;

use std::env;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use common_storage::StorageAdapter;
use common_store::DocumentStore;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone)]
struct HealthState {
    registry: prometheus::Registry,
    backlog: Arc<AtomicI64>,
    degraded_threshold: i64,
}

async fn health(State(state): State<HealthState>) -> (StatusCode, &'static str) {
    if state.backlog.load(Ordering::Relaxed) > state.degraded_threshold {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    } else {
        (StatusCode::OK, "ok")
    }
}

async fn metrics(State(state): State<HealthState>) -> String {
    common_observability::render_metrics(&state.registry).unwrap_or_default()
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Polls for tracks past their grace period on a single worker, avoiding
/// concurrent sweeps over the same backlog ( "single-worker
/// polling" / "a future retry picks up any step that didn't complete").
async fn run_sweeps(store: DocumentStore, storage: Arc<StorageAdapter>, batch_size: i64, interval: Duration, backlog: Arc<AtomicI64>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        match repo::count_tracks_past_scheduled_deletion(store.pool(), Utc::now()).await {
            Ok(count) => backlog.store(count, Ordering::Relaxed),
            Err(e) => warn!(error = %e, "failed to count reclamation backlog"),
        }

        match reclaim::reclaim_due_tracks(&store, &storage, batch_size).await {
            Ok(count) if count > 0 => info!(count, "reclaimed due tracks"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "reclamation sweep failed"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    common_observability::init_tracing("lifecycle-worker");

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let db = PgPoolOptions::new().max_connections(10).connect(&database_url).await.context("failed to connect to database")?;
    let store = DocumentStore::new(db);

    let storage = Arc::new(StorageAdapter::new(
            &env::var("S3_ENDPOINT").context("S3_ENDPOINT must be set")?,
            &env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            &env::var("S3_ACCESS_KEY").context("S3_ACCESS_KEY must be set")?,
            &env::var("S3_SECRET_KEY").context("S3_SECRET_KEY must be set")?,
            &env::var("S3_BUCKET").context("S3_BUCKET must be set")?,
        ));

    let batch_size = env_parse("LIFECYCLE_BATCH_SIZE", 50i64);
    let interval = Duration::from_secs(env_parse("LIFECYCLE_POLLING_INTERVAL_SECONDS", 300));
    let degraded_threshold = env_parse("LIFECYCLE_DEGRADED_BACKLOG_THRESHOLD", 1_000i64);

    let registry = prometheus::Registry::new();
    let backlog = Arc::new(AtomicI64::new(0));

    let cancel = CancellationToken::new();
    let sweep_cancel = cancel.clone();
    let sweep_handle = tokio::spawn(run_sweeps(store, storage, batch_size, interval, backlog.clone(), sweep_cancel));

    let health_state = HealthState { registry, backlog, degraded_threshold };
    let app = Router::new().route("/health", get(health)).route("/metrics", get(metrics)).with_state(health_state);
    let addr = format!("0.0.0.0:{}", env_parse("HEALTH_PORT", 8085u16));
    let listener = TcpListener::bind(&addr).await.context("failed to bind health listener")?;
    info!(%addr, "starting novatune lifecycle worker");

    tokio::select! {
        result = axum::serve(listener, app) => { result.context("health server error")?; }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            cancel.cancel();
        }
    }

    sweep_handle.await.context("sweep task panicked")?;
    Ok(())
}

