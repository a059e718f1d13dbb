use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use common_auth::{JwtConfig, JwtVerifier};
use common_cache::CacheAdapter;
use common_crypto::KeyRing;
use common_storage::StorageAdapter;
use common_store::DocumentStore;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::info;

use api::app::AppState;
use api::config::ApiConfig;
use api::metrics::ApiMetrics;
use api::rate_limit::{spawn_sweeper, LoginLimiters};

fn env_required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn build_key_ring() -> Result<KeyRing> {
    let active_version: u32 = env::var("CACHE_KEY_ACTIVE_VERSION").ok().and_then(|v| v.parse().ok()).unwrap_or(1);
    let raw = env_required("CACHE_ENCRYPTION_KEYS").context("CACHE_ENCRYPTION_KEYS must be `version:base64key[,version:base64key...]`")?;
    let mut keys = Vec::new();
    for entry in raw.split(',') {
        let (version, key) = entry.split_once(':').context("CACHE_ENCRYPTION_KEYS entries must be `version:base64key`")?;
        let version: u32 = version.trim().parse().context("CACHE_ENCRYPTION_KEYS version must be a u32")?;
        keys.push((version, key.trim()));
    }
    KeyRing::new(keys.into_iter().map(|(v, k)| (v, k)).collect(), active_version).map_err(anyhow::Error::from)
}

#[tokio::main]
async fn main() -> Result<()> {
    common_observability::init_tracing("api");

    let config = Arc::new(ApiConfig::from_env()?);

    let database_url = env_required("DATABASE_URL")?;
    let db = PgPoolOptions::new().max_connections(20).connect(&database_url).await.context("failed to connect to database")?;
    sqlx::migrate!("./migrations").run(&db).await.context("failed to run migrations")?;

    let store = DocumentStore::new(db.clone());

    let key_ring = build_key_ring()?;
    let redis_url = env_required("REDIS_URL")?;
    let cache = Arc::new(CacheAdapter::new(&redis_url, key_ring).context("failed to initialize cache adapter")?);

    let storage = Arc::new(StorageAdapter::new(
            &env_required("S3_ENDPOINT")?,
            &env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            &env_required("S3_ACCESS_KEY")?,
            &env_required("S3_SECRET_KEY")?,
            &env_required("S3_BUCKET")?,
        ));

    let jwt_config = JwtConfig::new(config.jwt_issuer.clone(), config.jwt_signing_key.clone())
    .with_access_ttl(config.jwt_access_ttl_seconds)
    .with_refresh_ttl(config.jwt_refresh_ttl_seconds);
    let jwt_verifier = Arc::new(JwtVerifier::new(jwt_config));

    let kafka_producer: rdkafka::producer::FutureProducer = rdkafka::ClientConfig::new()
    .set("bootstrap.servers", env::var("KAFKA_BOOTSTRAP").unwrap_or_else(|_| "localhost:9092".to_string()))
    .create()
    .context("failed to create kafka producer")?;

    let metrics = Arc::new(ApiMetrics::new()?);
    let login_limiters = Arc::new(LoginLimiters::new(config.login_ip_rate_limit, config.login_account_rate_limit));
    spawn_sweeper(login_limiters.clone());

    let state = AppState { db, store, cache, storage, jwt_verifier, kafka_producer, config: config.clone(), metrics, login_limiters };

    let app = api::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse().context("invalid HOST/PORT")?;
    let listener = TcpListener::bind(addr).await.context("failed to bind listener")?;
    info!(%addr, "starting novatune api");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await.context("server error")?;
    Ok(())
}

