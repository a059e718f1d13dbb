use std::sync::Arc;

use axum::extract::FromRef;
use common_auth::JwtVerifier;
use common_cache::CacheAdapter;
use common_storage::StorageAdapter;
use common_store::DocumentStore;
use rdkafka::producer::FutureProducer;
use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::metrics::ApiMetrics;
use crate::rate_limit::LoginLimiters;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub store: DocumentStore,
    pub cache: Arc<CacheAdapter>,
    pub storage: Arc<StorageAdapter>,
    pub jwt_verifier: Arc<JwtVerifier>,
    pub kafka_producer: FutureProducer,
    pub config: Arc<ApiConfig>,
    pub metrics: Arc<ApiMetrics>,
    pub login_limiters: Arc<LoginLimiters>,
}

impl FromRef<AppState> for Arc<JwtVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt_verifier.clone()
    }
}

