pub mod admin_handlers;
pub mod app;
pub mod auth_handlers;
pub mod config;
pub mod metrics;
pub mod playlist_handlers;
pub mod rate_limit;
pub mod repo;
pub mod telemetry_handlers;
pub mod track_handlers;
pub mod upload_handlers;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use app::AppState;

async fn health() -> &'static str {
    "ok"
}

async fn alive() -> &'static str {
    "ok"
}

async fn metrics_handler(State(state): State<AppState>) -> axum::response::Response {
    match state.metrics.render() {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = ?err, "failed to render metrics");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Per-route request counter. Recorded by route template, not the raw path,
/// so the cardinality stays bounded.
async fn record_requests_mw(State(state): State<AppState>, req: Request, next: Next) -> axum::response::Response {
    let route = req
    .extensions()
    .get::<axum::extract::MatchedPath>()
    .map(|p| p.as_str().to_string())
    .unwrap_or_else(|| req.uri().path().to_string());
    let resp = next.run(req).await;
    let outcome = if resp.status().is_success() { "success" } else { "error" };
    state.metrics.record_request(&route, outcome);
    resp
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
    .route("/health", get(health))
    .route("/alive", get(alive))
    .route("/metrics", get(metrics_handler))
    .route("/auth/register", post(auth_handlers::register))
    .route("/auth/login", post(auth_handlers::login))
    .route("/auth/refresh", post(auth_handlers::refresh))
    .route("/auth/logout", post(auth_handlers::logout))
    .route("/tracks/upload/initiate", post(upload_handlers::initiate))
    .route("/tracks", get(track_handlers::list))
    .route("/tracks/:id", get(track_handlers::get).patch(track_handlers::update).delete(track_handlers::delete))
    .route("/tracks/:id/restore", post(track_handlers::restore))
    .route("/tracks/:id/stream", post(track_handlers::issue_stream_url))
    .route("/playlists", get(playlist_handlers::list).post(playlist_handlers::create))
    .route("/playlists/:id", get(playlist_handlers::get).patch(playlist_handlers::update).delete(playlist_handlers::delete))
    .route("/playlists/:id/tracks", post(playlist_handlers::add_tracks))
    .route("/playlists/:id/tracks/:position", axum::routing::delete(playlist_handlers::remove_at))
    .route("/playlists/:id/reorder", post(playlist_handlers::reorder))
    .route("/telemetry/playback", post(telemetry_handlers::ingest))
    .route("/admin/users", get(admin_handlers::list_users))
    .route("/admin/users/:id", get(admin_handlers::get_user).patch(admin_handlers::update_user_status))
    .route("/admin/tracks", get(admin_handlers::list_tracks))
    .route("/admin/tracks/:id", get(admin_handlers::get_track).delete(admin_handlers::delete_track))
    .route("/admin/tracks/:id/moderate", post(admin_handlers::moderate_track))
    .route("/admin/analytics/overview", get(admin_handlers::analytics_overview))
    .route("/admin/analytics/tracks/top", get(admin_handlers::top_tracks))
    .route("/admin/analytics/users/active", get(admin_handlers::active_users))
    .route("/admin/audit", get(admin_handlers::list_audit))
    .route("/admin/audit/verify", post(admin_handlers::verify_audit))
    .route_layer(middleware::from_fn_with_state(state.clone(), record_requests_mw))
    .layer(cors)
    .with_state(state)
}

