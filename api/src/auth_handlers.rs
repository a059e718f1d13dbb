use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{Duration, Utc};
use common_auth::{generate_refresh_token, hash_password, hash_refresh_token, verify_password, AuthContext, PasswordHasherConfig};
use common_http_errors::{NovaError, NovaResult};
use domain::{normalize_email, tokens_to_evict, RefreshToken, User, UserStatus};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{info, warn};
use ulid::Ulid;

use crate::app::AppState;
use crate::repo;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: &'static str,
}

fn client_ip(headers: &HeaderMap, connect_info: &SocketAddr) -> String {
    headers
    .get("x-forwarded-for")
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .map(|v| v.trim().to_string())
    .unwrap_or_else(|| connect_info.ip().to_string())
}

async fn issue_session(state: &AppState, user: &User, device_id: Option<String>) -> NovaResult<TokenResponse> {
    let roles = user.roles.clone();
    let access_token = state.jwt_verifier.issue(&user.id, &roles).map_err(|e| NovaError::internal(e.to_string()))?;

    let active = repo::active_refresh_tokens_for_user(&state.db, &user.id).await?;
    let to_evict = tokens_to_evict(
        &active.iter().map(|d| d.data.clone()).collect::<Vec<_>>(),
        state.config.max_refresh_tokens_per_user,
    );
    for id in to_evict {
        repo::revoke_refresh_token(&state.db, &id).await?;
        info!(user_id = %user.id, revoked_token_id = %id, "evicted oldest refresh token over per-user limit");
    }

    let raw_token = generate_refresh_token();
    let token_hash = hash_refresh_token(&raw_token);
    let now = Utc::now();
    let refresh = RefreshToken {
        id: Ulid::new().to_string(),
        user_id: user.id.clone(),
        token_hash,
        device_id,
        created_at: now,
        expires_at: now + Duration::seconds(state.config.jwt_refresh_ttl_seconds),
        revoked: false,
    };
    state.store.insert(repo::TABLE_REFRESH_TOKENS, &refresh.id, &refresh).await.map_err(NovaError::internal)?;

    Ok(TokenResponse {
        access_token,
        refresh_token: raw_token,
        expires_in: state.config.jwt_access_ttl_seconds,
        token_type: "Bearer",
    })
}

pub async fn register(State(state): State<AppState>, Json(body): Json<RegisterRequest>) -> NovaResult<Json<TokenResponse>> {
    let email = normalize_email(&body.email);
    if email.is_empty() || !email.contains('@') {
        return Err(NovaError::validation("email must be a valid address"));
    }
    if body.password.len() < 8 {
        return Err(NovaError::validation("password must be at least 8 characters"));
    }
    if repo::find_user_by_email(&state.db, &email).await?.is_some() {
        return Err(NovaError::validation("email is already registered"));
    }

    let password_hash = hash_password(&PasswordHasherConfig::default(), &body.password).map_err(|e| NovaError::internal(e.to_string()))?;
    let now = Utc::now();
    let user = User {
        id: Ulid::new().to_string(),
        email,
        display_name: body.display_name.trim().to_string(),
        password_hash,
        roles: vec!["Listener".to_string()],
        status: UserStatus::Active,
        used_storage_bytes: 0,
        track_count: 0,
        created_at: now,
        last_login_at: None,
    };
    state.store.insert(repo::TABLE_USERS, &user.id, &user).await.map_err(NovaError::internal)?;

    let tokens = issue_session(&state, &user, None).await?;
    state.metrics.record_login("register");
    Ok(Json(tokens))
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(connect_info): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> NovaResult<Json<TokenResponse>> {
    let ip = client_ip(&headers, &connect_info);
    let email = normalize_email(&body.email);

    let ip_outcome = state.login_limiters.per_ip.check(&ip);
    if !ip_outcome.allowed {
        return Err(NovaError::RateLimitExceeded { retry_after_secs: ip_outcome.retry_after.as_secs().max(1) });
    }
    let account_outcome = state.login_limiters.per_account.check(&email);
    if !account_outcome.allowed {
        return Err(NovaError::RateLimitExceeded { retry_after_secs: account_outcome.retry_after.as_secs().max(1) });
    }

    let Some(stored) = repo::find_user_by_email(&state.db, &email).await? else {
        state.metrics.record_login("invalid_credentials");
        return Err(NovaError::InvalidCredentials);
    };
    let mut user = stored.data;

    if !verify_password(&user.password_hash, &body.password) {
        state.metrics.record_login("invalid_credentials");
        return Err(NovaError::InvalidCredentials);
    }
    if !user.is_active() {
        state.metrics.record_login("account_disabled");
        return Err(NovaError::AccountDisabled);
    }

    user.last_login_at = Some(Utc::now());
    if let Err(err) = state.store.save_optimistic(repo::TABLE_USERS, &user.id, &user, stored.version).await {
        warn!(user_id = %user.id, error = ?err, "failed to record last_login_at; continuing");
    }

    let tokens = issue_session(&state, &user, body.device_id).await?;
    state.metrics.record_login("success");
    Ok(Json(tokens))
}

pub async fn refresh(State(state): State<AppState>, Json(body): Json<RefreshRequest>) -> NovaResult<Json<TokenResponse>> {
    let token_hash = hash_refresh_token(&body.refresh_token);
    let Some(stored) = repo::find_refresh_token_by_hash(&state.db, &token_hash).await? else {
        return Err(NovaError::InvalidToken { detail: "refresh token not recognized".into() });
    };
    if !stored.data.is_active(Utc::now()) {
        return Err(NovaError::InvalidToken { detail: "refresh token expired or revoked".into() });
    }
    repo::revoke_refresh_token(&state.db, &stored.id).await?;

    let user_doc = state.store.load::<User>(repo::TABLE_USERS, &stored.data.user_id).await.map_err(|_| NovaError::InvalidToken {
        detail: "owning account no longer exists".into(),
    })?;
    if !user_doc.data.is_active() {
        return Err(NovaError::AccountDisabled);
    }

    let tokens = issue_session(&state, &user_doc.data, stored.data.device_id.clone()).await?;
    Ok(Json(tokens))
}

pub async fn logout(State(state): State<AppState>, auth: AuthContext, Json(body): Json<RefreshRequest>) -> NovaResult<()> {
    let token_hash = hash_refresh_token(&body.refresh_token);
    if let Some(stored) = repo::find_refresh_token_by_hash(&state.db, &token_hash).await? {
        if stored.data.user_id == auth.claims.subject {
            repo::revoke_refresh_token(&state.db, &stored.id).await?;
        }
    }
    state.cache.remove_by_pattern(&format!("stream:{}:*", auth.claims.subject)).await;
    Ok(())
}

