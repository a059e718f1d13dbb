use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{Duration as ChronoDuration, Utc};
use common_audit::{append, verify, NewAuditEntry};
use common_http_errors::{NovaError, NovaResult};
use common_security::SecurityCtxExtractor;
use domain::{ModerationStatus, Track, TrackStatus, User, UserStatus};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::app::AppState;
use crate::repo::{self, TABLE_TRACKS, TABLE_USERS};

fn client_ip(headers: &HeaderMap, connect_info: &SocketAddr) -> String {
    headers
    .get("x-forwarded-for")
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .map(|v| v.trim().to_string())
    .unwrap_or_else(|| connect_info.ip().to_string())
}

async fn require_admin(ctx: &common_security::SecurityContext) -> NovaResult<()> {
    if ctx.is_admin() {
        Ok(())
    } else {
        Err(NovaError::AccessDenied { detail: "admin role required".into() })
    }
}

async fn load_actor_email(state: &AppState, user_id: &str) -> NovaResult<String> {
    let stored = state.store.load::<User>(TABLE_USERS, user_id).await.map_err(NovaError::internal)?;
    Ok(stored.data.email)
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub search: Option<String>,
    pub after: Option<String>,
    pub limit: Option<u32>,
}

pub async fn list_users(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Query(query): Query<ListUsersQuery>,
) -> NovaResult<Json<Vec<User>>> {
    require_admin(&ctx).await?;
    let limit = i64::from(query.limit.unwrap_or(state.config.max_user_page_size).min(state.config.max_user_page_size).max(1));
    let rows = repo::list_users(&state.db, query.search.as_deref(), query.after.as_deref(), limit).await?;
    Ok(Json(rows.into_iter().map(|r| r.data).collect()))
}

pub async fn get_user(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Path(user_id): Path<String>,
) -> NovaResult<Json<User>> {
    require_admin(&ctx).await?;
    let stored = state.store.load::<User>(TABLE_USERS, &user_id).await.map_err(|_| NovaError::not_found_id("User", &user_id))?;
    Ok(Json(stored.data))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserStatusRequest {
    pub status: String,
    pub reason_code: String,
    pub reason_text: Option<String>,
}

fn parse_user_status(raw: &str) -> NovaResult<UserStatus> {
    match raw {
        "Active" => Ok(UserStatus::Active),
        "Disabled" => Ok(UserStatus::Disabled),
        "PendingDeletion" => Ok(UserStatus::PendingDeletion),
        other => Err(NovaError::validation(format!("unrecognized status: {other}"))),
    }
}

/// `PATCH /admin/users/{id}` ( "update user status (forbidden
/// on self)").
pub async fn update_user_status(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    ConnectInfo(connect_info): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(body): Json<UpdateUserStatusRequest>,
) -> NovaResult<Json<User>> {
    require_admin(&ctx).await?;
    if user_id == ctx.user_id {
        return Err(NovaError::AccessDenied { detail: "admins may not change their own status".into() });
    }
    if !state.config.reason_code_allowlist.contains(&body.reason_code) {
        return Err(NovaError::validation("reasonCode is not in the configured allowlist"));
    }

    let stored = state.store.load::<User>(TABLE_USERS, &user_id).await.map_err(|_| NovaError::not_found_id("User", &user_id))?;
    let previous_state = serde_json::to_value(&stored.data).map_err(NovaError::internal)?;
    let mut user = stored.data;
    user.status = parse_user_status(&body.status)?;

    state
    .store
    .save_optimistic(TABLE_USERS, &user_id, &user, stored.version)
    .await
    .map_err(|e| match e {
        common_store::StoreError::VersionConflict => NovaError::validation("user was modified concurrently, retry"),
        other => NovaError::internal(other),
    })?;

    let new_state = serde_json::to_value(&user).map_err(NovaError::internal)?;
    let actor_email = load_actor_email(&state, &ctx.user_id).await?;
    append(
        &state.db,
        NewAuditEntry {
            actor_user_id: ctx.user_id.clone(),
            actor_email,
            action_code: "USER_STATUS_CHANGE".into(),
            target_type: "User".into(),
            target_id: user_id.clone(),
            reason_code: body.reason_code,
            reason_text: body.reason_text,
            previous_state: Some(previous_state),
            new_state: Some(new_state),
            correlation_id: ulid::Ulid::new().to_string(),
            client_ip: client_ip(&headers, &connect_info),
            user_agent: headers.get("user-agent").and_then(|v| v.to_str().ok()).unwrap_or("unknown").to_string(),
        },
    )
    .await
    .map_err(NovaError::internal)?;

    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
pub struct ListTracksAdminQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub after: Option<String>,
    pub limit: Option<u32>,
}

fn parse_status(raw: Option<&str>) -> Option<TrackStatus> {
    match raw {
        Some("Processing") => Some(TrackStatus::Processing),
        Some("Ready") => Some(TrackStatus::Ready),
        Some("Failed") => Some(TrackStatus::Failed),
        Some("Deleted") => Some(TrackStatus::Deleted),
        _ => None,
    }
}

pub async fn list_tracks(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Query(query): Query<ListTracksAdminQuery>,
) -> NovaResult<Json<Vec<Track>>> {
    require_admin(&ctx).await?;
    let limit = i64::from(query.limit.unwrap_or(state.config.max_track_page_size_admin).min(state.config.max_track_page_size_admin).max(1));
    let rows = repo::list_tracks_admin(&state.db, query.search.as_deref(), parse_status(query.status.as_deref()), query.after.as_deref(), limit).await?;
    Ok(Json(rows.into_iter().map(|r| r.data).collect()))
}

pub async fn get_track(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Path(track_id): Path<String>,
) -> NovaResult<Json<Track>> {
    require_admin(&ctx).await?;
    let stored = state.store.load::<Track>(TABLE_TRACKS, &track_id).await.map_err(|_| NovaError::not_found_id("Track", &track_id))?;
    Ok(Json(stored.data))
}

#[derive(Debug, Deserialize)]
pub struct ModerateTrackRequest {
    pub moderation_status: String,
    pub reason_code: String,
    pub reason_text: Option<String>,
}

fn parse_moderation_status(raw: &str) -> NovaResult<ModerationStatus> {
    match raw {
        "None" => Ok(ModerationStatus::None),
        "UnderReview" => Ok(ModerationStatus::UnderReview),
        "Disabled" => Ok(ModerationStatus::Disabled),
        "Removed" => Ok(ModerationStatus::Removed),
        other => Err(NovaError::validation(format!("unrecognized moderationStatus: {other}"))),
    }
}

/// `POST /admin/tracks/{id}/moderate`. `Removed` triggers the same
/// soft-delete path as the owner-facing delete, minus the eviction outbox
/// message (the lifecycle worker still reclaims the object on schedule).
pub async fn moderate_track(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    ConnectInfo(connect_info): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(track_id): Path<String>,
    Json(body): Json<ModerateTrackRequest>,
) -> NovaResult<Json<Track>> {
    require_admin(&ctx).await?;
    if !state.config.reason_code_allowlist.contains(&body.reason_code) {
        return Err(NovaError::validation("reasonCode is not in the configured allowlist"));
    }

    let stored = state.store.load::<Track>(TABLE_TRACKS, &track_id).await.map_err(|_| NovaError::not_found_id("Track", &track_id))?;
    let previous_state = serde_json::to_value(&stored.data).map_err(NovaError::internal)?;
    let mut track = stored.data;
    let moderation_status = parse_moderation_status(&body.moderation_status)?;
    track.moderation_status = moderation_status;
    track.updated_at = Utc::now();

    if moderation_status == ModerationStatus::Removed && track.status != TrackStatus::Deleted {
        track.soft_delete(Utc::now(), ChronoDuration::days(state.config.grace_duration_days))?;
    }

    state
    .store
    .save_optimistic(TABLE_TRACKS, &track_id, &track, stored.version)
    .await
    .map_err(|e| match e {
        common_store::StoreError::VersionConflict => NovaError::TrackConcurrency,
        other => NovaError::internal(other),
    })?;

    let new_state = serde_json::to_value(&track).map_err(NovaError::internal)?;
    let actor_email = load_actor_email(&state, &ctx.user_id).await?;
    append(
        &state.db,
        NewAuditEntry {
            actor_user_id: ctx.user_id.clone(),
            actor_email,
            action_code: "TRACK_MODERATE".into(),
            target_type: "Track".into(),
            target_id: track_id.clone(),
            reason_code: body.reason_code,
            reason_text: body.reason_text,
            previous_state: Some(previous_state),
            new_state: Some(new_state),
            correlation_id: ulid::Ulid::new().to_string(),
            client_ip: client_ip(&headers, &connect_info),
            user_agent: headers.get("user-agent").and_then(|v| v.to_str().ok()).unwrap_or("unknown").to_string(),
        },
    )
    .await
    .map_err(NovaError::internal)?;

    Ok(Json(track))
}

#[derive(Debug, Deserialize)]
pub struct AdminDeleteTrackRequest {
    pub reason_code: String,
    pub reason_text: Option<String>,
}

/// `DELETE /admin/tracks/{id}`.
pub async fn delete_track(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    ConnectInfo(connect_info): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(track_id): Path<String>,
    Json(body): Json<AdminDeleteTrackRequest>,
) -> NovaResult<StatusCode> {
    require_admin(&ctx).await?;
    if !state.config.reason_code_allowlist.contains(&body.reason_code) {
        return Err(NovaError::validation("reasonCode is not in the configured allowlist"));
    }

    let stored = state.store.load::<Track>(TABLE_TRACKS, &track_id).await.map_err(|_| NovaError::not_found_id("Track", &track_id))?;
    let previous_state = serde_json::to_value(&stored.data).map_err(NovaError::internal)?;
    let mut track = stored.data;
    let now = Utc::now();
    track.soft_delete(now, ChronoDuration::days(state.config.grace_duration_days))?;

    state
    .store
    .save_optimistic(TABLE_TRACKS, &track_id, &track, stored.version)
    .await
    .map_err(|e| match e {
        common_store::StoreError::VersionConflict => NovaError::TrackConcurrency,
        other => NovaError::internal(other),
    })?;

    let payload = serde_json::to_value(domain::TrackDeleted {
        track_id: track.id.clone(),
        user_id: track.user_id.clone(),
        object_key: track.object_key.clone(),
        waveform_object_key: track.waveform_object_key.clone(),
        file_size_bytes: track.file_size_bytes,
        deleted_at: track.deleted_at.unwrap_or(now),
        scheduled_deletion_at: track.scheduled_deletion_at.unwrap_or(now),
        correlation_id: ulid::Ulid::new().to_string(),
    })
    .map_err(NovaError::internal)?;

    let mut tx = state.db.begin().await.map_err(NovaError::internal)?;
    common_outbox::OutboxMessage::new("TrackDeleted", "dev-track-deletions", Some(track.user_id.clone()), payload, ulid::Ulid::new().to_string())
    .insert(&mut tx)
    .await
    .map_err(NovaError::internal)?;
    tx.commit().await.map_err(NovaError::internal)?;

    state.cache.remove(&format!("stream:{}:{}", track.user_id, track.id)).await;

    let new_state = serde_json::to_value(&track).map_err(NovaError::internal)?;
    let actor_email = load_actor_email(&state, &ctx.user_id).await?;
    append(
        &state.db,
        NewAuditEntry {
            actor_user_id: ctx.user_id.clone(),
            actor_email,
            action_code: "TRACK_DELETE".into(),
            target_type: "Track".into(),
            target_id: track_id.clone(),
            reason_code: body.reason_code,
            reason_text: body.reason_text,
            previous_state: Some(previous_state),
            new_state: Some(new_state),
            correlation_id: ulid::Ulid::new().to_string(),
            client_ip: client_ip(&headers, &connect_info),
            user_agent: headers.get("user-agent").and_then(|v| v.to_str().ok()).unwrap_or("unknown").to_string(),
        },
    )
    .await
    .map_err(NovaError::internal)?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsOverviewResponse {
    pub total_plays: i64,
    pub total_completed_plays: i64,
    pub total_seconds_played: f64,
    pub active_user_count: i64,
    pub window_days: i64,
}

pub async fn analytics_overview(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
) -> NovaResult<Json<AnalyticsOverviewResponse>> {
    require_admin(&ctx).await?;
    let since = Utc::now() - ChronoDuration::days(state.config.analytics_overview_days);
    let overview = repo::analytics_overview(&state.db, since).await?;
    Ok(Json(AnalyticsOverviewResponse {
        total_plays: overview.total_plays,
        total_completed_plays: overview.total_completed_plays,
        total_seconds_played: overview.total_seconds_played,
        active_user_count: overview.active_user_count,
        window_days: state.config.analytics_overview_days,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TopTracksQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopTrackResponse {
    pub track_id: String,
    pub play_count: i64,
    pub total_seconds_played: f64,
}

pub async fn top_tracks(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Query(query): Query<TopTracksQuery>,
) -> NovaResult<Json<Vec<TopTrackResponse>>> {
    require_admin(&ctx).await?;
    let since = Utc::now() - ChronoDuration::days(state.config.analytics_overview_days);
    let limit = i64::from(query.limit.unwrap_or(20).min(100).max(1));
    let rows = repo::top_tracks(&state.db, since, limit).await?;
    Ok(Json(
            rows.into_iter()
            .map(|r| TopTrackResponse { track_id: r.track_id, play_count: r.play_count, total_seconds_played: r.total_seconds_played })
            .collect(),
        ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveUserResponse {
    pub user_id: String,
    pub play_count: i64,
    pub total_seconds_played: f64,
    pub last_active_at: chrono::DateTime<Utc>,
}

pub async fn active_users(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Query(query): Query<TopTracksQuery>,
) -> NovaResult<Json<Vec<ActiveUserResponse>>> {
    require_admin(&ctx).await?;
    let since = Utc::now() - ChronoDuration::days(state.config.analytics_overview_days);
    let limit = i64::from(query.limit.unwrap_or(20).min(100).max(1));
    let rows = repo::active_users(&state.db, since, limit).await?;
    Ok(Json(
            rows.into_iter()
            .map(|r| ActiveUserResponse { user_id: r.user_id, play_count: r.play_count, total_seconds_played: r.total_seconds_played, last_active_at: r.last_active_at })
            .collect(),
        ))
}

#[derive(Debug, Deserialize)]
pub struct ListAuditQuery {
    pub after: Option<String>,
    pub limit: Option<u32>,
}

pub async fn list_audit(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Query(query): Query<ListAuditQuery>,
) -> NovaResult<Json<Vec<common_audit::AuditLogEntry>>> {
    require_admin(&ctx).await?;
    let limit = i64::from(query.limit.unwrap_or(state.config.max_audit_page_size).min(state.config.max_audit_page_size).max(1));
    let entries = repo::list_audit_entries(&state.db, query.after.as_deref(), limit).await?;
    Ok(Json(entries))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAuditResponse {
    pub is_valid: bool,
    pub entries_checked: usize,
    pub invalid_entries: usize,
    pub invalid_audit_ids: Vec<String>,
}

/// `POST /admin/audit/verify`.
pub async fn verify_audit(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
) -> NovaResult<Json<VerifyAuditResponse>> {
    require_admin(&ctx).await?;
    let result = verify(&state.db).await.map_err(NovaError::internal)?;
    Ok(Json(VerifyAuditResponse {
        is_valid: result.is_valid,
        entries_checked: result.entries_checked,
        invalid_entries: result.invalid_entries,
        invalid_audit_ids: result.invalid_audit_ids,
    }))
}

