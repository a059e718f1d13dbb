use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{Duration as ChronoDuration, Utc};
use common_http_errors::{NovaError, NovaResult};
use common_security::{ensure_owner_or_admin, SecurityCtxExtractor};
use common_store::Cursor;
use domain::{SortField, Track, TrackStatus};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::AppState;
use crate::repo::{self, TrackListOptions, TABLE_TRACKS};

#[derive(Debug, Deserialize)]
pub struct ListTracksQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackListResponse {
    pub items: Vec<Track>,
    pub next_cursor: Option<String>,
}

fn parse_sort_field(raw: Option<&str>) -> SortField {
    match raw {
        Some("updatedAt") => SortField::UpdatedAt,
        Some("title") => SortField::Title,
        Some("duration") => SortField::Duration,
        _ => SortField::CreatedAt,
    }
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

fn sort_value_of(track: &Track, field: SortField) -> String {
    match field {
        SortField::CreatedAt => track.created_at.to_rfc3339(),
        SortField::UpdatedAt => track.updated_at.to_rfc3339(),
        SortField::Title => track.title.clone(),
        SortField::Duration => track.duration_seconds.unwrap_or(0.0).to_string(),
    }
}

pub async fn list(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Query(query): Query<ListTracksQuery>,
) -> NovaResult<Json<TrackListResponse>> {
    let sort_by = parse_sort_field(query.sort_by.as_deref());
    let sort_desc = query.sort_order.as_deref() == Some("desc");
    let limit = query.limit.unwrap_or(state.config.max_page_size).min(state.config.max_page_size).max(1);

    let after = match &query.cursor {
        Some(raw) => {
            let decoded = Cursor::decode(raw, ChronoDuration::seconds(state.config.cursor_max_age_seconds))
            .map_err(|_| NovaError::CursorExpired)?;
            Some(decoded)
        }
        None => None,
    };
    let after_tuple = after.as_ref().map(|c| (c.sort_value.as_str(), c.id.as_str()));

    let opts = TrackListOptions {
        owner_id: &ctx.user_id,
        search: query.search.as_deref(),
        status: parse_status(query.status.as_deref()),
        include_deleted: query.include_deleted,
        sort_by,
        sort_desc,
        after: after_tuple,
        limit: i64::from(limit) + 1,
    };
    let mut rows = repo::list_tracks(&state.db, &opts).await?;

    let next_cursor = if rows.len() > limit as usize {
        rows.truncate(limit as usize);
        rows.last().map(|r| Cursor::new(sort_value_of(&r.data, sort_by), r.id.clone()).encode())
    } else {
        None
    };

    Ok(Json(TrackListResponse { items: rows.into_iter().map(|r| r.data).collect(), next_cursor }))
}

pub async fn get(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Path(track_id): Path<String>,
) -> NovaResult<Json<Track>> {
    let stored = state.store.load::<Track>(TABLE_TRACKS, &track_id).await.map_err(|_| NovaError::not_found_id("Track", &track_id))?;
    ensure_owner_or_admin(&ctx, &stored.data.user_id).map_err(NovaError::from)?;
    Ok(Json(stored.data))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTrackRequest {
    pub title: Option<String>,
    pub artist: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Path(track_id): Path<String>,
    Json(body): Json<UpdateTrackRequest>,
) -> NovaResult<Json<Track>> {
    let stored = state.store.load::<Track>(TABLE_TRACKS, &track_id).await.map_err(|_| NovaError::not_found_id("Track", &track_id))?;
    ensure_owner_or_admin(&ctx, &stored.data.user_id).map_err(NovaError::from)?;

    let mut track = stored.data;
    track.ensure_not_deleted()?;
    if let Some(title) = body.title {
        track.title = title;
    }
    if let Some(artist) = body.artist {
        track.artist = Some(artist);
    }
    track.updated_at = Utc::now();

    state
    .store
    .save_optimistic(TABLE_TRACKS, &track_id, &track, stored.version)
    .await
    .map_err(|e| match e {
        common_store::StoreError::VersionConflict => NovaError::TrackConcurrency,
        other => NovaError::internal(other),
    })?;
    Ok(Json(track))
}

pub async fn delete(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Path(track_id): Path<String>,
) -> NovaResult<StatusCode> {
    let stored = state.store.load::<Track>(TABLE_TRACKS, &track_id).await.map_err(|_| NovaError::not_found_id("Track", &track_id))?;
    ensure_owner_or_admin(&ctx, &stored.data.user_id).map_err(NovaError::from)?;

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
    info!(track_id = %track.id, user_id = %track.user_id, "track soft-deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn restore(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Path(track_id): Path<String>,
) -> NovaResult<Json<Track>> {
    let stored = state.store.load::<Track>(TABLE_TRACKS, &track_id).await.map_err(|_| NovaError::not_found_id("Track", &track_id))?;
    ensure_owner_or_admin(&ctx, &stored.data.user_id).map_err(NovaError::from)?;

    let mut track = stored.data;
    track.restore(Utc::now())?;

    state
    .store
    .save_optimistic(TABLE_TRACKS, &track_id, &track, stored.version)
    .await
    .map_err(|e| match e {
        common_store::StoreError::VersionConflict => NovaError::TrackConcurrency,
        other => NovaError::internal(other),
    })?;
    Ok(Json(track))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamUrlResponse {
    pub stream_url: String,
    pub expires_at: chrono::DateTime<Utc>,
    pub content_type: String,
    pub file_size: i64,
    pub supports_range_requests: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedStreamUrl {
    stream_url: String,
    expires_at: chrono::DateTime<Utc>,
    content_type: String,
    file_size: i64,
}

pub async fn issue_stream_url(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Path(track_id): Path<String>,
) -> NovaResult<Json<StreamUrlResponse>> {
    let stored = state.store.load::<Track>(TABLE_TRACKS, &track_id).await.map_err(|_| NovaError::not_found_id("Track", &track_id))?;
    let track = stored.data;
    ensure_owner_or_admin(&ctx, &track.user_id).map_err(NovaError::from)?;
    if !track.is_streamable() {
        return Err(NovaError::TrackDeleted);
    }

    let cache_key = format!("stream:{}:{}", track.user_id, track.id);
    let now = Utc::now();
    let refresh_buffer = ChronoDuration::seconds(state.config.stream_refresh_buffer_seconds);

    if let Some(cached) = state.cache.get::<CachedStreamUrl>(&cache_key).await {
        if cached.expires_at > now + refresh_buffer {
            return Ok(Json(StreamUrlResponse {
                stream_url: cached.stream_url,
                expires_at: cached.expires_at,
                content_type: cached.content_type,
                file_size: cached.file_size,
                supports_range_requests: true,
            }));
        }
    }

    let ttl = state.config.presign_ttl();
    let stream_url = state.storage.presign_get(&track.object_key, ttl).await.map_err(|e| NovaError::ServiceUnavailable { detail: e.to_string() })?;
    let expires_at = now + ChronoDuration::seconds(ttl.as_secs() as i64);

    let cached = CachedStreamUrl { stream_url: stream_url.clone(), expires_at, content_type: track.mime_type.clone(), file_size: track.file_size_bytes };
    let cache_ttl = ttl.saturating_sub(std::time::Duration::from_secs(state.config.stream_cache_ttl_buffer_seconds.max(0) as u64));
    state.cache.set(&cache_key, &cached, cache_ttl).await;

    Ok(Json(StreamUrlResponse {
        stream_url,
        expires_at,
        content_type: track.mime_type,
        file_size: track.file_size_bytes,
        supports_range_requests: true,
    }))
}

