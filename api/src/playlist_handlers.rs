use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use common_http_errors::{NovaError, NovaResult};
use common_security::{ensure_owner_or_admin, SecurityCtxExtractor};
use domain::{Move, Playlist, TrackStatus, Visibility};
use serde::Deserialize;
use sqlx::PgPool;
use ulid::Ulid;

use crate::app::AppState;
use crate::repo::{self, TABLE_PLAYLISTS};

fn version_conflict_to_playlist(e: common_store::StoreError) -> NovaError {
    match e {
        common_store::StoreError::VersionConflict => NovaError::PlaylistConcurrency,
        other => NovaError::internal(other),
    }
}

async fn load_owned_playlist(state: &AppState, ctx: &common_security::SecurityContext, playlist_id: &str) -> NovaResult<common_store::StoredDocument<Playlist>> {
    let stored = state
    .store
    .load::<Playlist>(TABLE_PLAYLISTS, playlist_id)
    .await
    .map_err(|_| NovaError::not_found_id("Playlist", playlist_id))?;
    ensure_owner_or_admin(ctx, &stored.data.user_id).map_err(NovaError::from)?;
    Ok(stored)
}

async fn track_durations_for(pool: &PgPool, track_ids: &[String]) -> NovaResult<HashMap<String, f64>> {
    let mut map = HashMap::new();
    for id in track_ids {
        if map.contains_key(id) {
            continue;
        }
        if let Ok(stored) = repo::load_track(pool, id).await {
            map.insert(id.clone(), stored.data.duration_seconds.unwrap_or(0.0));
        }
    }
    Ok(map)
}

#[derive(Debug, Deserialize)]
pub struct CreatePlaylistRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
}

fn parse_visibility(raw: Option<&str>) -> Visibility {
    match raw {
        Some("Unlisted") => Visibility::Unlisted,
        Some("Public") => Visibility::Public,
        _ => Visibility::Private,
    }
}

pub async fn create(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Json(body): Json<CreatePlaylistRequest>,
) -> NovaResult<Json<Playlist>> {
    Playlist::validate_name(&body.name)?;
    Playlist::validate_description(&body.description)?;

    let owned = repo::count_playlists_for_user(&state.db, &ctx.user_id).await?;
    if owned >= state.config.max_playlists_per_user as i64 {
        return Err(NovaError::validation("maximum playlist count reached"));
    }

    let now = Utc::now();
    let playlist = Playlist {
        id: Ulid::new().to_string(),
        user_id: ctx.user_id.clone(),
        name: body.name,
        description: body.description,
        entries: Vec::new(),
        track_count: 0,
        total_duration_seconds: 0.0,
        visibility: parse_visibility(body.visibility.as_deref()),
        created_at: now,
        updated_at: now,
    };
    state.store.insert(TABLE_PLAYLISTS, &playlist.id, &playlist).await.map_err(NovaError::internal)?;
    Ok(Json(playlist))
}

#[derive(Debug, Deserialize)]
pub struct ListPlaylistsQuery {
    pub search: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Query(query): Query<ListPlaylistsQuery>,
) -> NovaResult<Json<Vec<Playlist>>> {
    let rows = repo::list_playlists_for_user(&state.db, &ctx.user_id, query.search.as_deref()).await?;
    Ok(Json(rows.into_iter().map(|r| r.data).collect()))
}

pub async fn get(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Path(playlist_id): Path<String>,
) -> NovaResult<Json<Playlist>> {
    let stored = load_owned_playlist(&state, &ctx, &playlist_id).await?;
    Ok(Json(stored.data))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlaylistRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Path(playlist_id): Path<String>,
    Json(body): Json<UpdatePlaylistRequest>,
) -> NovaResult<Json<Playlist>> {
    let stored = load_owned_playlist(&state, &ctx, &playlist_id).await?;
    let mut playlist = stored.data;

    if let Some(name) = body.name {
        Playlist::validate_name(&name)?;
        playlist.name = name;
    }
    if body.description.is_some() {
        Playlist::validate_description(&body.description)?;
        playlist.description = body.description;
    }
    if let Some(visibility) = body.visibility {
        playlist.visibility = parse_visibility(Some(&visibility));
    }
    playlist.updated_at = Utc::now();

    state.store.save_optimistic(TABLE_PLAYLISTS, &playlist_id, &playlist, stored.version).await.map_err(version_conflict_to_playlist)?;
    Ok(Json(playlist))
}

pub async fn delete(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Path(playlist_id): Path<String>,
) -> NovaResult<StatusCode> {
    load_owned_playlist(&state, &ctx, &playlist_id).await?;
    state.store.delete(TABLE_PLAYLISTS, &playlist_id).await.map_err(NovaError::internal)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct AddTracksRequest {
    pub track_ids: Vec<String>,
    pub position: Option<usize>,
}

pub async fn add_tracks(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Path(playlist_id): Path<String>,
    Json(body): Json<AddTracksRequest>,
) -> NovaResult<Json<Playlist>> {
    if body.track_ids.is_empty() || body.track_ids.len() > state.config.max_add_batch {
        return Err(NovaError::validation("trackIds must contain 1..maxAddBatch entries"));
    }

    for track_id in &body.track_ids {
        let stored = repo::load_track(&state.db, track_id).await.map_err(|_| NovaError::not_found_id("Track", track_id))?;
        if stored.data.user_id != ctx.user_id {
            return Err(NovaError::AccessDenied { detail: format!("track {track_id} is not owned by the caller") });
        }
        if stored.data.status == TrackStatus::Deleted {
            return Err(NovaError::TrackDeleted);
        }
    }

    let stored = load_owned_playlist(&state, &ctx, &playlist_id).await?;
    let mut playlist = stored.data;
    let durations = track_durations_for(&state.db, &body.track_ids).await?;
    playlist.add_tracks(&body.track_ids, body.position, &durations, state.config.max_playlist_entries, Utc::now())?;

    state.store.save_optimistic(TABLE_PLAYLISTS, &playlist_id, &playlist, stored.version).await.map_err(version_conflict_to_playlist)?;
    Ok(Json(playlist))
}

pub async fn remove_at(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Path((playlist_id, position)): Path<(String, usize)>,
) -> NovaResult<Json<Playlist>> {
    let stored = load_owned_playlist(&state, &ctx, &playlist_id).await?;
    let mut playlist = stored.data;
    let track_ids: Vec<String> = playlist.entries.iter().map(|e| e.track_id.clone()).collect();
    let durations = track_durations_for(&state.db, &track_ids).await?;
    playlist.remove_at(position, &durations, Utc::now())?;

    state.store.save_optimistic(TABLE_PLAYLISTS, &playlist_id, &playlist, stored.version).await.map_err(version_conflict_to_playlist)?;
    Ok(Json(playlist))
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub moves: Vec<MoveDto>,
}

#[derive(Debug, Deserialize)]
pub struct MoveDto {
    pub from: usize,
    pub to: usize,
}

pub async fn reorder(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Path(playlist_id): Path<String>,
    Json(body): Json<ReorderRequest>,
) -> NovaResult<Json<Playlist>> {
    let stored = load_owned_playlist(&state, &ctx, &playlist_id).await?;
    let mut playlist = stored.data;
    let moves: Vec<Move> = body.moves.into_iter().map(|m| Move { from: m.from, to: m.to }).collect();
    playlist.reorder(&moves, Utc::now())?;

    state.store.save_optimistic(TABLE_PLAYLISTS, &playlist_id, &playlist, stored.version).await.map_err(version_conflict_to_playlist)?;
    Ok(Json(playlist))
}

/// Called by the lifecycle worker once a track's objects have been
/// reclaimed.
pub async fn cascade_remove_track(pool: &PgPool, user_id: &str, track_id: &str) -> NovaResult<()> {
    let playlists = repo::playlists_referencing_track(pool, user_id, track_id).await?;
    for stored in playlists {
        let mut playlist = stored.data;
        let track_ids: Vec<String> = playlist.entries.iter().map(|e| e.track_id.clone()).filter(|id| id != track_id).collect();
        let durations = track_durations_for(pool, &track_ids).await?;
        if playlist.cascade_remove_track(track_id, &durations, Utc::now()) {
            let store = common_store::DocumentStore::new(pool.clone());
            if let Err(err) = store.save_optimistic(TABLE_PLAYLISTS, &stored.id, &playlist, stored.version).await {
                tracing::warn!(playlist_id = %stored.id, error = ?err, "cascade removal lost an optimistic-concurrency race, will retry next lifecycle pass");
            }
        }
    }
    Ok(())
}

