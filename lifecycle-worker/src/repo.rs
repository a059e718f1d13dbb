use chrono::{DateTime, Utc};
use common_store::{StoreError, StoredDocument};
use domain::{Playlist, Track};
use sqlx::PgPool;

fn row_to_document<T: serde::de::DeserializeOwned>(
    row: (String, serde_json::Value, i64, DateTime<Utc>, DateTime<Utc>),
) -> Result<StoredDocument<T>, StoreError> {
    let (id, data, version, created_at, updated_at) = row;
    Ok(StoredDocument { id, data: serde_json::from_value(data)?, version, created_at, updated_at })
}

/// Tracks whose grace period has elapsed and are due for reclamation.
pub async fn tracks_past_scheduled_deletion(pool: &PgPool, now: DateTime<Utc>, limit: i64) -> Result<Vec<StoredDocument<Track>>, StoreError> {
    let rows: Vec<(String, serde_json::Value, i64, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
        "SELECT id, data, _version, created_at, updated_at FROM tracks \
        WHERE data->>'status' = 'Deleted' AND (data->>'scheduledDeletionAt')::timestamptz <= $1 \
        ORDER BY (data->>'scheduledDeletionAt')::timestamptz ASC LIMIT $2",
    )
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(row_to_document).collect()
}

pub async fn count_tracks_past_scheduled_deletion(pool: &PgPool, now: DateTime<Utc>) -> Result<i64, StoreError> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT count(*) FROM tracks WHERE data->>'status' = 'Deleted' AND (data->>'scheduledDeletionAt')::timestamptz <= $1",
    )
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Playlists that still reference a track.
pub async fn playlists_referencing_track(pool: &PgPool, track_id: &str) -> Result<Vec<StoredDocument<Playlist>>, StoreError> {
    let rows: Vec<(String, serde_json::Value, i64, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
        "SELECT id, data, _version, created_at, updated_at FROM playlists WHERE data->'entries' @> $1::jsonb",
    )
    .bind(serde_json::json!([{"trackId": track_id}]))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(row_to_document).collect()
}

