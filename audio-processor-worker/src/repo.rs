use domain::Track;
use sqlx::PgPool;

pub struct StoredTrack {
    pub data: Track,
    pub version: i64,
}

pub async fn load_track(pool: &PgPool, track_id: &str) -> Result<Option<StoredTrack>, sqlx::Error> {
    let row: Option<(serde_json::Value, i64)> = sqlx::query_as("SELECT data, _version FROM tracks WHERE id = $1").bind(track_id).fetch_optional(pool).await?;
    Ok(row.map(|(data, version)| StoredTrack { data: serde_json::from_value(data).expect("track deserializes"), version }))
}

/// Saves `track` back over `track_id`, retrying on a lost optimistic-
/// concurrency race a small bounded number of times (
/// "shared-resource policy"). Every retry reloads to get the caller's
/// intended mutation re-applied by the closure against the fresh version.
pub async fn save_track_with_retry(
    pool: &PgPool,
    track_id: &str,
    mut apply: impl FnMut(&mut Track),
) -> Result<(), sqlx::Error> {
    const MAX_ATTEMPTS: u32 = 5;
    for attempt in 1..=MAX_ATTEMPTS {
        let Some(mut stored) = load_track(pool, track_id).await? else { return Ok(()) };
        apply(&mut stored.data);
        let payload = serde_json::to_value(&stored.data).expect("track serializes");
        let result = sqlx::query("UPDATE tracks SET data = $1, _version = _version + 1, updated_at = now() WHERE id = $2 AND _version = $3")
        .bind(payload)
        .bind(track_id)
        .bind(stored.version)
        .execute(pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(());
        }
        tracing::warn!(track_id = %track_id, attempt, "lost optimistic concurrency race saving track, retrying");
    }
    Err(sqlx::Error::RowNotFound)
}

