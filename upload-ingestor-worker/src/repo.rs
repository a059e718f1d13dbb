use chrono::{DateTime, Utc};
use domain::{Track, UploadSession, User};
use sqlx::{PgPool, Postgres, Transaction};

pub struct StoredSession {
    pub id: String,
    pub data: UploadSession,
    pub version: i64,
}

/// The object key is the idempotency key for every step of the ingest
/// pipeline.
pub async fn find_session_by_object_key(pool: &PgPool, object_key: &str) -> Result<Option<StoredSession>, sqlx::Error> {
    let row: Option<(String, serde_json::Value, i64)> =
    sqlx::query_as("SELECT id, data, _version FROM upload_sessions WHERE data->>'objectKey' = $1")
    .bind(object_key)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(id, data, version)| StoredSession { id, data: serde_json::from_value(data).expect("upload session deserializes"), version }))
}

pub async fn track_exists(pool: &PgPool, track_id: &str) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM tracks WHERE id = $1").bind(track_id).fetch_optional(pool).await?;
    Ok(row.is_some())
}

/// Marks a session terminally `Failed` outside of the main ingest
/// transaction (orphan/expired/mismatch paths steps 1-3).
/// A lost race against a concurrent writer is logged and dropped: the
/// session is already moving, which is the outcome this call wanted anyway.
pub async fn mark_session_failed(pool: &PgPool, session: &StoredSession) -> Result<(), sqlx::Error> {
    let mut data = session.data.clone();
    data.status = domain::UploadSessionStatus::Failed;
    let payload = serde_json::to_value(&data).expect("upload session serializes");
    let result = sqlx::query("UPDATE upload_sessions SET data = $1, _version = _version + 1, updated_at = now() WHERE id = $2 AND _version = $3")
    .bind(payload)
    .bind(&session.id)
    .bind(session.version)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        tracing::warn!(session_id = %session.id, "lost race marking upload session failed, leaving as-is");
    }
    Ok(())
}

/// Atomically creates the `Track`, completes the session, bumps the
/// owner's usage counters, and queues `AudioUploaded`.
pub async fn complete_ingest(
    pool: &PgPool,
    session: &StoredSession,
    track: &Track,
    audio_uploaded: &domain::AudioUploaded,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let mut tx: Transaction<'_, Postgres> = pool.begin().await?;

    let track_payload = serde_json::to_value(track).expect("track serializes");
    sqlx::query("INSERT INTO tracks (id, data, _version, created_at, updated_at) VALUES ($1, $2, 1, $3, $3)")
    .bind(&track.id)
    .bind(track_payload)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let mut session_data = session.data.clone();
    session_data.status = domain::UploadSessionStatus::Completed;
    let session_payload = serde_json::to_value(&session_data).expect("upload session serializes");
    let updated = sqlx::query(
        "UPDATE upload_sessions SET data = $1, _version = _version + 1, updated_at = now() WHERE id = $2 AND _version = $3",
    )
    .bind(session_payload)
    .bind(&session.id)
    .bind(session.version)
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound);
    }

    let user_row: Option<(serde_json::Value, i64)> =
    sqlx::query_as("SELECT data, _version FROM users WHERE id = $1 FOR UPDATE").bind(&track.user_id).fetch_optional(&mut *tx).await?;
    if let Some((data, version)) = user_row {
        let mut user: User = serde_json::from_value(data).expect("user deserializes");
        user.track_count += 1;
        user.used_storage_bytes += track.file_size_bytes;
        let payload = serde_json::to_value(&user).expect("user serializes");
        sqlx::query("UPDATE users SET data = $1, _version = _version + 1, updated_at = now() WHERE id = $2 AND _version = $3")
        .bind(payload)
        .bind(&track.user_id)
        .bind(version)
        .execute(&mut *tx)
        .await?;
    }

    let outbox_payload = serde_json::to_value(audio_uploaded).expect("audio uploaded event serializes");
    common_outbox::OutboxMessage::new(
        "AudioUploaded",
        audio_events_topic(),
        Some(track.user_id.clone()),
        outbox_payload,
        audio_uploaded.correlation_id.clone(),
    )
    .insert(&mut tx)
    .await?;

    tx.commit().await
}

pub fn audio_events_topic() -> String {
    std::env::var("AUDIO_EVENTS_TOPIC").unwrap_or_else(|_| "dev-audio-events".to_string())
}

