use chrono::{DateTime, Utc};
use domain::{PlaybackEventType, TrackDailyAggregate, TrackHourlyAggregate, UserActivityAggregate};
use sqlx::{Postgres, Transaction};

async fn load_hourly(tx: &mut Transaction<'_, Postgres>, track_id: &str, bucket: DateTime<Utc>) -> Result<Option<TrackHourlyAggregate>, sqlx::Error> {
    let row: Option<(serde_json::Value,)> = sqlx::query_as("SELECT data FROM track_hourly_aggregates WHERE track_id = $1 AND hour_bucket = $2 FOR UPDATE")
    .bind(track_id)
    .bind(bucket)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(|(data,)| serde_json::from_value(data).expect("hourly aggregate deserializes")))
}

async fn save_hourly(tx: &mut Transaction<'_, Postgres>, aggregate: &TrackHourlyAggregate) -> Result<(), sqlx::Error> {
    let payload = serde_json::to_value(aggregate).expect("hourly aggregate serializes");
    sqlx::query(
        "INSERT INTO track_hourly_aggregates (track_id, hour_bucket, data, updated_at) VALUES ($1, $2, $3, now())
        ON CONFLICT (track_id, hour_bucket) DO UPDATE SET data = $3, updated_at = now()",
    )
    .bind(&aggregate.track_id)
    .bind(aggregate.hour_bucket)
    .bind(payload)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn load_daily(tx: &mut Transaction<'_, Postgres>, track_id: &str, bucket: DateTime<Utc>) -> Result<Option<TrackDailyAggregate>, sqlx::Error> {
    let row: Option<(serde_json::Value,)> = sqlx::query_as("SELECT data FROM track_daily_aggregates WHERE track_id = $1 AND day_bucket = $2 FOR UPDATE")
    .bind(track_id)
    .bind(bucket)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(|(data,)| serde_json::from_value(data).expect("daily aggregate deserializes")))
}

async fn save_daily(tx: &mut Transaction<'_, Postgres>, aggregate: &TrackDailyAggregate) -> Result<(), sqlx::Error> {
    let payload = serde_json::to_value(aggregate).expect("daily aggregate serializes");
    sqlx::query(
        "INSERT INTO track_daily_aggregates (track_id, day_bucket, data, updated_at) VALUES ($1, $2, $3, now())
        ON CONFLICT (track_id, day_bucket) DO UPDATE SET data = $3, updated_at = now()",
    )
    .bind(&aggregate.track_id)
    .bind(aggregate.day_bucket)
    .bind(payload)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn load_user_activity(tx: &mut Transaction<'_, Postgres>, user_id: &str, bucket: DateTime<Utc>) -> Result<Option<UserActivityAggregate>, sqlx::Error> {
    let row: Option<(serde_json::Value,)> = sqlx::query_as("SELECT data FROM user_activity_aggregates WHERE user_id = $1 AND day_bucket = $2 FOR UPDATE")
    .bind(user_id)
    .bind(bucket)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(|(data,)| serde_json::from_value(data).expect("user activity aggregate deserializes")))
}

async fn save_user_activity(tx: &mut Transaction<'_, Postgres>, aggregate: &UserActivityAggregate) -> Result<(), sqlx::Error> {
    let payload = serde_json::to_value(aggregate).expect("user activity aggregate serializes");
    sqlx::query(
        "INSERT INTO user_activity_aggregates (user_id, day_bucket, data, updated_at) VALUES ($1, $2, $3, now())
        ON CONFLICT (user_id, day_bucket) DO UPDATE SET data = $3, updated_at = now()",
    )
    .bind(&aggregate.user_id)
    .bind(aggregate.day_bucket)
    .bind(payload)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Rolls a single playback event into all three aggregates in one
/// transaction, so updates to the three aggregates for a single event
/// happen atomically.
#[allow(clippy::too_many_arguments)]
pub async fn apply_event(
    tx: &mut Transaction<'_, Postgres>,
    track_id: &str,
    user_id: &str,
    hour_bucket: DateTime<Utc>,
    day_bucket: DateTime<Utc>,
    event_type: PlaybackEventType,
    seconds_played: f64,
    client_timestamp: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let mut hourly = match load_hourly(tx, track_id, hour_bucket).await? {
        Some(existing) => existing,
        None => TrackHourlyAggregate::empty(track_id.to_string(), hour_bucket, now),
    };
    hourly.apply(event_type, seconds_played, now);
    save_hourly(tx, &hourly).await?;

    let mut daily = match load_daily(tx, track_id, day_bucket).await? {
        Some(existing) => existing,
        None => TrackDailyAggregate::empty(track_id.to_string(), day_bucket, now),
    };
    let is_new_listener = event_type == PlaybackEventType::Started;
    daily.apply(event_type, seconds_played, is_new_listener, now);
    save_daily(tx, &daily).await?;

    let mut activity = match load_user_activity(tx, user_id, day_bucket).await? {
        Some(existing) => existing,
        None => UserActivityAggregate::empty(user_id.to_string(), day_bucket, now),
    };
    activity.apply(seconds_played, client_timestamp, now);
    save_user_activity(tx, &activity).await?;

    Ok(())
}

