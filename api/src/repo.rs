use chrono::{DateTime, Utc};
use common_http_errors::NovaError;
use common_store::StoredDocument;
use domain::{RefreshToken, User};
use sqlx::PgPool;

/// Document-kind table names. Internal constants only, never built from
/// request input (common-store's generic CRUD takes a table name and would
/// otherwise be a SQL-injection surface).
pub const TABLE_USERS: &str = "users";
pub const TABLE_REFRESH_TOKENS: &str = "refresh_tokens";
pub const TABLE_TRACKS: &str = "tracks";
pub const TABLE_PLAYLISTS: &str = "playlists";
pub const TABLE_UPLOAD_SESSIONS: &str = "upload_sessions";

/// The plain indexes calls for ("users by normalized email",
/// "refresh-tokens by user and hash") aren't expressible through
/// `DocumentStore`'s id-keyed CRUD, so they're implemented here as direct
/// queries against the JSONB `data` column.
pub async fn find_user_by_email(pool: &PgPool, normalized_email: &str) -> Result<Option<StoredDocument<User>>, NovaError> {
    let row: Option<(String, serde_json::Value, i64, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
        "SELECT id, data, _version, created_at, updated_at FROM users WHERE data->>'email' = $1",
    )
    .bind(normalized_email)
    .fetch_optional(pool)
    .await
    .map_err(NovaError::internal)?;

    row.map(|(id, data, version, created_at, updated_at)| {
        Ok(StoredDocument { id, data: serde_json::from_value(data).map_err(NovaError::internal)?, version, created_at, updated_at })
    })
    .transpose()
}

pub async fn active_refresh_tokens_for_user(
    pool: &PgPool,
    user_id: &str,
) -> Result<Vec<StoredDocument<RefreshToken>>, NovaError> {
    let rows: Vec<(String, serde_json::Value, i64, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
        "SELECT id, data, _version, created_at, updated_at FROM refresh_tokens \
        WHERE data->>'userId' = $1 AND (data->>'revoked')::boolean = false \
        ORDER BY created_at ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(NovaError::internal)?;

    rows.into_iter()
    .map(|(id, data, version, created_at, updated_at)| {
        Ok(StoredDocument { id, data: serde_json::from_value(data).map_err(NovaError::internal)?, version, created_at, updated_at })
    })
    .collect()
}

pub async fn find_refresh_token_by_hash(
    pool: &PgPool,
    token_hash: &str,
) -> Result<Option<StoredDocument<RefreshToken>>, NovaError> {
    let row: Option<(String, serde_json::Value, i64, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
        "SELECT id, data, _version, created_at, updated_at FROM refresh_tokens WHERE data->>'tokenHash' = $1",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await
    .map_err(NovaError::internal)?;

    row.map(|(id, data, version, created_at, updated_at)| {
        Ok(StoredDocument { id, data: serde_json::from_value(data).map_err(NovaError::internal)?, version, created_at, updated_at })
    })
    .transpose()
}

pub async fn revoke_refresh_token(pool: &PgPool, id: &str) -> Result<(), NovaError> {
    sqlx::query("UPDATE refresh_tokens SET data = jsonb_set(data, '{revoked}', 'true'), updated_at = now() WHERE id = $1")
    .bind(id)
    .execute(pool)
    .await
    .map_err(NovaError::internal)?;
    Ok(())
}

fn row_to_document<T: serde::de::DeserializeOwned>(
    row: (String, serde_json::Value, i64, DateTime<Utc>, DateTime<Utc>),
) -> Result<StoredDocument<T>, NovaError> {
    let (id, data, version, created_at, updated_at) = row;
    Ok(StoredDocument { id, data: serde_json::from_value(data).map_err(NovaError::internal)?, version, created_at, updated_at })
}

pub struct TrackListOptions<'a> {
    pub owner_id: &'a str,
    pub search: Option<&'a str>,
    pub status: Option<domain::TrackStatus>,
    pub include_deleted: bool,
    pub sort_by: domain::SortField,
    pub sort_desc: bool,
    pub after: Option<(&'a str, &'a str)>,
    pub limit: i64,
}

fn sort_json_path(field: domain::SortField) -> &'static str {
    match field {
        domain::SortField::CreatedAt => "createdAt",
        domain::SortField::UpdatedAt => "updatedAt",
        domain::SortField::Title => "title",
        domain::SortField::Duration => "durationSeconds",
    }
}

/// Keyset-paginated, optionally full-text-searched track listing for a
/// single owner. `after` is the decoded cursor's
/// `(sortValue, trackId)` pair.
pub async fn list_tracks(pool: &PgPool, opts: &TrackListOptions<'_>) -> Result<Vec<StoredDocument<domain::Track>>, NovaError> {
    let mut builder = sqlx::QueryBuilder::new(
        "SELECT id, data, _version, created_at, updated_at FROM tracks WHERE data->>'userId' = ",
    );
    builder.push_bind(opts.owner_id);

    if !opts.include_deleted {
        builder.push(" AND data->>'status' != 'Deleted'");
    }
    if let Some(status) = opts.status {
        builder.push(" AND data->>'status' = ");
        builder.push_bind(format!("{status:?}"));
    }
    if let Some(search) = opts.search {
        builder.push(" AND search_vector @@ plainto_tsquery('english', ");
        builder.push_bind(search);
        builder.push(")");
    }

    let sort_path = sort_json_path(opts.sort_by);
    let order = if opts.sort_desc { "DESC" } else { "ASC" };
    if let Some((sort_value, track_id)) = opts.after {
        let cmp = if opts.sort_desc { "<" } else { ">" };
        builder.push(format!(" AND (data->>'{sort_path}', id) {cmp} ("));
        builder.push_bind(sort_value.to_string());
        builder.push(", ");
        builder.push_bind(track_id.to_string());
        builder.push(")");
    }

    builder.push(format!(" ORDER BY data->>'{sort_path}' {order}, id {order} LIMIT "));
    builder.push_bind(opts.limit);

    let rows: Vec<(String, serde_json::Value, i64, DateTime<Utc>, DateTime<Utc>)> =
    builder.build_query_as().fetch_all(pool).await.map_err(NovaError::internal)?;
    rows.into_iter().map(row_to_document).collect()
}

/// Finds every playlist owned by `user_id` that references `track_id`,
/// used by the lifecycle worker's cascade removal.
pub async fn playlists_referencing_track(
    pool: &PgPool,
    user_id: &str,
    track_id: &str,
) -> Result<Vec<StoredDocument<domain::Playlist>>, NovaError> {
    let rows: Vec<(String, serde_json::Value, i64, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
        "SELECT id, data, _version, created_at, updated_at FROM playlists \
        WHERE data->>'userId' = $1 AND data->'entries' @> $2::jsonb",
    )
    .bind(user_id)
    .bind(serde_json::json!([{"trackId": track_id}]))
    .fetch_all(pool)
    .await
    .map_err(NovaError::internal)?;
    rows.into_iter().map(row_to_document).collect()
}

pub async fn find_upload_session_by_object_key(
    pool: &PgPool,
    object_key: &str,
) -> Result<Option<StoredDocument<domain::UploadSession>>, NovaError> {
    let row: Option<(String, serde_json::Value, i64, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
        "SELECT id, data, _version, created_at, updated_at FROM upload_sessions WHERE data->>'objectKey' = $1",
    )
    .bind(object_key)
    .fetch_optional(pool)
    .await
    .map_err(NovaError::internal)?;
    row.map(row_to_document).transpose()
}

pub async fn load_track(pool: &PgPool, track_id: &str) -> Result<StoredDocument<domain::Track>, NovaError> {
    let row: Option<(String, serde_json::Value, i64, DateTime<Utc>, DateTime<Utc>)> =
    sqlx::query_as("SELECT id, data, _version, created_at, updated_at FROM tracks WHERE id = $1")
    .bind(track_id)
    .fetch_optional(pool)
    .await
    .map_err(NovaError::internal)?;
    row.map(row_to_document).transpose()?.ok_or_else(|| NovaError::not_found_id("Track", track_id))
}

pub async fn count_playlists_for_user(pool: &PgPool, user_id: &str) -> Result<i64, NovaError> {
    let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM playlists WHERE data->>'userId' = $1")
    .bind(user_id)
    .fetch_one(pool)
    .await
    .map_err(NovaError::internal)?;
    Ok(count)
}

pub async fn list_playlists_for_user(
    pool: &PgPool,
    user_id: &str,
    search: Option<&str>,
) -> Result<Vec<StoredDocument<domain::Playlist>>, NovaError> {
    let mut builder = sqlx::QueryBuilder::new(
        "SELECT id, data, _version, created_at, updated_at FROM playlists WHERE data->>'userId' = ",
    );
    builder.push_bind(user_id);
    if let Some(search) = search {
        builder.push(" AND search_vector @@ plainto_tsquery('english', ");
        builder.push_bind(search);
        builder.push(")");
    }
    builder.push(" ORDER BY created_at ASC");

    let rows: Vec<(String, serde_json::Value, i64, DateTime<Utc>, DateTime<Utc>)> =
    builder.build_query_as().fetch_all(pool).await.map_err(NovaError::internal)?;
    rows.into_iter().map(row_to_document).collect()
}

/// Admin user listing with optional full-text search, keyset-paginated by
/// `createdAt` ascending.
pub async fn list_users(
    pool: &PgPool,
    search: Option<&str>,
    after_id: Option<&str>,
    limit: i64,
) -> Result<Vec<StoredDocument<domain::User>>, NovaError> {
    let mut builder = sqlx::QueryBuilder::new("SELECT id, data, _version, created_at, updated_at FROM users WHERE 1 = 1");
    if let Some(search) = search {
        builder.push(" AND search_vector @@ plainto_tsquery('english', ");
        builder.push_bind(search);
        builder.push(")");
    }
    if let Some(after_id) = after_id {
        builder.push(" AND id > ");
        builder.push_bind(after_id.to_string());
    }
    builder.push(" ORDER BY id ASC LIMIT ");
    builder.push_bind(limit);

    let rows: Vec<(String, serde_json::Value, i64, DateTime<Utc>, DateTime<Utc>)> =
    builder.build_query_as().fetch_all(pool).await.map_err(NovaError::internal)?;
    rows.into_iter().map(row_to_document).collect()
}

/// Admin, cross-user track listing, otherwise identical in
/// shape to [`list_tracks`].
pub async fn list_tracks_admin(
    pool: &PgPool,
    search: Option<&str>,
    status: Option<domain::TrackStatus>,
    after_id: Option<&str>,
    limit: i64,
) -> Result<Vec<StoredDocument<domain::Track>>, NovaError> {
    let mut builder = sqlx::QueryBuilder::new("SELECT id, data, _version, created_at, updated_at FROM tracks WHERE 1 = 1");
    if let Some(status) = status {
        builder.push(" AND data->>'status' = ");
        builder.push_bind(format!("{status:?}"));
    }
    if let Some(search) = search {
        builder.push(" AND search_vector @@ plainto_tsquery('english', ");
        builder.push_bind(search);
        builder.push(")");
    }
    if let Some(after_id) = after_id {
        builder.push(" AND id > ");
        builder.push_bind(after_id.to_string());
    }
    builder.push(" ORDER BY id ASC LIMIT ");
    builder.push_bind(limit);

    let rows: Vec<(String, serde_json::Value, i64, DateTime<Utc>, DateTime<Utc>)> =
    builder.build_query_as().fetch_all(pool).await.map_err(NovaError::internal)?;
    rows.into_iter().map(row_to_document).collect()
}

pub async fn tracks_past_scheduled_deletion(
    pool: &PgPool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<StoredDocument<domain::Track>>, NovaError> {
    let rows: Vec<(String, serde_json::Value, i64, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
        "SELECT id, data, _version, created_at, updated_at FROM tracks \
        WHERE data->>'status' = 'Deleted' AND (data->>'scheduledDeletionAt')::timestamptz <= $1 \
        ORDER BY (data->>'scheduledDeletionAt')::timestamptz ASC LIMIT $2",
    )
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(NovaError::internal)?;
    rows.into_iter().map(row_to_document).collect()
}

/// Overview totals across `track_daily_aggregates` for buckets `>= since`.
pub struct AnalyticsOverview {
    pub total_plays: i64,
    pub total_completed_plays: i64,
    pub total_seconds_played: f64,
    pub active_user_count: i64,
}

pub async fn analytics_overview(pool: &PgPool, since: DateTime<Utc>) -> Result<AnalyticsOverview, NovaError> {
    let (total_plays, total_completed_plays, total_seconds_played): (Option<i64>, Option<i64>, Option<f64>) = sqlx::query_as(
        "SELECT \
        COALESCE(SUM((data->>'playCount')::bigint), 0), \
        COALESCE(SUM((data->>'completedPlayCount')::bigint), 0), \
        COALESCE(SUM((data->>'totalSecondsPlayed')::double precision), 0) \
        FROM track_daily_aggregates WHERE day_bucket >= $1",
    )
    .bind(since)
    .fetch_one(pool)
    .await
    .map_err(NovaError::internal)?;

    let (active_user_count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(DISTINCT user_id) FROM user_activity_aggregates WHERE day_bucket >= $1",
    )
    .bind(since)
    .fetch_one(pool)
    .await
    .map_err(NovaError::internal)?;

    Ok(AnalyticsOverview {
        total_plays: total_plays.unwrap_or(0),
        total_completed_plays: total_completed_plays.unwrap_or(0),
        total_seconds_played: total_seconds_played.unwrap_or(0.0),
        active_user_count,
    })
}

pub struct TopTrackRow {
    pub track_id: String,
    pub play_count: i64,
    pub total_seconds_played: f64,
}

/// Tracks ranked by play count over the window.
pub async fn top_tracks(pool: &PgPool, since: DateTime<Utc>, limit: i64) -> Result<Vec<TopTrackRow>, NovaError> {
    let rows: Vec<(String, i64, f64)> = sqlx::query_as(
        "SELECT track_id, \
        SUM((data->>'playCount')::bigint) AS play_count, \
        SUM((data->>'totalSecondsPlayed')::double precision) AS total_seconds_played \
        FROM track_daily_aggregates WHERE day_bucket >= $1 \
        GROUP BY track_id ORDER BY play_count DESC LIMIT $2",
    )
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(NovaError::internal)?;
    Ok(rows.into_iter().map(|(track_id, play_count, total_seconds_played)| TopTrackRow { track_id, play_count, total_seconds_played }).collect())
}

pub struct ActiveUserRow {
    pub user_id: String,
    pub play_count: i64,
    pub total_seconds_played: f64,
    pub last_active_at: DateTime<Utc>,
}

/// Users ranked by activity over the window.
pub async fn active_users(pool: &PgPool, since: DateTime<Utc>, limit: i64) -> Result<Vec<ActiveUserRow>, NovaError> {
    let rows: Vec<(String, i64, f64, DateTime<Utc>)> = sqlx::query_as(
        "SELECT user_id, \
        SUM((data->>'playCount')::bigint) AS play_count, \
        SUM((data->>'totalSecondsPlayed')::double precision) AS total_seconds_played, \
        MAX((data->>'lastActiveAt')::timestamptz) AS last_active_at \
        FROM user_activity_aggregates WHERE day_bucket >= $1 \
        GROUP BY user_id ORDER BY play_count DESC LIMIT $2",
    )
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(NovaError::internal)?;
    Ok(rows
        .into_iter()
        .map(|(user_id, play_count, total_seconds_played, last_active_at)| ActiveUserRow { user_id, play_count, total_seconds_played, last_active_at })
        .collect())
}

/// Audit entries in occurred-at order, keyset-paginated (
/// `GET /admin/audit`).
pub async fn list_audit_entries(
    pool: &PgPool,
    after_id: Option<&str>,
    limit: i64,
) -> Result<Vec<common_audit::AuditLogEntry>, NovaError> {
    let entries = if let Some(after_id) = after_id {
        sqlx::query_as::<_, common_audit::AuditLogEntry>(
            "SELECT id, actor_user_id, actor_email, action_code, target_type, target_id, reason_code, reason_text, \
            previous_state, new_state, occurred_at, correlation_id, client_ip, user_agent, \
            previous_entry_hash, content_hash \
            FROM audit_log_entries WHERE id > $1 ORDER BY occurred_at ASC, id ASC LIMIT $2",
        )
        .bind(after_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    } else {
        sqlx::query_as::<_, common_audit::AuditLogEntry>(
            "SELECT id, actor_user_id, actor_email, action_code, target_type, target_id, reason_code, reason_text, \
            previous_state, new_state, occurred_at, correlation_id, client_ip, user_agent, \
            previous_entry_hash, content_hash \
            FROM audit_log_entries ORDER BY occurred_at ASC, id ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    };
    entries.map_err(NovaError::internal)
}

