use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use common_http_errors::{NovaError, NovaResult};
use common_security::SecurityCtxExtractor;
use domain::upload::{build_object_key, is_allowed_mime};
use domain::{User, UploadSession, UploadSessionStatus};
use serde::{Deserialize, Serialize};
use tracing::info;
use ulid::Ulid;

use crate::app::AppState;
use crate::repo::TABLE_USERS;

#[derive(Debug, Deserialize)]
pub struct InitiateUploadRequest {
    pub file_name: String,
    pub mime_type: String,
    pub file_size_bytes: i64,
    pub title: Option<String>,
    pub artist: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateUploadResponse {
    pub upload_id: String,
    pub track_id: String,
    pub presigned_url: String,
    pub expires_at: DateTime<Utc>,
    pub object_key: String,
}

fn file_stem(file_name: &str) -> String {
    std::path::Path::new(file_name)
    .file_stem()
    .and_then(|s| s.to_str())
    .unwrap_or(file_name)
    .to_string()
}

pub async fn initiate(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Json(body): Json<InitiateUploadRequest>,
) -> NovaResult<Json<InitiateUploadResponse>> {
    if body.file_name.trim().is_empty() {
        return Err(NovaError::validation("fileName must not be empty"));
    }
    if !is_allowed_mime(&body.mime_type) {
        return Err(NovaError::validation(format!("unsupported mime type: {}", body.mime_type)));
    }
    if body.file_size_bytes <= 0 || body.file_size_bytes > state.config.max_file_size_bytes {
        return Err(NovaError::validation("fileSizeBytes exceeds the configured maximum"));
    }

    let stored = state.store.load::<User>(TABLE_USERS, &ctx.user_id).await.map_err(|_| NovaError::not_found("User"))?;
    let user = stored.data;

    if !user.fits_within_quota(state.config.quota_bytes_per_user, body.file_size_bytes) {
        return Err(NovaError::QuotaExceeded {
            used_bytes: user.used_storage_bytes,
            quota_bytes: state.config.quota_bytes_per_user,
            requested_bytes: body.file_size_bytes,
        });
    }
    if user.track_count >= state.config.max_tracks_per_user {
        return Err(NovaError::validation("maximum track count reached"));
    }

    let track_id = Ulid::new().to_string();
    let object_key = build_object_key(&user.id, &track_id);
    let now = Utc::now();
    let expires_at = now + Duration::seconds(state.config.upload_session_ttl_seconds);

    let presigned_url = state
    .storage
    .presign_put(&object_key, &body.mime_type, state.config.presign_ttl())
    .await
    .map_err(|e| NovaError::ServiceUnavailable { detail: e.to_string() })?;

    let session = UploadSession {
        id: Ulid::new().to_string(),
        user_id: user.id.clone(),
        track_id: track_id.clone(),
        object_key: object_key.clone(),
        expected_mime_type: body.mime_type.to_lowercase(),
        max_allowed_size_bytes: body.file_size_bytes,
        created_at: now,
        expires_at,
        status: UploadSessionStatus::Pending,
        title: body.title.or_else(|| Some(file_stem(&body.file_name))),
        artist: body.artist,
    };
    state
    .store
    .insert(crate::repo::TABLE_UPLOAD_SESSIONS, &session.id, &session)
    .await
    .map_err(NovaError::internal)?;

    info!(user_id = %user.id, track_id = %track_id, object_key = %object_key, "issued upload session");

    Ok(Json(InitiateUploadResponse {
        upload_id: session.id,
        track_id,
        presigned_url,
        expires_at,
        object_key,
    }))
}

