use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common_bus::{BusError, BusMessage, MessageHandler};
use common_storage::StorageAdapter;
use domain::{AudioUploaded, ModerationStatus, Track, TrackStatus};
use sqlx::PgPool;

use crate::repo;

pub struct IngestorHandler {
    pub db: PgPool,
    pub storage: Arc<StorageAdapter>,
}

fn file_stem_from_key(object_key: &str) -> String {
    object_key.rsplit('/').next().unwrap_or(object_key).to_string()
}

#[async_trait]
impl MessageHandler for IngestorHandler {
    async fn handle(&self, message: BusMessage) -> Result<(), BusError> {
        let object_key = match &message.key {
            Some(key) => key.clone(),
            None => {
                tracing::warn!("minio event notification had no key, acknowledging without action");
                return Ok(());
            }
        };

        // Step 1: orphan notifications (no matching session) are acknowledged without action.
        let Some(session) = repo::find_session_by_object_key(&self.db, &object_key).await.map_err(|e| BusError::Handler(e.to_string()))? else {
            tracing::info!(object_key = %object_key, "no upload session for object key, treating as orphan");
            return Ok(());
        };

        // Idempotency: if the track already exists, a previous delivery already finished the job.
        if repo::track_exists(&self.db, &session.data.track_id).await.map_err(|e| BusError::Handler(e.to_string()))? {
            tracing::info!(track_id = %session.data.track_id, "track already exists, skipping duplicate delivery");
            return Ok(());
        }

        let now = Utc::now();
        if session.data.is_expired(now) || session.data.status == domain::UploadSessionStatus::Failed {
            repo::mark_session_failed(&self.db, &session).await.map_err(|e| BusError::Handler(e.to_string()))?;
            let _ = self.storage.delete(&object_key).await;
            return Ok(());
        }

        let meta = match self.storage.head(&object_key).await {
            Ok(meta) => meta,
            Err(err) => return Err(BusError::Handler(err.to_string())),
        };
        let content_type_matches = meta.content_type.to_lowercase() == session.data.expected_mime_type.to_lowercase();
        let size_within_bounds = meta.content_length > 0 && meta.content_length <= session.data.max_allowed_size_bytes;
        if !content_type_matches || !size_within_bounds {
            tracing::warn!(
                object_key = %object_key,
                expected_mime = %session.data.expected_mime_type,
                actual_mime = %meta.content_type,
                max_size = session.data.max_allowed_size_bytes,
                actual_size = meta.content_length,
                "uploaded object does not match the reserved session, failing it"
            );
            repo::mark_session_failed(&self.db, &session).await.map_err(|e| BusError::Handler(e.to_string()))?;
            let _ = self.storage.delete(&object_key).await;
            return Ok(());
        }

        let bytes = self.storage.read_bytes(&object_key).await.map_err(|e| BusError::Handler(e.to_string()))?;
        let checksum = common_storage::sha256_hex(&bytes);

        let correlation_id = ulid::Ulid::new().to_string();
        let track = Track {
            id: session.data.track_id.clone(),
            user_id: session.data.user_id.clone(),
            title: session.data.title.clone().unwrap_or_else(|| file_stem_from_key(&object_key)),
            artist: session.data.artist.clone(),
            duration_seconds: None,
            object_key: object_key.clone(),
            file_size_bytes: meta.content_length,
            mime_type: meta.content_type.clone(),
            checksum_sha256: checksum.clone(),
            metadata: None,
            waveform_object_key: None,
            failure_reason_code: None,
            status: TrackStatus::Processing,
            moderation_status: ModerationStatus::None,
            status_before_delete: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
            deleted_at: None,
            scheduled_deletion_at: None,
        };

        let audio_uploaded = AudioUploaded {
            track_id: track.id.clone(),
            user_id: track.user_id.clone(),
            object_key: track.object_key.clone(),
            mime_type: track.mime_type.clone(),
            file_size_bytes: track.file_size_bytes,
            checksum_sha256: checksum,
            correlation_id,
            timestamp: now,
        };

        repo::complete_ingest(&self.db, &session, &track, &audio_uploaded, now).await.map_err(|e| BusError::Handler(e.to_string()))?;

        tracing::info!(track_id = %track.id, user_id = %track.user_id, "upload ingested");
        Ok(())
    }
}

