use chrono::{DateTime, Duration, Utc};
use common_http_errors::NovaError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackStatus {
    Processing,
    Ready,
    Failed,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModerationStatus {
    None,
    UnderReview,
    Disabled,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrackMetadata {
    pub sample_rate: Option<i32>,
    pub channels: Option<i32>,
    pub bitrate: Option<i32>,
    pub codec: Option<String>,
    pub bit_depth: Option<i32>,
    pub tags: Option<serde_json::Value>,
}

/// `Track`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub artist: Option<String>,
    pub duration_seconds: Option<f64>,
    pub object_key: String,
    pub file_size_bytes: i64,
    pub mime_type: String,
    pub checksum_sha256: String,
    pub metadata: Option<TrackMetadata>,
    pub waveform_object_key: Option<String>,
    pub failure_reason_code: Option<String>,
    pub status: TrackStatus,
    pub moderation_status: ModerationStatus,
    pub status_before_delete: Option<TrackStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub scheduled_deletion_at: Option<DateTime<Utc>>,
}

impl Track {
    /// A track is streamable only when Ready and not under heavier
    /// moderation ( invariant).
    pub fn is_streamable(&self) -> bool {
        self.status == TrackStatus::Ready
        && matches!(self.moderation_status, ModerationStatus::None | ModerationStatus::UnderReview)
    }

    pub fn ensure_not_deleted(&self) -> Result<(), NovaError> {
        if self.status == TrackStatus::Deleted {
            return Err(NovaError::TrackDeleted);
        }
        Ok(())
    }

    /// Applies the soft-delete transition in place. Grace period runs from
    /// `deletedAt`.
    pub fn soft_delete(&mut self, now: DateTime<Utc>, grace: Duration) -> Result<(), NovaError> {
        if self.status == TrackStatus::Deleted {
            return Err(NovaError::TrackAlreadyDeleted);
        }
        self.status_before_delete = Some(self.status);
        self.status = TrackStatus::Deleted;
        self.deleted_at = Some(now);
        self.scheduled_deletion_at = Some(now + grace);
        self.updated_at = now;
        Ok(())
    }

    /// Restores the pre-deletion status if still within the grace window.
    pub fn restore(&mut self, now: DateTime<Utc>) -> Result<(), NovaError> {
        if self.status != TrackStatus::Deleted {
            return Err(NovaError::TrackNotDeleted);
        }
        let scheduled = self.scheduled_deletion_at.ok_or_else(|| NovaError::internal("deleted track missing scheduledDeletionAt"))?;
        if now >= scheduled {
            return Err(NovaError::RestorationExpired);
        }
        self.status = self.status_before_delete.unwrap_or(TrackStatus::Ready);
        self.status_before_delete = None;
        self.deleted_at = None;
        self.scheduled_deletion_at = None;
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Title,
    Duration,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::Title => "title",
            SortField::Duration => "duration_seconds",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_track() -> Track {
        Track {
            id: "t1".into(),
            user_id: "u1".into(),
            title: "Song".into(),
            artist: None,
            duration_seconds: Some(180.0),
            object_key: "audio/u1/t1/x".into(),
            file_size_bytes: 5_000_000,
            mime_type: "audio/mpeg".into(),
            checksum_sha256: "deadbeef".into(),
            metadata: None,
            waveform_object_key: None,
            failure_reason_code: None,
            status: TrackStatus::Ready,
            moderation_status: ModerationStatus::None,
            status_before_delete: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            processed_at: Some(Utc::now()),
            deleted_at: None,
            scheduled_deletion_at: None,
        }
    }

    #[test]
    fn soft_delete_sets_grace_window() {
        let mut track = sample_track();
        let now = Utc::now();
        track.soft_delete(now, Duration::days(30)).unwrap();
        assert_eq!(track.status, TrackStatus::Deleted);
        assert_eq!(track.scheduled_deletion_at, Some(now + Duration::days(30)));
    }

    #[test]
    fn restore_before_scheduled_deletion_succeeds() {
        let mut track = sample_track();
        let now = Utc::now();
        track.soft_delete(now, Duration::days(30)).unwrap();
        track.restore(now + Duration::seconds(10)).unwrap();
        assert_eq!(track.status, TrackStatus::Ready);
        assert!(track.deleted_at.is_none());
    }

    #[test]
    fn restore_at_scheduled_deletion_fails() {
        let mut track = sample_track();
        let now = Utc::now();
        track.soft_delete(now, Duration::days(30)).unwrap();
        let scheduled = track.scheduled_deletion_at.unwrap();
        assert!(matches!(track.restore(scheduled), Err(NovaError::RestorationExpired)));
    }

    #[test]
    fn double_delete_is_rejected() {
        let mut track = sample_track();
        let now = Utc::now();
        track.soft_delete(now, Duration::days(30)).unwrap();
        assert!(matches!(track.soft_delete(now, Duration::days(30)), Err(NovaError::TrackAlreadyDeleted)));
    }
}

