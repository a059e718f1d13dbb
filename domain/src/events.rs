use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::PlaybackEventType;

/// Outbox payload published once an upload completes and its object has
/// landed in storage ( "single canonical upload-completed
/// schema, identified by checksum + ULID").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioUploaded {
    pub track_id: String,
    pub user_id: String,
    pub object_key: String,
    pub mime_type: String,
    pub file_size_bytes: i64,
    pub checksum_sha256: String,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Outbox payload published once a track's grace period has elapsed and its
/// storage objects are being reclaimed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDeleted {
    pub track_id: String,
    pub user_id: String,
    pub object_key: String,
    pub waveform_object_key: Option<String>,
    pub file_size_bytes: i64,
    pub deleted_at: DateTime<Utc>,
    pub scheduled_deletion_at: DateTime<Utc>,
    pub correlation_id: String,
}

/// Raw client-reported playback telemetry, ingested by the API and handed
/// to the telemetry worker for aggregation. `device_id` is
/// always a hash, never a raw device identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackEvent {
    pub event_type: PlaybackEventType,
    pub track_id: String,
    pub user_id: String,
    pub client_timestamp: DateTime<Utc>,
    pub server_timestamp: DateTime<Utc>,
    pub position_seconds: Option<f64>,
    pub duration_played_seconds: Option<f64>,
    pub session_id: Option<String>,
    pub device_id_hash: Option<String>,
    pub client_version: Option<String>,
    pub correlation_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_uploaded_round_trips_through_json() {
        let event = AudioUploaded {
            track_id: "t1".into(),
            user_id: "u1".into(),
            object_key: "audio/u1/t1/abc".into(),
            mime_type: "audio/mpeg".into(),
            file_size_bytes: 1024,
            checksum_sha256: "deadbeef".into(),
            correlation_id: "corr-1".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"trackId\""));
        let back: AudioUploaded = serde_json::from_str(&json).unwrap();
        assert_eq!(back.track_id, event.track_id);
    }
}

