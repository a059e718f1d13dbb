use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

pub const MIME_ALLOWLIST: &[&str] =
&["audio/mpeg", "audio/mp4", "audio/flac", "audio/wav", "audio/x-wav", "audio/ogg"];

pub fn is_allowed_mime(mime_type: &str) -> bool {
    let lower = mime_type.to_lowercase();
    MIME_ALLOWLIST.iter().any(|m| *m == lower)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadSessionStatus {
    Pending,
    Completed,
    Expired,
    Failed,
}

/// `UploadSession`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub id: String,
    pub user_id: String,
    pub track_id: String,
    pub object_key: String,
    pub expected_mime_type: String,
    pub max_allowed_size_bytes: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: UploadSessionStatus,
    pub title: Option<String>,
    pub artist: Option<String>,
}

/// `audio/{userId}/{trackId}/{22-char base64url nonce}`.
pub fn build_object_key(user_id: &str, track_id: &str) -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    let nonce = base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes);
    format!("audio/{user_id}/{track_id}/{nonce}")
}

impl UploadSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == UploadSessionStatus::Pending && self.expires_at < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_allowlist_is_case_insensitive() {
        assert!(is_allowed_mime("AUDIO/MPEG"));
        assert!(!is_allowed_mime("video/mp4"));
    }

    #[test]
    fn object_key_has_expected_shape() {
        let key = build_object_key("user-1", "track-1");
        assert!(key.starts_with("audio/user-1/track-1/"));
        let nonce = key.rsplit('/').next().unwrap();
        assert_eq!(nonce.len(), 22);
    }
}

