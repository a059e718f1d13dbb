pub mod analytics;
pub mod events;
pub mod playlist;
pub mod refresh_token;
pub mod track;
pub mod upload;
pub mod user;

pub use analytics::{PlaybackEventType, TrackDailyAggregate, TrackHourlyAggregate, UserActivityAggregate};
pub use events::{AudioUploaded, PlaybackEvent, TrackDeleted};
pub use playlist::{Move, Playlist, PlaylistEntry, Visibility};
pub use refresh_token::{tokens_to_evict, RefreshToken};
pub use track::{ModerationStatus, SortField, Track, TrackMetadata, TrackStatus};
pub use upload::{build_object_key, is_allowed_mime, UploadSession, UploadSessionStatus, MIME_ALLOWLIST};
pub use user::{normalize_email, User, UserStatus};

