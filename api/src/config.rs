use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Loaded from environment variables: explicit `.context("X must be set")`
/// for required values, sane defaults for optional ones.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub jwt_issuer: String,
    pub jwt_signing_key: Vec<u8>,
    pub jwt_access_ttl_seconds: i64,
    pub jwt_refresh_ttl_seconds: i64,

    pub mime_allowlist: Vec<String>,
    pub max_file_size_bytes: i64,
    pub max_tracks_per_user: i64,
    pub quota_bytes_per_user: i64,
    pub upload_session_ttl_seconds: i64,
    pub max_refresh_tokens_per_user: usize,

    pub grace_duration_days: i64,
    pub max_page_size: u32,
    pub cursor_max_age_seconds: i64,

    pub presign_ttl_seconds: u64,
    pub stream_cache_ttl_buffer_seconds: i64,
    pub stream_refresh_buffer_seconds: i64,

    pub max_add_batch: usize,
    pub max_playlist_entries: usize,
    pub max_playlists_per_user: usize,

    pub login_ip_rate_limit: u32,
    pub login_account_rate_limit: u32,

    pub max_user_page_size: u32,
    pub max_track_page_size_admin: u32,
    pub max_audit_page_size: u32,
    pub analytics_overview_days: i64,
    pub reason_code_allowlist: Vec<String>,

    pub host: String,
    pub port: u16,
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        let jwt_signing_key = env_var("JWT_SIGNING_KEY")
        .context("JWT_SIGNING_KEY must be set (>=32 bytes)")?
        .into_bytes();
        if jwt_signing_key.len() < 32 {
            anyhow::bail!("JWT_SIGNING_KEY must be at least 32 bytes");
        }

        let mime_allowlist = env_var("UPLOAD_MIME_ALLOWLIST")
        .map(|v| v.split(',').map(|s| s.trim().to_lowercase()).collect())
        .unwrap_or_else(|| domain::MIME_ALLOWLIST.iter().map(|s| s.to_string()).collect());

        Ok(Self {
            jwt_issuer: env_var("JWT_ISSUER").unwrap_or_else(|| "novatune".to_string()),
            jwt_signing_key,
            jwt_access_ttl_seconds: env_parse("JWT_ACCESS_TTL_SECONDS", 900),
            jwt_refresh_ttl_seconds: env_parse("JWT_REFRESH_TTL_SECONDS", 3600),

            mime_allowlist,
            max_file_size_bytes: env_parse("UPLOAD_MAX_FILE_SIZE_BYTES", 200_000_000),
            max_tracks_per_user: env_parse("UPLOAD_MAX_TRACKS", 10_000),
            quota_bytes_per_user: env_parse("UPLOAD_QUOTA_BYTES", 100_000_000_000),
            upload_session_ttl_seconds: env_parse("UPLOAD_SESSION_TTL_SECONDS", 900),
            max_refresh_tokens_per_user: env_parse("AUTH_MAX_REFRESH_TOKENS_PER_USER", 10),

            grace_duration_days: env_parse("TRACK_GRACE_DURATION_DAYS", 30),
            max_page_size: env_parse("TRACK_MAX_PAGE_SIZE", 100),
            cursor_max_age_seconds: env_parse("TRACK_CURSOR_MAX_AGE_SECONDS", 3600),

            presign_ttl_seconds: env_parse("STREAM_PRESIGN_TTL_SECONDS", 90),
            stream_cache_ttl_buffer_seconds: env_parse("STREAM_CACHE_TTL_BUFFER_SECONDS", 30),
            stream_refresh_buffer_seconds: env_parse("STREAM_REFRESH_BUFFER_SECONDS", 30),

            max_add_batch: env_parse("PLAYLIST_MAX_ADD_BATCH", 100),
            max_playlist_entries: env_parse("PLAYLIST_MAX_ENTRIES", 5_000),
            max_playlists_per_user: env_parse("PLAYLIST_MAX_PER_USER", 200),

            login_ip_rate_limit: env_parse("LOGIN_IP_RATE_LIMIT_PER_MINUTE", 10),
            login_account_rate_limit: env_parse("LOGIN_ACCOUNT_RATE_LIMIT_PER_MINUTE", 5),

            max_user_page_size: env_parse("ADMIN_MAX_USER_PAGE_SIZE", 100),
            max_track_page_size_admin: env_parse("ADMIN_MAX_TRACK_PAGE_SIZE", 100),
            max_audit_page_size: env_parse("ADMIN_MAX_AUDIT_PAGE_SIZE", 200),
            analytics_overview_days: env_parse("ADMIN_ANALYTICS_OVERVIEW_DAYS", 7),
            reason_code_allowlist: env_var("ADMIN_REASON_CODE_ALLOWLIST")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|| {
                ["copyright", "abuse", "illegal_content", "terms_violation", "user_request", "other"]
                .iter()
                .map(|s| s.to_string())
                .collect()
            }),

            host: env_var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env_parse("PORT", 8080),
        })
    }

    pub fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_seconds)
    }
}

