use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

const PROBLEM_BASE: &str = "https://novatune.dev/problems";

/// A single RFC 7807 `application/problem+json` body.
#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub type_: String,
    pub title: &'static str,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub trace_id: Uuid,
    #[serde(flatten)]
    pub extensions: Value,
}

/// The full NovaTune domain error taxonomy. Every core
/// operation returns `Result<T, NovaError>`; translation into
/// `problem+json` happens centrally in `IntoResponse`, never scattered
/// across handlers.
#[derive(Debug)]
pub enum NovaError {
    Validation { detail: String },
    InvalidCredentials,
    InvalidToken { detail: String },
    AccountDisabled,
    SessionLimitExceeded,
    AccessDenied { detail: String },
    NotFound { kind: &'static str, id: Option<String> },
    TrackDeleted,
    TrackAlreadyDeleted,
    TrackNotDeleted,
    PlaylistConcurrency,
    TrackConcurrency,
    QuotaExceeded { used_bytes: i64, quota_bytes: i64, requested_bytes: i64 },
    RestorationExpired,
    CursorExpired,
    InvalidPosition,
    RateLimitExceeded { retry_after_secs: u64 },
    ServiceUnavailable { detail: String },
    Internal { detail: String },
}

impl NovaError {
    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal { detail: e.to_string() }
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::Validation { detail: detail.into() }
    }

    pub fn not_found(kind: &'static str) -> Self {
        Self::NotFound { kind, id: None }
    }

    pub fn not_found_id(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: Some(id.into()) }
    }

    fn status(&self) -> StatusCode {
        match self {
            NovaError::Validation { .. }
            | NovaError::CursorExpired
            | NovaError::InvalidPosition => StatusCode::BAD_REQUEST,
            NovaError::InvalidCredentials
            | NovaError::InvalidToken { .. }
            | NovaError::AccountDisabled
            | NovaError::SessionLimitExceeded => StatusCode::UNAUTHORIZED,
            NovaError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            NovaError::NotFound { .. } => StatusCode::NOT_FOUND,
            NovaError::TrackDeleted
            | NovaError::TrackAlreadyDeleted
            | NovaError::TrackNotDeleted
            | NovaError::PlaylistConcurrency
            | NovaError::TrackConcurrency
            | NovaError::QuotaExceeded { .. } => StatusCode::CONFLICT,
            NovaError::RestorationExpired => StatusCode::GONE,
            NovaError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            NovaError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            NovaError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn slug(&self) -> &'static str {
        match self {
            NovaError::Validation { .. } => "validation-error",
            NovaError::InvalidCredentials => "invalid-credentials",
            NovaError::InvalidToken { .. } => "invalid-token",
            NovaError::AccountDisabled => "account-disabled",
            NovaError::SessionLimitExceeded => "session-limit-exceeded",
            NovaError::AccessDenied { .. } => "access-denied",
            NovaError::NotFound { .. } => "not-found",
            NovaError::TrackDeleted => "track-deleted",
            NovaError::TrackAlreadyDeleted => "track-already-deleted",
            NovaError::TrackNotDeleted => "track-not-deleted",
            NovaError::PlaylistConcurrency => "playlist-concurrency",
            NovaError::TrackConcurrency => "track-concurrency",
            NovaError::QuotaExceeded { .. } => "quota-exceeded",
            NovaError::RestorationExpired => "restoration-expired",
            NovaError::CursorExpired => "cursor-expired",
            NovaError::InvalidPosition => "invalid-position",
            NovaError::RateLimitExceeded { .. } => "rate-limit-exceeded",
            NovaError::ServiceUnavailable { .. } => "service-unavailable",
            NovaError::Internal { .. } => "internal-error",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            NovaError::Validation { .. } => "Validation failed",
            NovaError::InvalidCredentials => "Invalid credentials",
            NovaError::InvalidToken { .. } => "Invalid token",
            NovaError::AccountDisabled => "Account disabled",
            NovaError::SessionLimitExceeded => "Session limit exceeded",
            NovaError::AccessDenied { .. } => "Access denied",
            NovaError::NotFound { .. } => "Not found",
            NovaError::TrackDeleted => "Track is deleted",
            NovaError::TrackAlreadyDeleted => "Track already deleted",
            NovaError::TrackNotDeleted => "Track is not deleted",
            NovaError::PlaylistConcurrency => "Playlist was modified concurrently",
            NovaError::TrackConcurrency => "Track was modified concurrently",
            NovaError::QuotaExceeded { .. } => "Storage quota exceeded",
            NovaError::RestorationExpired => "Restoration window has expired",
            NovaError::CursorExpired => "Pagination cursor expired",
            NovaError::InvalidPosition => "Invalid playlist position",
            NovaError::RateLimitExceeded { .. } => "Rate limit exceeded",
            NovaError::ServiceUnavailable { .. } => "Service unavailable",
            NovaError::Internal { .. } => "Internal error",
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            NovaError::Validation { detail } => Some(detail.clone()),
            NovaError::InvalidToken { detail } => Some(detail.clone()),
            NovaError::AccessDenied { detail } => Some(detail.clone()),
            NovaError::ServiceUnavailable { detail } => Some(detail.clone()),
            NovaError::Internal { detail } => Some(detail.clone()),
            NovaError::NotFound { kind, id } => Some(match id {
                Some(id) => format!("{kind} '{id}' was not found"),
                None => format!("{kind} was not found"),
            }),
            _ => None,
        }
    }

    fn extensions(&self) -> Value {
        match self {
            NovaError::QuotaExceeded { used_bytes, quota_bytes, requested_bytes } => json!({
                "usedBytes": used_bytes,
                "quotaBytes": quota_bytes,
                "requestedBytes": requested_bytes,
            }),
            NovaError::RateLimitExceeded { retry_after_secs } => json!({
                "retryAfterSeconds": retry_after_secs,
            }),
            _ => Value::Object(Map::new()),
        }
    }
}

impl std::fmt::Display for NovaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.title(), self.detail().unwrap_or_default())
    }
}

impl std::error::Error for NovaError {}

impl IntoResponse for NovaError {
    fn into_response(self) -> Response {
        let trace_id = Uuid::new_v4();
        let status = self.status();
        let body = ProblemDetails {
            type_: format!("{PROBLEM_BASE}/{}", self.slug()),
            title: self.title(),
            status: status.as_u16(),
            detail: self.detail(),
            instance: None,
            trace_id,
            extensions: self.extensions(),
        };

        let mut resp = (status, Json(body)).into_response();
        resp.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        if let NovaError::RateLimitExceeded { retry_after_secs } = &self {
            if let Ok(val) = axum::http::HeaderValue::from_str(&retry_after_secs.to_string()) {
                resp.headers_mut().insert(axum::http::header::RETRY_AFTER, val);
            }
        }
        resp
    }
}

pub type NovaResult<T> = Result<T, NovaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_exceeded_carries_extensions() {
        let err = NovaError::QuotaExceeded { used_bytes: 99_999_999, quota_bytes: 100_000_000, requested_bytes: 2 };
        assert_eq!(err.slug(), "quota-exceeded");
        let ext = err.extensions();
        assert_eq!(ext["usedBytes"], 99_999_999);
        assert_eq!(ext["requestedBytes"], 2);
    }

    #[test]
    fn not_found_detail_includes_id() {
        let err = NovaError::NotFound { kind: "Track", id: Some("01ABC".into()) };
        assert_eq!(err.detail().unwrap(), "Track '01ABC' was not found");
    }
}

