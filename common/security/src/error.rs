use common_http_errors::NovaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("unauthorized - missing required role")]
    Forbidden,
    #[error("invalid authorization token")]
    InvalidToken,
}

impl From<SecurityError> for NovaError {
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::Forbidden => NovaError::AccessDenied { detail: err.to_string() },
            SecurityError::InvalidToken => NovaError::InvalidToken { detail: err.to_string() },
        }
    }
}

impl axum::response::IntoResponse for SecurityError {
    fn into_response(self) -> axum::response::Response {
        NovaError::from(self).into_response()
    }
}

