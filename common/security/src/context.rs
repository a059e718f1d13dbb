use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use common_auth::{AuthContext, JwtVerifier};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::roles::Role;
use crate::SecurityError;

/// Per-request authorization context, derived from a verified JWT rather
/// than trusted headers: the user id and roles come straight out of
/// `common_auth::Claims`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityContext {
    pub user_id: String,
    pub roles: Vec<Role>,
    pub trace_id: Uuid,
}

impl SecurityContext {
    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }

    pub fn owns(&self, resource_owner_id: &str) -> bool {
        self.user_id == resource_owner_id
    }
}

pub struct SecurityCtxExtractor(pub SecurityContext);

#[async_trait]
impl<S> FromRequestParts<S> for SecurityCtxExtractor
where
Arc<JwtVerifier>: FromRef<S>,
S: Send + Sync,
{
    type Rejection = SecurityError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await.map_err(|_| SecurityError::InvalidToken)?;
        let roles = auth.claims.roles.iter().filter_map(|r| r.parse::<Role>().ok()).collect();
        Ok(SecurityCtxExtractor(SecurityContext { user_id: auth.claims.subject, roles, trace_id: Uuid::new_v4() }))
    }
}

