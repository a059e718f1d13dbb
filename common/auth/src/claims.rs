use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// Application-facing representation of verified JWT claims. `subject` is
/// the user's public ULID (identifiers are 26-character ULIDs, not
/// UUIDs), and `roles` is the subset of `{Listener, Admin}` granted to them.
#[derive(Debug, Clone, Serialize)]
pub struct Claims {
    pub subject: String,
    pub roles: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    pub issuer: String,
    pub raw: serde_json::Value,
}

impl Claims {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|value| value == role)
    }
}

#[derive(Debug, Deserialize)]
struct ClaimsRepr {
    sub: String,
    #[serde(default)]
    roles: Vec<String>,
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
    iss: String,
}

impl TryFrom<ClaimsRepr> for Claims {
    type Error = AuthError;

    fn try_from(value: ClaimsRepr) -> AuthResult<Self> {
        let expires_at = Utc
        .timestamp_opt(value.exp, 0)
        .single()
        .ok_or_else(|| AuthError::InvalidClaim("exp", value.exp.to_string()))?;

        let issued_at = match value.iat {
            Some(iat) => {
                Some(Utc.timestamp_opt(iat, 0).single().ok_or_else(|| AuthError::InvalidClaim("iat", iat.to_string()))?)
            }
            None => None,
        };

        Ok(Self { subject: value.sub, roles: value.roles, expires_at, issued_at, issuer: value.iss, raw: serde_json::Value::Null })
    }
}

impl TryFrom<serde_json::Value> for Claims {
    type Error = AuthError;

    fn try_from(value: serde_json::Value) -> AuthResult<Self> {
        let repr: ClaimsRepr = serde_json::from_value(value.clone()).map_err(|err| AuthError::InvalidJson(err.to_string()))?;
        let mut claims = Claims::try_from(repr)?;
        claims.raw = value;
        Ok(claims)
    }
}

