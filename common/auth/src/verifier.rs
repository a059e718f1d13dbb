use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::Value;
use tracing::debug;

use crate::claims::Claims;
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};

/// Issues and verifies access tokens signed with a single symmetric key
/// (HS256). The key is read-only after startup and process-wide.
#[derive(Clone)]
pub struct JwtVerifier {
    config: JwtConfig,
}

impl JwtVerifier {
    pub fn new(config: JwtConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// Issues a signed access token for `subject` carrying `roles`.
    pub fn issue(&self, subject: &str, roles: &[String]) -> AuthResult<String> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.config.access_ttl_seconds);
        let claims = serde_json::json!({
            "sub": subject,
            "roles": roles,
            "iat": now.timestamp(),
            "exp": expires_at.timestamp(),
            "iss": self.config.issuer,
        });
        let key = EncodingKey::from_secret(&self.config.signing_key);
        encode(&Header::new(Algorithm::HS256), &claims, &key).map_err(AuthError::from)
    }

    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        let key = DecodingKey::from_secret(&self.config.signing_key);
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.issuer.clone()]);
        validation.validate_aud = false;
        validation.leeway = self.config.leeway_seconds.into();

        let token_data = decode::<Value>(token, &key, &validation)?;
        let claims = Claims::try_from(token_data.claims)?;
        debug!(subject = %claims.subject, "verified JWT successfully");
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> JwtVerifier {
        JwtVerifier::new(JwtConfig::new("novatune", vec![7u8; 32]))
    }

    #[test]
    fn issued_token_verifies_with_same_key() {
        let verifier = verifier();
        let token = verifier.issue("01ARZ3NDEKTSV4RRFFQ69G5FAV", &["Listener".to_string()]).unwrap();
        let claims = verifier.verify(&token).unwrap();
        assert_eq!(claims.subject, "01ARZ3NDEKTSV4RRFFQ69G5FAV");
        assert!(claims.has_role("Listener"));
    }

    #[test]
    fn token_signed_with_different_key_is_rejected() {
        let verifier = verifier();
        let token = verifier.issue("01ARZ3NDEKTSV4RRFFQ69G5FAV", &[]).unwrap();
        let other = JwtVerifier::new(JwtConfig::new("novatune", vec![9u8; 32]));
        assert!(other.verify(&token).is_err());
    }
}

