/// Runtime configuration for JWT issuance and verification (,
/// "Configuration": JWT `{issuer, accessTtl, refreshTtl, signingKey}`).
#[derive(Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub signing_key: Vec<u8>,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub leeway_seconds: u32,
}

impl JwtConfig {
    /// `signing_key` must be at least 32 bytes, per 's
    /// `signingKey(≥32 bytes)` requirement.
    pub fn new(issuer: impl Into<String>, signing_key: Vec<u8>) -> Self {
        assert!(signing_key.len() >= 32, "JWT signing key must be at least 32 bytes");
        Self {
            issuer: issuer.into(),
            signing_key,
            access_ttl_seconds: 15 * 60,
            refresh_ttl_seconds: 60 * 60,
            leeway_seconds: 30,
        }
    }

    pub fn with_access_ttl(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    pub fn with_refresh_ttl(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }
}

