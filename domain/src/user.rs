use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    Active,
    Disabled,
    PendingDeletion,
}

/// `User`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub roles: Vec<String>,
    pub status: UserStatus,
    pub used_storage_bytes: i64,
    pub track_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Case-insensitive normalization used for uniqueness checks and lookup.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

impl User {
    pub fn is_active(&self) -> bool {
        matches!(self.status, UserStatus::Active)
    }

    /// `used + size <= quota`, exactly-at-limit allowed (,
    /// "Boundary behaviors").
    pub fn fits_within_quota(&self, quota_bytes: i64, requested_bytes: i64) -> bool {
        self.used_storage_bytes + requested_bytes <= quota_bytes
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_check_is_inclusive_at_boundary() {
        let user = User {
            id: "u1".into(),
            email: "a@example.com".into(),
            display_name: "A".into(),
            password_hash: "x".into(),
            roles: vec!["Listener".into()],
            status: UserStatus::Active,
            used_storage_bytes: 99_999_998,
            track_count: 0,
            created_at: Utc::now(),
            last_login_at: None,
        };
        assert!(user.fits_within_quota(100_000_000, 2));
        assert!(!user.fits_within_quota(100_000_000, 3));
    }

    #[test]
    fn email_normalization_lowercases_and_trims() {
        assert_eq!(normalize_email(" User@Example.COM \n"), "user@example.com");
    }
}

