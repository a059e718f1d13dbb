use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `RefreshToken`. Only the hash is ever persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshToken {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub device_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl RefreshToken {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }
}

/// Given a user's currently-active tokens (oldest first) and the configured
/// per-user limit, returns the ids that must be revoked to make room for one
/// more (FIFO eviction invariant).
pub fn tokens_to_evict(active_oldest_first: &[RefreshToken], limit: usize) -> Vec<String> {
    if active_oldest_first.len() < limit {
        return Vec::new();
    }
    let overflow = active_oldest_first.len() + 1 - limit;
    active_oldest_first.iter().take(overflow).map(|t| t.id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(id: &str) -> RefreshToken {
        RefreshToken {
            id: id.into(),
            user_id: "u1".into(),
            token_hash: "hash".into(),
            device_id: None,
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            revoked: false,
        }
    }

    #[test]
    fn evicts_oldest_when_at_limit() {
        let tokens = vec![token("t1"), token("t2"), token("t3")];
        let evicted = tokens_to_evict(&tokens, 3);
        assert_eq!(evicted, vec!["t1".to_string()]);
    }

    #[test]
    fn no_eviction_when_under_limit() {
        let tokens = vec![token("t1")];
        assert!(tokens_to_evict(&tokens, 5).is_empty());
    }
}

