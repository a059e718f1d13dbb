use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use ulid::Ulid;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A single append-only audit entry. Every admin mutation appends one via
/// [`append`].
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub actor_user_id: String,
    pub actor_email: String,
    pub action_code: String,
    pub target_type: String,
    pub target_id: String,
    pub reason_code: String,
    pub reason_text: Option<String>,
    pub previous_state: Option<serde_json::Value>,
    pub new_state: Option<serde_json::Value>,
    pub occurred_at: DateTime<Utc>,
    pub correlation_id: String,
    pub client_ip: String,
    pub user_agent: String,
    pub previous_entry_hash: Option<String>,
    pub content_hash: String,
}

/// Fields supplied by the caller before the entry's position in the chain
/// (and therefore its hashes) is known.
pub struct NewAuditEntry {
    pub actor_user_id: String,
    pub actor_email: String,
    pub action_code: String,
    pub target_type: String,
    pub target_id: String,
    pub reason_code: String,
    pub reason_text: Option<String>,
    pub previous_state: Option<serde_json::Value>,
    pub new_state: Option<serde_json::Value>,
    pub correlation_id: String,
    pub client_ip: String,
    pub user_agent: String,
}

/// Canonical serializable view of an entry used for hashing: every field
/// except `content_hash`, in a fixed field order, so the same logical entry
/// always hashes the same way.
#[derive(Serialize)]
struct CanonicalEntry<'a> {
    id: &'a str,
    actor_user_id: &'a str,
    actor_email: &'a str,
    action_code: &'a str,
    target_type: &'a str,
    target_id: &'a str,
    reason_code: &'a str,
    reason_text: &'a Option<String>,
    previous_state: &'a Option<serde_json::Value>,
    new_state: &'a Option<serde_json::Value>,
    occurred_at: DateTime<Utc>,
    correlation_id: &'a str,
    client_ip: &'a str,
    user_agent: &'a str,
    previous_entry_hash: &'a Option<String>,
}

fn content_hash_of(entry: &AuditLogEntry) -> Result<String, AuditError> {
    let canonical = CanonicalEntry {
        id: &entry.id,
        actor_user_id: &entry.actor_user_id,
        actor_email: &entry.actor_email,
        action_code: &entry.action_code,
        target_type: &entry.target_type,
        target_id: &entry.target_id,
        reason_code: &entry.reason_code,
        reason_text: &entry.reason_text,
        previous_state: &entry.previous_state,
        new_state: &entry.new_state,
        occurred_at: entry.occurred_at,
        correlation_id: &entry.correlation_id,
        client_ip: &entry.client_ip,
        user_agent: &entry.user_agent,
        previous_entry_hash: &entry.previous_entry_hash,
    };
    let bytes = serde_json::to_vec(&canonical)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Appends `new_entry` to the chain: loads the most recent entry, links
/// `previousEntryHash`, computes this entry's `contentHash`, and persists it.
pub async fn append(pool: &PgPool, new_entry: NewAuditEntry) -> Result<AuditLogEntry, AuditError> {
    let previous: Option<(String,)> =
    sqlx::query_as("SELECT content_hash FROM audit_log_entries ORDER BY occurred_at DESC, id DESC LIMIT 1")
    .fetch_optional(pool)
    .await?;

    let mut entry = AuditLogEntry {
        id: Ulid::new().to_string(),
        actor_user_id: new_entry.actor_user_id,
        actor_email: new_entry.actor_email,
        action_code: new_entry.action_code,
        target_type: new_entry.target_type,
        target_id: new_entry.target_id,
        reason_code: new_entry.reason_code,
        reason_text: new_entry.reason_text,
        previous_state: new_entry.previous_state,
        new_state: new_entry.new_state,
        occurred_at: Utc::now(),
        correlation_id: new_entry.correlation_id,
        client_ip: new_entry.client_ip,
        user_agent: new_entry.user_agent,
        previous_entry_hash: previous.map(|(hash,)| hash),
        content_hash: String::new(),
    };
    entry.content_hash = content_hash_of(&entry)?;

    sqlx::query(
        "INSERT INTO audit_log_entries \
        (id, actor_user_id, actor_email, action_code, target_type, target_id, reason_code, reason_text, \
            previous_state, new_state, occurred_at, correlation_id, client_ip, user_agent, \
            previous_entry_hash, content_hash) \
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)",
    )
    .bind(&entry.id)
    .bind(&entry.actor_user_id)
    .bind(&entry.actor_email)
    .bind(&entry.action_code)
    .bind(&entry.target_type)
    .bind(&entry.target_id)
    .bind(&entry.reason_code)
    .bind(&entry.reason_text)
    .bind(&entry.previous_state)
    .bind(&entry.new_state)
    .bind(entry.occurred_at)
    .bind(&entry.correlation_id)
    .bind(&entry.client_ip)
    .bind(&entry.user_agent)
    .bind(&entry.previous_entry_hash)
    .bind(&entry.content_hash)
    .execute(pool)
    .await?;

    Ok(entry)
}

#[derive(Debug, Serialize)]
pub struct VerificationResult {
    pub is_valid: bool,
    pub entries_checked: usize,
    pub invalid_entries: usize,
    pub invalid_audit_ids: Vec<String>,
}

/// Walks entries in `occurred_at` order and recomputes hashes, naming any
/// entry whose stored hash no longer matches.
pub async fn verify(pool: &PgPool) -> Result<VerificationResult, AuditError> {
    let entries: Vec<AuditLogEntry> = sqlx::query_as(
        "SELECT id, actor_user_id, actor_email, action_code, target_type, target_id, reason_code, reason_text, \
        previous_state, new_state, occurred_at, correlation_id, client_ip, user_agent, \
        previous_entry_hash, content_hash \
        FROM audit_log_entries ORDER BY occurred_at ASC, id ASC",
    )
    .fetch_all(pool)
    .await?;

    let mut invalid_audit_ids = Vec::new();
    let mut expected_previous_hash: Option<String> = None;

    for entry in &entries {
        let recomputed = content_hash_of(entry)?;
        let chain_ok = entry.previous_entry_hash == expected_previous_hash;
        let content_ok = recomputed == entry.content_hash;
        if !chain_ok || !content_ok {
            invalid_audit_ids.push(entry.id.clone());
        }
        expected_previous_hash = Some(entry.content_hash.clone());
    }

    Ok(VerificationResult {
        is_valid: invalid_audit_ids.is_empty(),
        entries_checked: entries.len(),
        invalid_entries: invalid_audit_ids.len(),
        invalid_audit_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, previous_entry_hash: Option<String>) -> AuditLogEntry {
        let mut entry = AuditLogEntry {
            id: id.to_string(),
            actor_user_id: "user-1".into(),
            actor_email: "admin@example.com".into(),
            action_code: "TRACK_MODERATE".into(),
            target_type: "Track".into(),
            target_id: "track-1".into(),
            reason_code: "copyright".into(),
            reason_text: None,
            previous_state: None,
            new_state: None,
            occurred_at: Utc::now(),
            correlation_id: "corr-1".into(),
            client_ip: "203.0.113.10".into(),
            user_agent: "test-agent".into(),
            previous_entry_hash,
            content_hash: String::new(),
        };
        entry.content_hash = content_hash_of(&entry).unwrap();
        entry
    }

    #[test]
    fn content_hash_changes_when_reason_code_changes() {
        let entry = sample("01A", None);
        let mut tampered = entry.clone();
        tampered.reason_code = "other".into();
        assert_ne!(content_hash_of(&entry).unwrap(), content_hash_of(&tampered).unwrap());
    }

    #[test]
    fn chain_detects_tampering_in_middle_entry() {
        let e1 = sample("01A", None);
        let mut e2 = sample("01B", Some(e1.content_hash.clone()));
        let e3_prev = e2.content_hash.clone();
        let e3 = sample("01C", Some(e3_prev));

        // Tamper with e2's reason code without recomputing its content hash,
        // as a hostile store mutation would.
        e2.reason_code = "tampered".into();

        let entries = vec![e1, e2, e3];
        let mut invalid = Vec::new();
        let mut expected_prev = None;
        for entry in &entries {
            let recomputed = content_hash_of(entry).unwrap();
            let chain_ok = entry.previous_entry_hash == expected_prev;
            let content_ok = recomputed == entry.content_hash;
            if !chain_ok || !content_ok {
                invalid.push(entry.id.clone());
            }
            expected_prev = Some(entry.content_hash.clone());
        }
        assert_eq!(invalid, vec!["01B".to_string()]);
    }
}

