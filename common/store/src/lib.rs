use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sqlx::PgPool;

pub use sqlx::QueryBuilder;

/// Errors surfaced by the document store adapter. The API/worker layer maps
/// these onto `NovaError` at the boundary (fail-closed).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document not found")]
    NotFound,
    #[error("optimistic concurrency conflict")]
    VersionConflict,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A document loaded from the store, carrying the optimistic-concurrency
/// version alongside the deserialized payload.
#[derive(Debug, Clone)]
pub struct StoredDocument<T> {
    pub id: String,
    pub data: T,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Thin typed layer over Postgres standing in for a generic document store:
/// documents are JSONB blobs keyed by ULID, with an
/// `_version` column for optimistic concurrency. Each document kind gets its
/// own table (`users`, `tracks`, `playlists`, ...) so full-text generated
/// columns and plain indexes can be declared per kind; this struct holds the
/// cross-cutting CRUD primitives every repository builds on.
#[derive(Clone)]
pub struct DocumentStore {
    pool: PgPool,
}

impl DocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Inserts a brand-new document at version 1. Callers pick the table
    /// name from their own fixed set of document kinds, never from user
    /// input.
    pub async fn insert<T: Serialize>(&self, table: &str, id: &str, data: &T) -> Result<(), StoreError> {
        let payload = serde_json::to_value(data)?;
        let sql = format!(
            "INSERT INTO {table} (id, data, _version, created_at, updated_at) VALUES ($1, $2, 1, now(), now())"
        );
        sqlx::query(&sql).bind(id).bind(payload).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn load<T: DeserializeOwned>(&self, table: &str, id: &str) -> Result<StoredDocument<T>, StoreError> {
        let sql = format!("SELECT id, data, _version, created_at, updated_at FROM {table} WHERE id = $1");
        let row: Option<(String, serde_json::Value, i64, DateTime<Utc>, DateTime<Utc>)> =
        sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        let (id, data, version, created_at, updated_at) = row.ok_or(StoreError::NotFound)?;
        Ok(StoredDocument { id, data: serde_json::from_value(data)?, version, created_at, updated_at })
    }

    /// Saves `data` back over `id`, requiring the row to still be at
    /// `expected_version`. Returns the new version on success.
    pub async fn save_optimistic<T: Serialize>(
        &self,
        table: &str,
        id: &str,
        data: &T,
        expected_version: i64,
    ) -> Result<i64, StoreError> {
        let payload = serde_json::to_value(data)?;
        let sql = format!(
            "UPDATE {table} SET data = $1, _version = _version + 1, updated_at = now() \
            WHERE id = $2 AND _version = $3 RETURNING _version"
        );
        let row: Option<(i64,)> = sqlx::query_as(&sql)
        .bind(payload)
        .bind(id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(v,)| v).ok_or(StoreError::VersionConflict)
    }

    pub async fn delete(&self, table: &str, id: &str) -> Result<(), StoreError> {
        let sql = format!("DELETE FROM {table} WHERE id = $1");
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

/// Opaque pagination cursor: `{sortValue, id, timestamp}` base64url-encoded,
/// with the timestamp used to reject stale cursors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cursor {
    pub sort_value: String,
    pub id: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    #[error("cursor is not valid base64/json")]
    Malformed,
    #[error("cursor has expired")]
    Expired,
}

impl Cursor {
    pub fn new(sort_value: impl Into<String>, id: impl Into<String>) -> Self {
        Self { sort_value: sort_value.into(), id: id.into(), issued_at: Utc::now() }
    }

    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("cursor serializes");
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(raw: &str, max_age: Duration) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD.decode(raw).map_err(|_| CursorError::Malformed)?;
        let cursor: Cursor = serde_json::from_slice(&bytes).map_err(|_| CursorError::Malformed)?;
        if Utc::now() - cursor.issued_at > max_age {
            return Err(CursorError::Expired);
        }
        Ok(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trips_when_fresh() {
        let cursor = Cursor::new("2026-01-01T00:00:00Z", "01ARZ3NDEKTSV4RRFFQ69G5FAV");
        let encoded = cursor.encode();
        let decoded = Cursor::decode(&encoded, Duration::hours(1)).unwrap();
        assert_eq!(decoded.sort_value, cursor.sort_value);
        assert_eq!(decoded.id, cursor.id);
    }

    #[test]
    fn cursor_rejects_expired() {
        let mut cursor = Cursor::new("x", "01ARZ3NDEKTSV4RRFFQ69G5FAV");
        cursor.issued_at = Utc::now() - Duration::hours(2);
        let encoded = cursor.encode();
        assert!(matches!(Cursor::decode(&encoded, Duration::hours(1)), Err(CursorError::Expired)));
    }

    #[test]
    fn cursor_rejects_malformed_input() {
        assert!(matches!(Cursor::decode("not-base64!!", Duration::hours(1)), Err(CursorError::Malformed)));
    }
}

