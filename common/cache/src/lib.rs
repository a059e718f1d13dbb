use std::time::Duration;

use common_crypto::{EncryptedRecord, KeyRing};
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

const CALL_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis connection error: {0}")]
    Connection(#[from] redis::RedisError),
    #[error("crypto error: {0}")]
    Crypto(#[from] common_crypto::CryptoError),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("call timed out")]
    Timeout,
}

/// The record shape persisted for every cached value:
/// ciphertext + nonce + the key version it was encrypted under, so rotation
/// windows can keep decrypting values written under a retiring key.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct WireRecord {
    ciphertext: String,
    nonce: String,
    key_version: u32,
}

/// Encrypted, TTL'd cache adapter over Redis. Treated as optional
/// everywhere: every method fails open — reads return `None`, writes log
/// and swallow the error — so callers always have a path to fresh results.
#[derive(Clone)]
pub struct CacheAdapter {
    client: redis::Client,
    key_ring: KeyRing,
}

impl CacheAdapter {
    pub fn new(redis_url: &str, key_ring: KeyRing) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client, key_ring })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        Ok(tokio::time::timeout(CALL_TIMEOUT, self.client.get_multiplexed_async_connection())
            .await
            .map_err(|_| CacheError::Timeout)??)
    }

    /// Fetches and decrypts `key`. Any failure (connection, missing key,
    /// decrypt error, stale key version) is treated as a cache miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(cache_key = key, error = %err, "cache get failed, treating as miss");
                None
            }
        }
    }

    async fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> =
        tokio::time::timeout(CALL_TIMEOUT, conn.get(key)).await.map_err(|_| CacheError::Timeout)??;
        let Some(raw) = raw else { return Ok(None) };
        let wire: WireRecord = serde_json::from_str(&raw)?;
        let record = EncryptedRecord::from_wire(&wire.ciphertext, &wire.nonce, wire.key_version)?;
        let plaintext = self.key_ring.decrypt(&record)?;
        Ok(Some(serde_json::from_slice(&plaintext)?))
    }

    /// Encrypts and stores `value` under `key` with the given TTL. Failures
    /// are logged, never propagated.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if let Err(err) = self.try_set(key, value, ttl).await {
            tracing::warn!(cache_key = key, error = %err, "cache set failed, continuing without cache");
        }
    }

    async fn try_set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError> {
        let plaintext = serde_json::to_vec(value)?;
        let record = self.key_ring.encrypt(&plaintext)?;
        let (ciphertext, nonce, key_version) = record.to_wire();
        let wire = WireRecord { ciphertext, nonce, key_version };
        let raw = serde_json::to_string(&wire)?;
        let mut conn = self.connection().await?;
        let ttl_secs = ttl.as_secs().max(1);
        tokio::time::timeout(CALL_TIMEOUT, conn.set_ex::<_, _, ()>(key, raw, ttl_secs))
        .await
        .map_err(|_| CacheError::Timeout)??;
        Ok(())
    }

    /// Removes a single key, e.g. on track soft-delete.
    pub async fn remove(&self, key: &str) {
        if let Err(err) = self.try_remove(key).await {
            tracing::warn!(cache_key = key, error = %err, "cache remove failed");
        }
    }

    async fn try_remove(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        tokio::time::timeout(CALL_TIMEOUT, conn.del::<_, ()>(key)).await.map_err(|_| CacheError::Timeout)??;
        Ok(())
    }

    /// Removes every key matching `prefix*`, e.g. `stream:{userId}:*` on
    /// logout-all. Uses `SCAN` to avoid blocking Redis the
    /// way `KEYS` would.
    pub async fn remove_by_pattern(&self, pattern: &str) {
        if let Err(err) = self.try_remove_by_pattern(pattern).await {
            tracing::warn!(cache_pattern = pattern, error = %err, "cache pattern remove failed");
        }
    }

    async fn try_remove_by_pattern(&self, pattern: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let keys: Vec<String> = tokio::time::timeout(CALL_TIMEOUT, async {
            let mut found = Vec::new();
            let mut iter: redis::AsyncIter<String> = conn.scan_match(pattern).await?;
            while let Some(key) = iter.next_item().await {
                found.push(key);
            }
            Ok::<_, redis::RedisError>(found)
        })
        .await
        .map_err(|_| CacheError::Timeout)??;
        if keys.is_empty() {
            return Ok(());
        }
        tokio::time::timeout(CALL_TIMEOUT, conn.del::<_, ()>(keys)).await.map_err(|_| CacheError::Timeout)??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_record_round_trips_through_json() {
        let k1 = KeyRing::generate_key_b64();
        let ring = KeyRing::new(vec![(1, &k1)], 1).unwrap();
        let record = ring.encrypt(b"\"hello\"").unwrap();
        let (ciphertext, nonce, key_version) = record.to_wire();
        let wire = WireRecord { ciphertext, nonce, key_version };
        let raw = serde_json::to_string(&wire).unwrap();
        let restored: WireRecord = serde_json::from_str(&raw).unwrap();
        let record = EncryptedRecord::from_wire(&restored.ciphertext, &restored.nonce, restored.key_version).unwrap();
        let plaintext = ring.decrypt(&record).unwrap();
        assert_eq!(plaintext, b"\"hello\"");
    }
}

