use std::time::Duration;

use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;

const PRESIGN_CALL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("s3 error: {0}")]
    Sdk(String),
    #[error("presign error: {0}")]
    Presign(String),
    #[error("call timed out")]
    Timeout,
}

/// Object storage adapter over an S3-compatible endpoint: presign PUT/GET,
/// delete, and byte reads for checksumming.
#[derive(Clone)]
pub struct StorageAdapter {
    client: Client,
    bucket: String,
}

impl StorageAdapter {
    pub fn new(endpoint: &str, region: &str, access_key: &str, secret_key: &str, bucket: &str) -> Self {
        let config = aws_sdk_s3::Config::builder()
        .endpoint_url(endpoint)
        .region(Region::new(region.to_string()))
        .credentials_provider(Credentials::new(access_key, secret_key, None, None, "novatune-static"))
        .force_path_style(true)
        .build();
        Self { client: Client::from_conf(config), bucket: bucket.to_string() }
    }

    /// Presigns a PUT for `object_key`, valid for `ttl`.
    pub async fn presign_put(
        &self,
        object_key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(ttl).map_err(|e| StorageError::Presign(e.to_string()))?;
        let request = self
        .client
        .put_object()
        .bucket(&self.bucket)
        .key(object_key)
        .content_type(content_type)
        .presigned(presigning);
        let presigned = tokio::time::timeout(PRESIGN_CALL_TIMEOUT, request)
        .await
        .map_err(|_| StorageError::Timeout)?
        .map_err(|e| StorageError::Sdk(e.to_string()))?;
        Ok(presigned.uri().to_string())
    }

    /// Presigns a GET for `object_key`, valid for `ttl`.
    pub async fn presign_get(&self, object_key: &str, ttl: Duration) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(ttl).map_err(|e| StorageError::Presign(e.to_string()))?;
        let request = self.client.get_object().bucket(&self.bucket).key(object_key).presigned(presigning);
        let presigned = tokio::time::timeout(PRESIGN_CALL_TIMEOUT, request)
        .await
        .map_err(|_| StorageError::Timeout)?
        .map_err(|e| StorageError::Sdk(e.to_string()))?;
        Ok(presigned.uri().to_string())
    }

    pub async fn delete(&self, object_key: &str) -> Result<(), StorageError> {
        self.client
        .delete_object()
        .bucket(&self.bucket)
        .key(object_key)
        .send()
        .await
        .map_err(|e| StorageError::Sdk(e.to_string()))?;
        Ok(())
    }

    /// Reads the full object body, for size/MIME validation and checksum
    /// computation by the upload ingestor worker.
    pub async fn read_bytes(&self, object_key: &str) -> Result<Vec<u8>, StorageError> {
        let output = self
        .client
        .get_object()
        .bucket(&self.bucket)
        .key(object_key)
        .send()
        .await
        .map_err(|e| StorageError::Sdk(e.to_string()))?;
        let body = output.body.collect().await.map_err(|e| StorageError::Sdk(e.to_string()))?;
        Ok(body.into_bytes().to_vec())
    }

    /// Uploads raw bytes — used by the audio processor worker to persist the
    /// generated waveform peaks JSON.
    pub async fn put_bytes(&self, object_key: &str, content_type: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.client
        .put_object()
        .bucket(&self.bucket)
        .key(object_key)
        .content_type(content_type)
        .body(ByteStream::from(bytes))
        .send()
        .await
        .map_err(|e| StorageError::Sdk(e.to_string()))?;
        Ok(())
    }

    /// Content-type and size the upload ingestor worker checks the actual
    /// object against the session's expected values before trusting it.
    pub async fn head(&self, object_key: &str) -> Result<ObjectMeta, StorageError> {
        let output = self
        .client
        .head_object()
        .bucket(&self.bucket)
        .key(object_key)
        .send()
        .await
        .map_err(|e| StorageError::Sdk(e.to_string()))?;
        Ok(ObjectMeta {
            content_type: output.content_type().unwrap_or("application/octet-stream").to_string(),
            content_length: output.content_length().unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub content_type: String,
    pub content_length: i64,
}

/// SHA-256 hex digest of object bytes, used for integrity/dedup.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}

