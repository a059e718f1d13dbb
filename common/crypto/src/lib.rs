use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use thiserror::Error;
use zeroize::Zeroizing;

const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;

/// Errors produced by the common-crypto helpers.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
    #[error("ciphertext missing nonce")]
    MissingNonce,
    #[error("encryption failure")]
    EncryptFailure,
    #[error("decryption failure")]
    DecryptFailure,
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
    #[error("unknown key version {0}")]
    UnknownKeyVersion(u32),
}

fn encrypt_with_key(key: &[u8; KEY_LENGTH], plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_LENGTH]), CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: KEY_LENGTH,
        actual: key.len(),
    })?;
    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
    .encrypt(nonce, plaintext)
    .map_err(|_| CryptoError::EncryptFailure)?;
    Ok((ciphertext, nonce_bytes))
}

fn decrypt_with_key(key: &[u8; KEY_LENGTH], ciphertext: &[u8], nonce_bytes: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if nonce_bytes.len() != NONCE_LENGTH {
        return Err(CryptoError::MissingNonce);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: KEY_LENGTH,
        actual: key.len(),
    })?;
    cipher
    .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
    .map_err(|_| CryptoError::DecryptFailure)
}

/// The record persisted by `common-cache` for every encrypted value: the
/// ciphertext, its nonce, and which key version produced it.
#[derive(Debug, Clone)]
pub struct EncryptedRecord {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LENGTH],
    pub key_version: u32,
}

impl EncryptedRecord {
    pub fn to_wire(&self) -> (String, String, u32) {
        (
            BASE64_STANDARD.encode(&self.ciphertext),
            BASE64_STANDARD.encode(self.nonce),
            self.key_version,
        )
    }

    pub fn from_wire(ciphertext_b64: &str, nonce_b64: &str, key_version: u32) -> Result<Self, CryptoError> {
        let ciphertext = BASE64_STANDARD.decode(ciphertext_b64)?;
        let nonce_bytes = BASE64_STANDARD.decode(nonce_b64)?;
        if nonce_bytes.len() != NONCE_LENGTH {
            return Err(CryptoError::MissingNonce);
        }
        let mut nonce = [0u8; NONCE_LENGTH];
        nonce.copy_from_slice(&nonce_bytes);
        Ok(Self { ciphertext, nonce, key_version })
    }
}

/// A set of AES-256-GCM keys identified by version, supporting at least two
/// concurrent versions so the cache can keep decrypting values written under
/// a key that is being rotated out.
#[derive(Clone)]
pub struct KeyRing {
    keys: HashMap<u32, Zeroizing<[u8; KEY_LENGTH]>>,
    active_version: u32,
}

impl KeyRing {
    /// Build a ring from `(version, base64 key)` pairs; `active_version`
    /// selects which key new writes are encrypted under.
    pub fn new(keys: Vec<(u32, &str)>, active_version: u32) -> Result<Self, CryptoError> {
        let mut map = HashMap::with_capacity(keys.len());
        for (version, b64) in keys {
            let decoded = BASE64_STANDARD.decode(b64.trim())?;
            if decoded.len() != KEY_LENGTH {
                return Err(CryptoError::InvalidKeyLength { expected: KEY_LENGTH, actual: decoded.len() });
            }
            let mut arr = [0u8; KEY_LENGTH];
            arr.copy_from_slice(&decoded);
            map.insert(version, Zeroizing::new(arr));
        }
        if !map.contains_key(&active_version) {
            return Err(CryptoError::UnknownKeyVersion(active_version));
        }
        Ok(Self { keys: map, active_version })
    }

    pub fn active_version(&self) -> u32 {
        self.active_version
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedRecord, CryptoError> {
        let key = self
        .keys
        .get(&self.active_version)
        .ok_or(CryptoError::UnknownKeyVersion(self.active_version))?;
        let (ciphertext, nonce) = encrypt_with_key(key, plaintext)?;
        Ok(EncryptedRecord { ciphertext, nonce, key_version: self.active_version })
    }

    pub fn decrypt(&self, record: &EncryptedRecord) -> Result<Vec<u8>, CryptoError> {
        let key = self
        .keys
        .get(&record.key_version)
        .ok_or(CryptoError::UnknownKeyVersion(record.key_version))?;
        decrypt_with_key(key, &record.ciphertext, &record.nonce)
    }

    /// Generate a fresh random 32-byte key, base64-encoded, suitable for
    /// inserting as the next rotation version in configuration.
    pub fn generate_key_b64() -> String {
        let mut bytes = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        BASE64_STANDARD.encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_under_active_version() {
        let k1 = KeyRing::generate_key_b64();
        let k2 = KeyRing::generate_key_b64();
        let ring = KeyRing::new(vec![(1, &k1), (2, &k2)], 2).unwrap();
        let plaintext = b"{\"streamUrl\":\"https://example\"}";
        let record = ring.encrypt(plaintext).expect("encrypt");
        assert_eq!(record.key_version, 2);
        let decrypted = ring.decrypt(&record).expect("decrypt");
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn decrypts_values_from_retiring_version() {
        // A value encrypted while version 1 was active...
        let k1_b64 = KeyRing::generate_key_b64();
        let ring_v1_active = KeyRing::new(vec![(1, &k1_b64)], 1).unwrap();
        let record = ring_v1_active.encrypt(b"old-value").unwrap();

        // ...must still decrypt after version 2 becomes active, as long as
        // version 1's key is still present in the ring.
        let ring_rotated = KeyRing::new(vec![(1, &k1_b64), (2, &KeyRing::generate_key_b64())], 2).unwrap();
        let decrypted = ring_rotated.decrypt(&record).expect("decrypt old version");
        assert_eq!(decrypted, b"old-value");
    }

    #[test]
    fn wire_round_trip_preserves_key_version() {
        let k1 = KeyRing::generate_key_b64();
        let ring = KeyRing::new(vec![(1, &k1)], 1).unwrap();
        let record = ring.encrypt(b"payload").unwrap();
        let (ct, nonce, version) = record.to_wire();
        let restored = EncryptedRecord::from_wire(&ct, &nonce, version).unwrap();
        let decrypted = ring.decrypt(&restored).unwrap();
        assert_eq!(decrypted, b"payload");
    }

    #[test]
    fn rejects_unknown_key_version() {
        let k1 = KeyRing::generate_key_b64();
        let ring = KeyRing::new(vec![(1, &k1)], 1).unwrap();
        let bogus = EncryptedRecord { ciphertext: vec![0; 16], nonce: [0; NONCE_LENGTH], key_version: 99 };
        assert!(matches!(ring.decrypt(&bogus), Err(CryptoError::UnknownKeyVersion(99))));
    }
}

