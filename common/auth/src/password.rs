use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::error::{AuthError, AuthResult};

/// Argon2id parameters: `{memoryKb=65536, iterations=3, parallelism=4}`.
#[derive(Clone)]
pub struct PasswordHasherConfig {
    pub memory_kb: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordHasherConfig {
    fn default() -> Self {
        Self { memory_kb: 65_536, iterations: 3, parallelism: 4 }
    }
}

impl PasswordHasherConfig {
    fn argon2(&self) -> AuthResult<Argon2<'static>> {
        let params = Params::new(self.memory_kb, self.iterations, self.parallelism, None)
        .map_err(|e| AuthError::PasswordHash(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

pub fn hash_password(config: &PasswordHasherConfig, plaintext: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = config.argon2()?;
    let hash = argon2.hash_password(plaintext.as_bytes(), &salt).map_err(|e| AuthError::PasswordHash(e.to_string()))?;
    Ok(hash.to_string())
}

pub fn verify_password(stored_hash: &str, candidate: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else { return false };
    Argon2::default().verify_password(candidate.as_bytes(), &parsed).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_correct_password() {
        let config = PasswordHasherConfig::default();
        let hash = hash_password(&config, "correct horse battery staple").unwrap();
        assert!(verify_password(&hash, "correct horse battery staple"));
        assert!(!verify_password(&hash, "wrong password"));
    }
}

