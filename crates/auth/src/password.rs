//! Password verifier derivation (Argon2id, PHC string format).

use std::sync::{Arc, OnceLock};

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use thiserror::Error;

use crate::PasswordVerifier;

/// Work factor of the password hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordHasherConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordHasherConfig {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("invalid hash parameters: {0}")]
    InvalidParams(argon2::Error),

    #[error("failed to hash password: {0}")]
    Hash(argon2::password_hash::Error),

    #[error("stored verifier is malformed: {0}")]
    MalformedVerifier(argon2::password_hash::Error),

    #[error("hashing task failed: {0}")]
    Task(String),
}

/// Derives and checks password verifiers.
///
/// Hashing is CPU-bound, so the async entry points run it on the blocking pool.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
    // Verifier for a throwaway password; unknown-email logins verify against
    // it so both failure paths cost one hash.
    decoy: Arc<OnceLock<String>>,
}

impl PasswordHasher {
    pub fn new(config: PasswordHasherConfig) -> Result<Self, PasswordError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(PasswordError::InvalidParams)?;
        Ok(Self {
            params,
            decoy: Arc::new(OnceLock::new()),
        })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash_blocking(&self, password: &str) -> Result<PasswordVerifier, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let phc = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(PasswordError::Hash)?
            .to_string();
        Ok(PasswordVerifier::new(phc))
    }

    /// Constant-time check of `password` against a stored verifier.
    ///
    /// The verifier's own parameters are used, so verifiers created under an
    /// older work factor keep working.
    pub fn verify_blocking(&self, password: &str, verifier: &PasswordVerifier) -> Result<bool, PasswordError> {
        let parsed = PasswordHash::new(verifier.as_str()).map_err(PasswordError::MalformedVerifier)?;
        match self.argon2().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::Hash(e)),
        }
    }

    /// Burn roughly one verification worth of CPU without any real verifier.
    pub fn verify_decoy_blocking(&self, password: &str) {
        let decoy = self.decoy.get_or_init(|| {
            self.hash_blocking("decoy-password-never-matches")
                .map(|v| v.as_str().to_string())
                .unwrap_or_default()
        });
        if !decoy.is_empty() {
            let _ = self.verify_blocking(password, &PasswordVerifier::new(decoy.clone()));
        }
    }

    pub async fn hash(&self, password: &str) -> Result<PasswordVerifier, PasswordError> {
        let hasher = self.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash_blocking(&password))
            .await
            .map_err(|e| PasswordError::Task(e.to_string()))?
    }

    pub async fn verify(&self, password: &str, verifier: &PasswordVerifier) -> Result<bool, PasswordError> {
        let hasher = self.clone();
        let password = password.to_string();
        let verifier = verifier.clone();
        tokio::task::spawn_blocking(move || hasher.verify_blocking(&password, &verifier))
            .await
            .map_err(|e| PasswordError::Task(e.to_string()))?
    }

    pub async fn verify_decoy(&self, password: &str) {
        let hasher = self.clone();
        let password = password.to_string();
        let _ = tokio::task::spawn_blocking(move || hasher.verify_decoy_blocking(&password)).await;
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
            decoy: Arc::new(OnceLock::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimal work factor keeps the test suite fast.
    fn fast() -> PasswordHasher {
        PasswordHasher::new(PasswordHasherConfig {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap()
    }

    #[test]
    fn default_work_factor_matches_library_default() {
        let cfg = PasswordHasherConfig::default();
        assert_eq!(cfg.memory_kib, Params::DEFAULT_M_COST);
        assert_eq!(cfg.iterations, Params::DEFAULT_T_COST);
    }

    #[test]
    fn verifies_matching_password_only() {
        let hasher = fast();
        let verifier = hasher.hash_blocking("pw-correct").unwrap();
        assert!(verifier.as_str().starts_with("$argon2id$"));
        assert!(hasher.verify_blocking("pw-correct", &verifier).unwrap());
        assert!(!hasher.verify_blocking("pw-wrong", &verifier).unwrap());
    }

    #[test]
    fn salts_differ_between_hashes() {
        let hasher = fast();
        let a = hasher.hash_blocking("same").unwrap();
        let b = hasher.hash_blocking("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_verifier_is_an_error() {
        let hasher = fast();
        let res = hasher.verify_blocking("pw", &PasswordVerifier::new("not-a-phc-string"));
        assert!(matches!(res, Err(PasswordError::MalformedVerifier(_))));
    }

    #[test]
    fn zero_memory_is_rejected() {
        let res = PasswordHasher::new(PasswordHasherConfig {
            memory_kib: 0,
            iterations: 1,
            parallelism: 1,
        });
        assert!(matches!(res, Err(PasswordError::InvalidParams(_))));
    }

    #[tokio::test]
    async fn async_paths_agree_with_blocking() {
        let hasher = fast();
        let verifier = hasher.hash("pw-correct").await.unwrap();
        assert!(hasher.verify("pw-correct", &verifier).await.unwrap());
        hasher.verify_decoy("anything").await;
    }
}
