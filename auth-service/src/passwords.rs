use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand_core::OsRng;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("invalid hash cost parameters: {0}")]
    InvalidParams(String),
    #[error("failed to hash secret: {0}")]
    Hashing(String),
    #[error("hashing task failed: {0}")]
    Task(String),
}

/// Argon2id cost factor. Defaults match the argon2 crate's recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

/// One-way salted secret hashing.
///
/// Hashing and verification are CPU-bound; the async variants move the work
/// onto the blocking pool.
#[derive(Clone)]
pub struct SecretHasher {
    params: Params,
    decoy: Arc<str>,
}

impl SecretHasher {
    pub fn new(cost: HashCost) -> Result<Self, PasswordError> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|err| PasswordError::InvalidParams(err.to_string()))?;
        let mut hasher = Self {
            params,
            decoy: Arc::from(""),
        };
        let salt = SaltString::generate(&mut OsRng);
        hasher.decoy = Arc::from(hasher.hash_with_salt(salt.as_str(), &salt)?);
        Ok(hasher)
    }

    /// A hash of a random value at the configured cost. Verifying against it
    /// takes as long as a real check and never succeeds for user input.
    pub fn decoy_hash(&self) -> &str {
        &self.decoy
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, secret: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        self.hash_with_salt(secret, &salt)
    }

    fn hash_with_salt(&self, secret: &str, salt: &SaltString) -> Result<String, PasswordError> {
        self.argon2()
            .hash_password(secret.as_bytes(), salt)
            .map(|hash| hash.to_string())
            .map_err(|err| PasswordError::Hashing(err.to_string()))
    }

    /// Constant-time comparison against a stored PHC string. Unparseable
    /// hashes never match.
    pub fn verify(&self, secret: &str, stored_hash: &str) -> bool {
        match PasswordHash::new(stored_hash) {
            Ok(parsed) => self
                .argon2()
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    pub async fn hash_blocking(&self, secret: String) -> Result<String, PasswordError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|err| PasswordError::Task(err.to_string()))?
    }

    pub async fn verify_blocking(
        &self,
        secret: String,
        stored_hash: String,
    ) -> Result<bool, PasswordError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&secret, &stored_hash))
            .await
            .map_err(|err| PasswordError::Task(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> SecretHasher {
        SecretHasher::new(HashCost {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .expect("params")
    }

    #[test]
    fn hash_and_verify() {
        let hasher = cheap();
        let hash = hasher.hash("password123").expect("hash");
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("password123", &hash));
        assert!(!hasher.verify("password124", &hash));
    }

    #[test]
    fn same_secret_gets_distinct_salts() {
        let hasher = cheap();
        let first = hasher.hash("password123").expect("hash");
        let second = hasher.hash("password123").expect("hash");
        assert_ne!(first, second);
        assert!(hasher.verify("password123", &second));
    }

    #[test]
    fn malformed_hash_never_matches() {
        assert!(!cheap().verify("password123", "password123"));
    }

    #[test]
    fn decoy_hash_uses_configured_cost() {
        let hasher = cheap();
        let decoy = hasher.decoy_hash();
        assert!(decoy.starts_with("$argon2id$v=19$m=1024,t=1,p=1$"));
        assert!(!hasher.verify("", decoy));
        assert!(!hasher.verify("password123", decoy));
    }

    #[test]
    fn rejects_zero_iterations() {
        let err = SecretHasher::new(HashCost {
            memory_kib: 1024,
            iterations: 0,
            parallelism: 1,
        });
        assert!(matches!(err, Err(PasswordError::InvalidParams(_))));
    }

    #[tokio::test]
    async fn blocking_variants_round_trip() {
        let hasher = cheap();
        let hash = hasher.hash_blocking("s3cret-value".into()).await.expect("hash");
        assert!(hasher
            .verify_blocking("s3cret-value".into(), hash)
            .await
            .expect("verify"));
    }
}
