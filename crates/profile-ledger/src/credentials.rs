//! Salted one-way credential hashing
//!
//! Digests are Argon2id PHC strings. Each digest carries its own salt and
//! cost parameters, so verification keeps working after the configured cost
//! changes.

use crate::error::DirectoryError;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};

const SALT_LEN: usize = 16;

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HasherConfig {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl HasherConfig {
    /// Lowest cost Argon2 accepts; for tests and benchmarks only
    pub fn minimal() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: Params::MIN_T_COST,
            parallelism: Params::MIN_P_COST,
        }
    }

    fn params(&self) -> Result<Params, DirectoryError> {
        Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| DirectoryError::config(format!("invalid hasher parameters: {e}")))
    }

    /// Check that Argon2 accepts these parameters
    pub fn validate(&self) -> Result<(), DirectoryError> {
        self.params().map(|_| ())
    }
}

/// Hashes and verifies plaintext secrets
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    params: Params,
}

impl CredentialHasher {
    /// Build a hasher from cost parameters
    pub fn new(config: &HasherConfig) -> Result<Self, DirectoryError> {
        Ok(Self {
            params: config.params()?,
        })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a plaintext secret under a fresh random salt
    pub fn hash(&self, plaintext: &str) -> Result<String, DirectoryError> {
        let mut salt_bytes = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes).map_err(DirectoryError::hashing)?;

        let digest = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(DirectoryError::hashing)?;

        Ok(digest.to_string())
    }

    /// Check a plaintext secret against a digest
    ///
    /// A malformed digest verifies as `false`.
    pub fn verify(&self, plaintext: &str, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return false;
        };
        self.argon2()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    /// Whether a digest was produced under different parameters than ours
    pub fn needs_rehash(&self, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return true;
        };
        if parsed.algorithm != argon2::ARGON2ID_IDENT {
            return true;
        }
        match Params::try_from(&parsed) {
            Ok(stored) => {
                stored.m_cost() != self.params.m_cost()
                    || stored.t_cost() != self.params.t_cost()
                    || stored.p_cost() != self.params.p_cost()
            }
            Err(_) => true,
        }
    }
}
