//! Credential hasher - Argon2id password hashing
//!
//! Digests are PHC strings (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`), so
//! the salt and cost parameters travel with the stored value and verification
//! works even after the configured costs change.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::domain::result::{Error, Result};
use crate::domain::Argon2Params;

/// One-way password hashing and verification
#[derive(Debug, Clone, Default)]
pub struct CredentialHasher {
    params: Argon2Params,
}

impl CredentialHasher {
    pub fn new(params: Argon2Params) -> Self {
        Self { params }
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.params.memory_cost,
            self.params.time_cost,
            self.params.parallelism,
            None,
        )
        .map_err(|e| Error::upstream(format!("invalid argon2 parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash a password with a fresh random salt
    pub fn hash(&self, plaintext: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = self
            .argon2()?
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| Error::upstream(format!("failed to hash password: {}", e)))?;
        Ok(digest.to_string())
    }

    /// Check a password against a stored digest.
    ///
    /// Mismatch is `Unauthorized`; an unreadable digest is `Upstream`.
    pub fn compare(&self, plaintext: &str, digest: &str) -> Result<()> {
        let parsed = PasswordHash::new(digest)
            .map_err(|e| Error::upstream(format!("stored password hash is unreadable: {}", e)))?;
        self.argon2()?
            .verify_password(plaintext.as_bytes(), &parsed)
            .map_err(|_| Error::unauthorized("password does not match"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::result::ErrorKind;

    fn hasher() -> CredentialHasher {
        CredentialHasher::new(Argon2Params::minimal())
    }

    #[test]
    fn test_hash_then_compare() {
        let hasher = hasher();
        let digest = hasher.hash("pw123").unwrap();
        assert!(digest.starts_with("$argon2id$"));
        assert!(!digest.contains("pw123"));
        hasher.compare("pw123", &digest).unwrap();
    }

    #[test]
    fn test_compare_rejects_other_passwords() {
        let hasher = hasher();
        let digest = hasher.hash("pw123").unwrap();
        for other in ["pw124", "PW123", "", "pw123 "] {
            let err = hasher.compare(other, &digest).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Unauthorized);
        }
    }

    #[test]
    fn test_salt_differs_per_call() {
        let hasher = hasher();
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn test_digest_verifies_under_different_costs() {
        let digest = hasher().hash("pw123").unwrap();
        CredentialHasher::default().compare("pw123", &digest).unwrap();
    }

    #[test]
    fn test_malformed_digest_is_upstream() {
        let err = hasher().compare("pw", "plaintext-by-mistake").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }
}
