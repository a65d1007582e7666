//! Password hashing and verification using Argon2
//!
//! Used for the admin surface credentials; the persisted configuration
//! document only ever stores the PHC hash string.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use mxgate_core::GatewayError;
use rand_core::OsRng;
use tracing::error;

/// Password hashing service using Argon2id with default parameters.
#[derive(Debug, Clone, Default)]
pub struct PasswordService {
    argon2: Argon2<'static>,
}

impl PasswordService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash a password, returning the PHC string.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Internal` if hashing fails.
    pub fn hash_password(&self, password: &str) -> Result<String, GatewayError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| {
                error!(error = %e, "failed to hash password");
                GatewayError::Internal(format!("password hashing failed: {}", e))
            })
    }

    /// Verify a password against a PHC hash string.
    ///
    /// Returns `Ok(false)` on mismatch; an error only when the stored hash
    /// itself is malformed.
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, GatewayError> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "stored password hash is malformed");
            GatewayError::Internal(format!("invalid password hash: {}", e))
        })?;

        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(GatewayError::Internal(format!(
                "password verification failed: {}",
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let service = PasswordService::new();
        let hash = service.hash_password("mxgateadm").unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(service.verify_password("mxgateadm", &hash).unwrap());
        assert!(!service.verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let service = PasswordService::new();
        let hash1 = service.hash_password("pw").unwrap();
        let hash2 = service.hash_password("pw").unwrap();

        assert_ne!(hash1, hash2);
        assert!(service.verify_password("pw", &hash1).unwrap());
        assert!(service.verify_password("pw", &hash2).unwrap());
    }

    #[test]
    fn test_invalid_hash_format() {
        let service = PasswordService::new();
        assert!(service.verify_password("pw", "not-a-phc-string").is_err());
    }
}
