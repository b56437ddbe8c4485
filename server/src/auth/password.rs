//! Password Hashing
//!
//! Argon2id with per-hash random salts. Verification recomputes the hash, so
//! comparison time does not depend on where the first differing byte falls.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use super::error::{AuthError, AuthResult};

/// Hash a plaintext password.
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| AuthError::PasswordHash)?;
    Ok(hash.to_string())
}

/// Verify a plaintext password against a stored digest.
///
/// A malformed digest verifies as false rather than erroring; a corrupt
/// record must not abort the login flow differently from a wrong password.
#[must_use]
pub fn verify_password(password: &str, digest: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(digest) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert_ne!(hash, "correct horse battery staple");
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn test_same_password_different_hashes() {
        let h1 = hash_password("p@ss").unwrap();
        let h2 = hash_password("p@ss").unwrap();
        assert_ne!(h1, h2);
        assert!(verify_password("p@ss", &h1));
        assert!(verify_password("p@ss", &h2));
    }

    #[test]
    fn test_malformed_digest_is_a_plain_failure() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }
}
