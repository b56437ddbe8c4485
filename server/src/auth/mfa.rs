//! Multi-Factor Authentication
//!
//! TOTP enrollment and verification (RFC 6238: SHA-1, 6 digits, 30-second
//! steps, current ± 1 step accepted for clock drift) plus single-use backup
//! codes. TOTP secrets are AES-256-GCM-encrypted before they reach the
//! credential store; backup codes are stored as SHA-256 digests only.
//!
//! Enrollment is two-phase: `generate_secret` stores an unconfirmed secret
//! with the enabled flag still false, and `enable` commits only after the
//! admin proves they can produce a valid code.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use super::error::{AuthError, AuthResult};
use super::hash_token;
use crate::store::{Admin, CredentialStore};

/// Backup codes issued per enrollment; each is consumable exactly once.
pub const BACKUP_CODE_COUNT: usize = 10;

/// Backup code length (alphanumeric, ~60 bits of entropy).
const BACKUP_CODE_LEN: usize = 10;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Result of starting TOTP enrollment.
#[derive(Debug)]
pub struct MfaEnrollment {
    /// Base32-encoded shared secret (shown once).
    pub secret: String,
    /// otpauth:// URL for authenticator apps.
    pub otpauth_url: String,
}

/// TOTP and backup-code engine.
pub struct MfaEngine {
    cipher_key: [u8; 32],
    issuer: String,
}

impl MfaEngine {
    /// Build the engine from a 32-byte hex encryption key.
    pub fn new(key_hex: &str, issuer: impl Into<String>) -> AuthResult<Self> {
        let bytes = hex::decode(key_hex)
            .map_err(|_| AuthError::Internal("Invalid MFA encryption key".to_string()))?;
        let cipher_key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AuthError::Internal("MFA encryption key must be 32 bytes".to_string()))?;
        Ok(Self {
            cipher_key,
            issuer: issuer.into(),
        })
    }

    /// Start enrollment: generate a fresh secret and store it unconfirmed.
    ///
    /// Fails with `AlreadyEnabled` when TOTP is already on; it must be
    /// explicitly disabled before a new secret can be issued.
    pub async fn generate_secret(
        &self,
        store: &dyn CredentialStore,
        admin: &Admin,
    ) -> AuthResult<MfaEnrollment> {
        if admin.totp_enabled {
            return Err(AuthError::AlreadyEnabled);
        }

        let secret = Secret::default();
        let secret_b32 = secret.to_encoded().to_string();

        let encrypted = self.encrypt(&secret_b32)?;
        store.set_totp_secret(admin.id, Some(&encrypted)).await?;

        let totp = self.totp(&secret_b32, &admin.email)?;
        Ok(MfaEnrollment {
            secret: secret_b32,
            otpauth_url: totp.get_url(),
        })
    }

    /// Validate a 6-digit code against a base32 secret at a given instant,
    /// accepting the current and immediately adjacent time steps.
    pub fn verify_code(
        &self,
        secret_b32: &str,
        account: &str,
        code: &str,
        at: DateTime<Utc>,
    ) -> AuthResult<bool> {
        let totp = self.totp(secret_b32, account)?;
        Ok(totp.check(code.trim(), at.timestamp().max(0) as u64))
    }

    /// Confirm enrollment with a valid code; returns the freshly issued
    /// plaintext backup codes (displayed once, stored as digests).
    ///
    /// A failed verification leaves enrollment uncommitted.
    pub async fn enable(
        &self,
        store: &dyn CredentialStore,
        admin: &Admin,
        code: &str,
    ) -> AuthResult<Vec<String>> {
        if admin.totp_enabled {
            return Err(AuthError::AlreadyEnabled);
        }
        let secret = self.decrypt_secret(admin)?;
        if !self.verify_code(&secret, &admin.email, code, Utc::now())? {
            return Err(AuthError::InvalidCode);
        }

        let codes = generate_backup_codes();
        let digests: Vec<String> = codes.iter().map(|c| hash_token(c)).collect();
        store.enable_totp(admin.id, &digests).await?;
        Ok(codes)
    }

    /// Consume exactly one matching unused backup code. A consumed code
    /// never verifies again.
    pub async fn consume_backup_code(
        &self,
        store: &dyn CredentialStore,
        admin_id: Uuid,
        code: &str,
    ) -> AuthResult<bool> {
        let digest = hash_token(code.trim());
        Ok(store.consume_backup_code(admin_id, &digest).await?)
    }

    /// Clear the secret, backup codes, and the enabled flag. The caller
    /// (AuthEngine) is responsible for having re-verified the password and a
    /// current code first.
    pub async fn disable(&self, store: &dyn CredentialStore, admin_id: Uuid) -> AuthResult<()> {
        store.disable_totp(admin_id).await?;
        Ok(())
    }

    /// Invalidate all previous backup codes and issue a fresh set.
    pub async fn regenerate_backup_codes(
        &self,
        store: &dyn CredentialStore,
        admin: &Admin,
    ) -> AuthResult<Vec<String>> {
        if !admin.totp_enabled {
            return Err(AuthError::MfaNotEnabled);
        }
        let codes = generate_backup_codes();
        let digests: Vec<String> = codes.iter().map(|c| hash_token(c)).collect();
        store.set_backup_codes(admin.id, &digests).await?;
        Ok(codes)
    }

    /// Decrypt the stored TOTP secret for an admin.
    pub fn decrypt_secret(&self, admin: &Admin) -> AuthResult<String> {
        let encrypted = admin
            .totp_secret
            .as_deref()
            .ok_or(AuthError::MfaNotEnabled)?;
        self.decrypt(encrypted)
    }

    fn totp(&self, secret_b32: &str, account: &str) -> AuthResult<TOTP> {
        let secret_bytes = Secret::Encoded(secret_b32.to_string())
            .to_bytes()
            .map_err(|e| AuthError::Internal(format!("Invalid TOTP secret: {e:?}")))?;
        TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret_bytes,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| AuthError::Internal(format!("Failed to create TOTP: {e}")))
    }

    /// Encrypt a secret; output is hex(nonce || ciphertext || tag).
    fn encrypt(&self, plaintext: &str) -> AuthResult<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.cipher_key)
            .map_err(|e| AuthError::Internal(format!("Encryption failed: {e}")))?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| AuthError::Internal(format!("Encryption failed: {e}")))?;

        let mut combined = nonce.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(hex::encode(combined))
    }

    fn decrypt(&self, encrypted: &str) -> AuthResult<String> {
        let combined = hex::decode(encrypted)
            .map_err(|_| AuthError::Internal("Malformed encrypted secret".to_string()))?;
        if combined.len() < NONCE_LEN {
            return Err(AuthError::Internal(
                "Malformed encrypted secret".to_string(),
            ));
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new_from_slice(&self.cipher_key)
            .map_err(|e| AuthError::Internal(format!("Decryption failed: {e}")))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| AuthError::Internal("Decryption failed".to_string()))?;
        String::from_utf8(plaintext)
            .map_err(|_| AuthError::Internal("Decryption failed".to_string()))
    }
}

fn generate_backup_codes() -> Vec<String> {
    (0..BACKUP_CODE_COUNT)
        .map(|_| {
            rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(BACKUP_CODE_LEN)
                .map(char::from)
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const TEST_KEY: &str = "0000000000000000000000000000000000000000000000000000000000000000";

    fn engine() -> MfaEngine {
        MfaEngine::new(TEST_KEY, "Wayline").unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let engine = engine();
        let encrypted = engine.encrypt("JBSWY3DPEHPK3PXP").unwrap();
        assert_ne!(encrypted, "JBSWY3DPEHPK3PXP");
        assert_eq!(engine.decrypt(&encrypted).unwrap(), "JBSWY3DPEHPK3PXP");
    }

    #[test]
    fn test_nonce_randomness() {
        let engine = engine();
        let a = engine.encrypt("JBSWY3DPEHPK3PXP").unwrap();
        let b = engine.encrypt("JBSWY3DPEHPK3PXP").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails_decryption() {
        let encrypted = engine().encrypt("JBSWY3DPEHPK3PXP").unwrap();
        let other = MfaEngine::new(
            "1111111111111111111111111111111111111111111111111111111111111111",
            "Wayline",
        )
        .unwrap();
        assert!(other.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_code_accepted_within_adjacent_step_only() {
        let engine = engine();
        let secret = Secret::default().to_encoded().to_string();
        let account = "ops@wayline.test";

        let at = Utc::now();
        let totp = engine.totp(&secret, account).unwrap();
        let code = totp.generate(at.timestamp() as u64);

        assert!(engine.verify_code(&secret, account, &code, at).unwrap());
        // One step of drift in either direction is tolerated.
        assert!(engine
            .verify_code(&secret, account, &code, at + Duration::seconds(30))
            .unwrap());
        assert!(engine
            .verify_code(&secret, account, &code, at - Duration::seconds(30))
            .unwrap());
        // Two steps away is rejected.
        assert!(!engine
            .verify_code(&secret, account, &code, at + Duration::seconds(90))
            .unwrap());
    }

    #[test]
    fn test_backup_codes_are_unique_and_sized() {
        let codes = generate_backup_codes();
        assert_eq!(codes.len(), BACKUP_CODE_COUNT);
        let mut unique = codes.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), BACKUP_CODE_COUNT);
        assert!(codes.iter().all(|c| c.len() == BACKUP_CODE_LEN));
    }
}
