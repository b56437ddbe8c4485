//! Token Minting and Validation
//!
//! Uses EdDSA (Ed25519) for asymmetric token signing/verification, with
//! distinct keypairs for access and refresh tokens. Every mint produces a
//! correlated pair: both halves carry the same random correlation identifier
//! (`cid`), which is what lets the session registry and the blacklist reason
//! about a refresh lineage as one unit.
//!
//! This service is stateless on purpose: `verify_refresh` checks signature
//! and expiry only. Session and blacklist checks belong to the engine.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{AuthError, AuthResult};
use crate::config::Config;
use crate::store::AdminRole;

/// JWT claims for access and refresh tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (admin ID as UUID string).
    pub sub: String,
    /// Permission tier, so downstream services can authorize without a
    /// store round-trip.
    pub role: AdminRole,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Token type (access or refresh).
    pub typ: TokenType,
    /// Correlation identifier shared by both halves of one pair.
    pub cid: String,
}

impl Claims {
    /// Parse the subject as an admin ID.
    pub fn admin_id(&self) -> AuthResult<Uuid> {
        self.sub.parse().map_err(|_| AuthError::InvalidToken)
    }

    /// Parse the correlation identifier.
    pub fn correlation_id(&self) -> AuthResult<Uuid> {
        self.cid.parse().map_err(|_| AuthError::InvalidToken)
    }
}

/// Token type discriminator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived access token.
    Access,
    /// Long-lived refresh token.
    Refresh,
}

/// Token pair returned after successful authentication.
#[derive(Debug)]
pub struct TokenPair {
    /// Access token (short-lived).
    pub access_token: String,
    /// Refresh token (long-lived).
    pub refresh_token: String,
    /// Access token expiry in seconds.
    pub access_expires_in: i64,
    /// When the refresh token expires.
    pub refresh_expires_at: chrono::DateTime<Utc>,
    /// Correlation identifier embedded in both tokens.
    pub correlation_id: Uuid,
}

/// Decode a base64-encoded PEM key.
fn decode_pem_key(base64_key: &str) -> AuthResult<Vec<u8>> {
    STANDARD
        .decode(base64_key)
        .map_err(|_| AuthError::Internal("Invalid base64 in token key".to_string()))
}

fn encoding_key(base64_pem: &str) -> AuthResult<EncodingKey> {
    let bytes = decode_pem_key(base64_pem)?;
    EncodingKey::from_ed_pem(&bytes)
        .map_err(|e| AuthError::Internal(format!("Invalid Ed25519 private key: {e}")))
}

fn decoding_key(base64_pem: &str) -> AuthResult<DecodingKey> {
    let bytes = decode_pem_key(base64_pem)?;
    DecodingKey::from_ed_pem(&bytes)
        .map_err(|e| AuthError::Internal(format!("Invalid Ed25519 public key: {e}")))
}

/// Mints and verifies correlated access/refresh token pairs.
pub struct TokenService {
    access_signing: EncodingKey,
    access_verifying: DecodingKey,
    refresh_signing: EncodingKey,
    refresh_verifying: DecodingKey,
    access_expiry: i64,
    refresh_expiry: i64,
}

impl TokenService {
    /// Build the service from configuration, decoding both keypairs.
    pub fn new(config: &Config) -> AuthResult<Self> {
        Ok(Self {
            access_signing: encoding_key(&config.access_token_private_key)?,
            access_verifying: decoding_key(&config.access_token_public_key)?,
            refresh_signing: encoding_key(&config.refresh_token_private_key)?,
            refresh_verifying: decoding_key(&config.refresh_token_public_key)?,
            access_expiry: config.access_token_expiry,
            refresh_expiry: config.refresh_token_expiry,
        })
    }

    /// Mint a correlated access/refresh pair for an admin.
    ///
    /// The correlation identifier is a fresh random UUIDv4, never sequential,
    /// so lineage identifiers cannot be guessed.
    pub fn mint(&self, admin_id: Uuid, role: AdminRole) -> AuthResult<TokenPair> {
        let now = Utc::now();
        let correlation_id = Uuid::new_v4();

        let access_claims = Claims {
            sub: admin_id.to_string(),
            role,
            exp: (now + Duration::seconds(self.access_expiry)).timestamp(),
            iat: now.timestamp(),
            typ: TokenType::Access,
            cid: correlation_id.to_string(),
        };
        let access_token = encode(
            &Header::new(Algorithm::EdDSA),
            &access_claims,
            &self.access_signing,
        )?;

        let refresh_expires_at = now + Duration::seconds(self.refresh_expiry);
        let refresh_claims = Claims {
            sub: admin_id.to_string(),
            role,
            exp: refresh_expires_at.timestamp(),
            iat: now.timestamp(),
            typ: TokenType::Refresh,
            cid: correlation_id.to_string(),
        };
        let refresh_token = encode(
            &Header::new(Algorithm::EdDSA),
            &refresh_claims,
            &self.refresh_signing,
        )?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_in: self.access_expiry,
            refresh_expires_at,
            correlation_id,
        })
    }

    /// Validate and decode an access token.
    pub fn verify_access(&self, token: &str) -> AuthResult<Claims> {
        verify(token, &self.access_verifying, TokenType::Access)
    }

    /// Validate and decode a refresh token (signature and expiry only).
    pub fn verify_refresh(&self, token: &str) -> AuthResult<Claims> {
        verify(token, &self.refresh_verifying, TokenType::Refresh)
    }
}

fn verify(token: &str, key: &DecodingKey, expected: TokenType) -> AuthResult<Claims> {
    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.validate_exp = true;
    validation.leeway = 0;

    let token_data = decode::<Claims>(token, key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    })?;

    if token_data.claims.typ != expected {
        return Err(AuthError::InvalidToken);
    }

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(&Config::default_for_test()).unwrap()
    }

    #[test]
    fn test_mint_and_verify_roundtrip() {
        let admin_id = Uuid::new_v4();
        let tokens = service().mint(admin_id, AdminRole::Operator).unwrap();

        let access = service().verify_access(&tokens.access_token).unwrap();
        let refresh = service().verify_refresh(&tokens.refresh_token).unwrap();

        assert_eq!(access.sub, admin_id.to_string());
        assert_eq!(access.role, AdminRole::Operator);
        assert_eq!(refresh.sub, admin_id.to_string());
        assert_eq!(tokens.access_expires_in, 900);
    }

    #[test]
    fn test_pair_shares_one_correlation_id() {
        let svc = service();
        let tokens = svc.mint(Uuid::new_v4(), AdminRole::Analyst).unwrap();

        let access = svc.verify_access(&tokens.access_token).unwrap();
        let refresh = svc.verify_refresh(&tokens.refresh_token).unwrap();

        assert_eq!(access.cid, refresh.cid);
        assert_eq!(
            access.correlation_id().unwrap(),
            tokens.correlation_id
        );
    }

    #[test]
    fn test_distinct_pairs_get_distinct_correlation_ids() {
        let svc = service();
        let a = svc.mint(Uuid::new_v4(), AdminRole::Operator).unwrap();
        let b = svc.mint(Uuid::new_v4(), AdminRole::Operator).unwrap();
        assert_ne!(a.correlation_id, b.correlation_id);
    }

    #[test]
    fn test_access_token_rejected_as_refresh_and_vice_versa() {
        let svc = service();
        let tokens = svc.mint(Uuid::new_v4(), AdminRole::Operator).unwrap();

        // Distinct keypairs mean cross-verification fails on signature
        // before the typ check even runs.
        assert!(svc.verify_refresh(&tokens.access_token).is_err());
        assert!(svc.verify_access(&tokens.refresh_token).is_err());
    }

    #[test]
    fn test_tampered_token_fails() {
        let svc = service();
        let tokens = svc.mint(Uuid::new_v4(), AdminRole::Operator).unwrap();

        // Flip the last character of the signature segment.
        let mut tampered = tokens.access_token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });

        assert!(svc.verify_access(&tampered).is_err());
    }

    #[test]
    fn test_garbage_token_fails() {
        assert!(matches!(
            service().verify_access("not.a.jwt"),
            Err(AuthError::InvalidToken)
        ));
    }
}
