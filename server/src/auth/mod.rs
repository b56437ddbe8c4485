//! Authentication Service
//!
//! Credential verification with progressive lockout, TOTP MFA with backup
//! codes, correlated access/refresh token pairs, and session lifecycle.

mod blacklist;
mod engine;
mod error;
mod handlers;
pub mod jwt;
mod mfa;
mod middleware;
mod password;
mod session;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use sha2::{Digest, Sha256};

pub use blacklist::{InMemoryTokenBlacklist, TokenBlacklist};
pub use engine::{AdminSummary, AuthEngine, AuthPolicy, LoginAttempt};
pub use error::{AuthError, AuthResult};
pub use handlers::REFRESH_COOKIE;
pub use mfa::{MfaEngine, MfaEnrollment, BACKUP_CODE_COUNT};
pub use middleware::{require_auth, AuthAdmin};
pub use password::{hash_password, verify_password};
pub use session::{ClientMeta, InMemorySessionRegistry, Session, SessionRegistry};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AuthEngine>,
}

/// SHA-256 hex digest, used for backup codes and other opaque secrets that
/// only ever need equality checks.
#[must_use]
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Create the authentication router.
///
/// Public routes (no auth required):
/// - POST /login - Verify credentials (and second factor) and mint tokens
/// - POST /refresh - Rotate the refresh cookie into a fresh pair
///
/// Protected routes (Bearer access token required):
/// - POST /logout - End the current session
/// - GET /me - Current admin profile
/// - POST /mfa/setup - Start TOTP enrollment
/// - POST /mfa/enable - Confirm enrollment, receive backup codes
/// - POST /mfa/disable - Turn TOTP off (password + code)
/// - POST /mfa/backup-codes - Regenerate backup codes
/// - POST /admins/{id}/deactivate - Deactivate an admin (super admin only)
pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/logout", post(handlers::logout))
        .route("/me", get(handlers::me))
        .route("/mfa/setup", post(handlers::mfa_setup))
        .route("/mfa/enable", post(handlers::mfa_enable))
        .route("/mfa/disable", post(handlers::mfa_disable))
        .route("/mfa/backup-codes", post(handlers::regenerate_backup_codes))
        .route("/admins/{id}/deactivate", post(handlers::deactivate))
        .layer(axum_middleware::from_fn_with_state(state, require_auth));

    Router::new()
        .route("/login", post(handlers::login))
        .route("/refresh", post(handlers::refresh))
        .merge(protected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token_is_stable_hex() {
        let digest = hash_token("backup-code");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hash_token("backup-code"));
        assert_ne!(digest, hash_token("other-code"));
    }
}
