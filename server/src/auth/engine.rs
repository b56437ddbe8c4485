//! Authentication Engine
//!
//! Orchestrates credential verification, progressive lockout, MFA, token
//! rotation, and session lifecycle over the pluggable stores. The engine owns
//! ordering: for refresh it revokes the presented token *before* removing the
//! session, and the session removal is the single linearization point that
//! decides the winner between concurrent refreshes of the same token.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::blacklist::TokenBlacklist;
use super::error::{AuthError, AuthResult};
use super::jwt::{TokenPair, TokenService};
use super::mfa::{MfaEngine, MfaEnrollment};
use super::password::verify_password;
use super::session::{ClientMeta, Session, SessionRegistry};
use crate::audit::{AuditAction, AuditEvent, AuditSeverity, AuditSink};
use crate::config::Config;
use crate::email::{Notification, Notifier};
use crate::store::{Admin, AdminRole, CredentialStore};

/// Lockout policy.
#[derive(Debug, Clone, Copy)]
pub struct AuthPolicy {
    /// Consecutive failures that trigger a lockout.
    pub max_failed_attempts: i32,
    /// How long a lockout lasts.
    pub lockout_cooldown: Duration,
}

impl AuthPolicy {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_failed_attempts: config.lockout_max_attempts,
            lockout_cooldown: Duration::seconds(config.lockout_cooldown_secs),
        }
    }
}

/// A login request as received from the transport layer.
#[derive(Debug)]
pub struct LoginAttempt {
    pub email: String,
    pub password: String,
    /// 6-digit TOTP code, when the account has MFA enabled.
    pub totp_code: Option<String>,
    /// Single-use backup code, as an alternative second factor.
    pub backup_code: Option<String>,
}

/// Admin fields safe to return to clients.
#[derive(Debug, Clone, Serialize)]
pub struct AdminSummary {
    pub id: Uuid,
    pub email: String,
    pub role: AdminRole,
    pub totp_enabled: bool,
    pub last_login_at: Option<chrono::DateTime<Utc>>,
}

impl From<&Admin> for AdminSummary {
    fn from(admin: &Admin) -> Self {
        Self {
            id: admin.id,
            email: admin.email.clone(),
            role: admin.role,
            totp_enabled: admin.totp_enabled,
            last_login_at: admin.last_login_at,
        }
    }
}

/// The authentication core. One instance per process, shared by handlers.
pub struct AuthEngine {
    store: Arc<dyn CredentialStore>,
    tokens: TokenService,
    mfa: MfaEngine,
    sessions: Arc<dyn SessionRegistry>,
    blacklist: Arc<dyn TokenBlacklist>,
    audit: Arc<dyn AuditSink>,
    notifier: Option<Arc<dyn Notifier>>,
    policy: AuthPolicy,
}

impl AuthEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        tokens: TokenService,
        mfa: MfaEngine,
        sessions: Arc<dyn SessionRegistry>,
        blacklist: Arc<dyn TokenBlacklist>,
        audit: Arc<dyn AuditSink>,
        notifier: Option<Arc<dyn Notifier>>,
        policy: AuthPolicy,
    ) -> Self {
        Self {
            store,
            tokens,
            mfa,
            sessions,
            blacklist,
            audit,
            notifier,
            policy,
        }
    }

    /// Verify credentials (and second factor where enrolled), then mint a
    /// token pair and register the session.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    /// A locked account rejects even a correct password until the lock
    /// expires, without touching the failure counter.
    pub async fn login(
        &self,
        attempt: LoginAttempt,
        client: ClientMeta,
    ) -> AuthResult<(TokenPair, AdminSummary)> {
        let now = Utc::now();

        let Some(admin) = self.store.find_by_email(&attempt.email).await? else {
            self.record(
                AuditEvent::new(AuditAction::LoginFailed, AuditSeverity::Warning)
                    .client(client.ip_address.clone(), client.user_agent.clone())
                    .metadata(serde_json::json!({"reason": "unknown_email"})),
            )
            .await;
            return Err(AuthError::InvalidCredentials);
        };

        if let Some(unlock_at) = admin.locked_until.filter(|until| *until > now) {
            return Err(AuthError::AccountLocked { unlock_at });
        }

        if !verify_password(&attempt.password, &admin.password_hash) {
            return Err(self.handle_failed_password(&admin, &client).await?);
        }

        if !admin.active {
            return Err(AuthError::PrincipalInactive);
        }

        // The password is proven; the failure counter resets here even if the
        // second factor below is missing or wrong.
        self.store.clear_failed_attempts(admin.id).await?;

        if admin.totp_enabled {
            self.verify_second_factor(&admin, &attempt, &client).await?;
        }

        self.store
            .record_login(admin.id, client.ip_address.as_deref())
            .await?;

        let tokens = self.mint_session(&admin, &client).await?;

        self.record(
            AuditEvent::new(AuditAction::Login, AuditSeverity::Info)
                .admin(admin.id)
                .client(client.ip_address, client.user_agent),
        )
        .await;

        Ok((tokens, AdminSummary::from(&admin)))
    }

    /// Rotate a refresh token: the presented token is permanently revoked and
    /// a fresh pair (with a new correlation identifier) replaces it.
    ///
    /// Under concurrent presentation of the same token, exactly one caller
    /// wins; the rest observe [`AuthError::TokenReplayed`].
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: ClientMeta,
    ) -> AuthResult<(TokenPair, AdminSummary)> {
        let claims = self.tokens.verify_refresh(refresh_token)?;
        let admin_id = claims.admin_id()?;
        let correlation_id = claims.correlation_id()?;

        let admin = self
            .store
            .find_by_id(admin_id)
            .await?
            .filter(|admin| admin.active)
            .ok_or(AuthError::PrincipalInactive)?;

        if self.sessions.get(admin_id, correlation_id).await?.is_none() {
            return Err(AuthError::SessionExpired);
        }

        if self.blacklist.is_revoked(correlation_id).await? {
            self.record_replay(admin_id, correlation_id, &client).await;
            return Err(AuthError::TokenReplayed);
        }

        // Revoke before removing: a racer that slips past the blacklist
        // check still loses at the removal below, and once either racer has
        // revoked, the token can never be accepted again.
        let token_deadline = chrono::DateTime::from_timestamp(claims.exp, 0)
            .unwrap_or_else(|| Utc::now() + Duration::seconds(1));
        self.blacklist.revoke(correlation_id, token_deadline).await?;

        if !self.sessions.remove(admin_id, correlation_id).await? {
            self.record_replay(admin_id, correlation_id, &client).await;
            return Err(AuthError::TokenReplayed);
        }

        let tokens = self.mint_session(&admin, &client).await?;

        self.record(
            AuditEvent::new(AuditAction::TokenRefreshed, AuditSeverity::Info)
                .admin(admin_id)
                .client(client.ip_address, client.user_agent),
        )
        .await;

        Ok((tokens, AdminSummary::from(&admin)))
    }

    /// End one session. Idempotent: logging out an already-dead session
    /// succeeds quietly.
    pub async fn logout(&self, admin_id: Uuid, correlation_id: Uuid) -> AuthResult<()> {
        if let Some(session) = self.sessions.get(admin_id, correlation_id).await? {
            // Revoke the lineage so the refresh half of the pair dies with
            // the session.
            self.blacklist
                .revoke(correlation_id, session.expires_at)
                .await?;
        }
        self.sessions.remove(admin_id, correlation_id).await?;

        self.record(
            AuditEvent::new(AuditAction::Logout, AuditSeverity::Info).admin(admin_id),
        )
        .await;
        Ok(())
    }

    /// Deactivate an admin and end all their sessions. In-flight access
    /// tokens keep working until they expire; refresh is cut off immediately.
    pub async fn deactivate(&self, admin_id: Uuid) -> AuthResult<usize> {
        self.store.set_active(admin_id, false).await?;
        let removed = self.sessions.remove_all_for_admin(admin_id).await?;

        self.record(
            AuditEvent::new(AuditAction::Deactivated, AuditSeverity::Warning)
                .admin(admin_id)
                .metadata(serde_json::json!({"sessions_ended": removed})),
        )
        .await;
        Ok(removed)
    }

    /// Validate an access token and load its (still-active) admin.
    pub async fn authenticate(&self, access_token: &str) -> AuthResult<(AdminSummary, Uuid)> {
        let claims = self.tokens.verify_access(access_token)?;
        let admin_id = claims.admin_id()?;
        let correlation_id = claims.correlation_id()?;

        let admin = self
            .store
            .find_by_id(admin_id)
            .await?
            .filter(|admin| admin.active)
            .ok_or(AuthError::PrincipalInactive)?;

        Ok((AdminSummary::from(&admin), correlation_id))
    }

    /// Start TOTP enrollment for an admin.
    pub async fn mfa_setup(&self, admin_id: Uuid) -> AuthResult<MfaEnrollment> {
        let admin = self.load_admin(admin_id).await?;
        let enrollment = self.mfa.generate_secret(self.store.as_ref(), &admin).await?;

        self.record(
            AuditEvent::new(AuditAction::MfaEnrolled, AuditSeverity::Info).admin(admin_id),
        )
        .await;
        Ok(enrollment)
    }

    /// Confirm TOTP enrollment; returns the one-time-visible backup codes.
    pub async fn mfa_enable(&self, admin_id: Uuid, code: &str) -> AuthResult<Vec<String>> {
        let admin = self.load_admin(admin_id).await?;
        let codes = self.mfa.enable(self.store.as_ref(), &admin, code).await?;

        self.record(
            AuditEvent::new(AuditAction::MfaEnabled, AuditSeverity::Info).admin(admin_id),
        )
        .await;
        Ok(codes)
    }

    /// Turn TOTP off. Requires the password and a current code, so a stolen
    /// access token alone cannot strip the second factor.
    pub async fn mfa_disable(
        &self,
        admin_id: Uuid,
        password: &str,
        code: &str,
    ) -> AuthResult<()> {
        let admin = self.load_admin(admin_id).await?;
        if !verify_password(password, &admin.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        if !admin.totp_enabled {
            return Err(AuthError::MfaNotEnabled);
        }
        let secret = self.mfa.decrypt_secret(&admin)?;
        if !self
            .mfa
            .verify_code(&secret, &admin.email, code, Utc::now())?
        {
            return Err(AuthError::InvalidMfaCode);
        }

        self.mfa.disable(self.store.as_ref(), admin_id).await?;

        self.record(
            AuditEvent::new(AuditAction::MfaDisabled, AuditSeverity::Warning).admin(admin_id),
        )
        .await;
        Ok(())
    }

    /// Replace all backup codes. Requires a current TOTP code.
    pub async fn regenerate_backup_codes(
        &self,
        admin_id: Uuid,
        code: &str,
    ) -> AuthResult<Vec<String>> {
        let admin = self.load_admin(admin_id).await?;
        if !admin.totp_enabled {
            return Err(AuthError::MfaNotEnabled);
        }
        let secret = self.mfa.decrypt_secret(&admin)?;
        if !self
            .mfa
            .verify_code(&secret, &admin.email, code, Utc::now())?
        {
            return Err(AuthError::InvalidMfaCode);
        }

        let codes = self
            .mfa
            .regenerate_backup_codes(self.store.as_ref(), &admin)
            .await?;

        self.record(
            AuditEvent::new(AuditAction::BackupCodesRegenerated, AuditSeverity::Info)
                .admin(admin_id),
        )
        .await;
        Ok(codes)
    }

    /// Sweep expired sessions and blacklist entries. Returns the counts
    /// dropped (sessions, blacklist entries).
    pub async fn purge_expired(&self) -> AuthResult<(usize, usize)> {
        let now = Utc::now();
        let sessions = self.sessions.purge_expired(now).await?;
        let tokens = self.blacklist.purge_expired(now).await?;
        Ok((sessions, tokens))
    }

    async fn load_admin(&self, admin_id: Uuid) -> AuthResult<Admin> {
        self.store
            .find_by_id(admin_id)
            .await?
            .filter(|admin| admin.active)
            .ok_or(AuthError::PrincipalInactive)
    }

    /// Mint a pair and register its session. If registration fails after the
    /// mint, the fresh pair is revoked so no token circulates without a
    /// session behind it.
    async fn mint_session(&self, admin: &Admin, client: &ClientMeta) -> AuthResult<TokenPair> {
        let tokens = self.tokens.mint(admin.id, admin.role)?;
        let now = Utc::now();
        let session = Session {
            admin_id: admin.id,
            correlation_id: tokens.correlation_id,
            created_at: now,
            expires_at: tokens.refresh_expires_at,
            client: client.clone(),
        };
        if let Err(e) = self.sessions.create(session).await {
            if let Err(revoke_err) = self
                .blacklist
                .revoke(tokens.correlation_id, tokens.refresh_expires_at)
                .await
            {
                tracing::error!(
                    correlation_id = %tokens.correlation_id,
                    error = %revoke_err,
                    "failed to revoke orphaned token pair"
                );
            }
            return Err(e.into());
        }
        Ok(tokens)
    }

    /// Count a failed password attempt and decide between plain rejection
    /// and lockout. The store's atomic increment is the arbiter: whichever
    /// concurrent failure observes the threshold count sets the lock.
    async fn handle_failed_password(
        &self,
        admin: &Admin,
        client: &ClientMeta,
    ) -> AuthResult<AuthError> {
        let count = self.store.increment_failed_attempts(admin.id).await?;

        if count >= self.policy.max_failed_attempts {
            let unlock_at = Utc::now() + self.policy.lockout_cooldown;
            self.store.set_lockout(admin.id, Some(unlock_at)).await?;

            self.record(
                AuditEvent::new(AuditAction::AccountLocked, AuditSeverity::Warning)
                    .admin(admin.id)
                    .client(client.ip_address.clone(), client.user_agent.clone())
                    .metadata(serde_json::json!({"failed_attempts": count})),
            )
            .await;

            if let Some(notifier) = &self.notifier {
                let notifier = Arc::clone(notifier);
                let email = admin.email.clone();
                tokio::spawn(async move {
                    let alert = Notification::LockoutAlert { unlock_at };
                    if let Err(e) = notifier.send(&email, alert).await {
                        tracing::warn!(error = %e, "failed to send lockout alert");
                    }
                });
            }

            // The attempt that trips the threshold still reads as a plain
            // credential failure; the lock announces itself on the next try.
            return Ok(AuthError::InvalidCredentials);
        }

        self.record(
            AuditEvent::new(AuditAction::LoginFailed, AuditSeverity::Warning)
                .admin(admin.id)
                .client(client.ip_address.clone(), client.user_agent.clone())
                .metadata(serde_json::json!({"failed_attempts": count})),
        )
        .await;

        Ok(AuthError::InvalidCredentials)
    }

    /// Check whichever second factor the attempt supplied. A consumed backup
    /// code never works twice; its consumption does not touch the password
    /// failure counter.
    async fn verify_second_factor(
        &self,
        admin: &Admin,
        attempt: &LoginAttempt,
        client: &ClientMeta,
    ) -> AuthResult<()> {
        if attempt.totp_code.is_some() && attempt.backup_code.is_some() {
            return Err(AuthError::Validation(
                "Supply either a TOTP code or a backup code, not both".to_string(),
            ));
        }

        if let Some(code) = attempt.totp_code.as_deref() {
            let secret = self.mfa.decrypt_secret(admin)?;
            if self
                .mfa
                .verify_code(&secret, &admin.email, code, Utc::now())?
            {
                return Ok(());
            }
        } else if let Some(code) = attempt.backup_code.as_deref() {
            if self
                .mfa
                .consume_backup_code(self.store.as_ref(), admin.id, code)
                .await?
            {
                return Ok(());
            }
        } else {
            return Err(AuthError::MfaRequired);
        }

        self.record(
            AuditEvent::new(AuditAction::LoginFailed, AuditSeverity::Warning)
                .admin(admin.id)
                .client(client.ip_address.clone(), client.user_agent.clone())
                .metadata(serde_json::json!({"reason": "invalid_second_factor"})),
        )
        .await;
        Err(AuthError::InvalidMfaCode)
    }

    async fn record_replay(&self, admin_id: Uuid, correlation_id: Uuid, client: &ClientMeta) {
        self.record(
            AuditEvent::new(AuditAction::TokenRefreshed, AuditSeverity::Warning)
                .admin(admin_id)
                .client(client.ip_address.clone(), client.user_agent.clone())
                .metadata(serde_json::json!({
                    "reason": "replay",
                    "correlation_id": correlation_id,
                })),
        )
        .await;
    }

    /// Audit recording is best-effort: failures are logged, never surfaced.
    async fn record(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(event).await {
            tracing::warn!(error = %e, "failed to record audit event");
        }
    }
}
