//! Credential Store
//!
//! Durable admin records behind the [`CredentialStore`] trait: Postgres in
//! production, an in-memory map for tests. Counter updates are atomic at the
//! store level so concurrent login failures cannot lose increments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

mod memory;
mod postgres;

pub use memory::MemoryCredentialStore;
pub use postgres::{create_pool, run_migrations, PgCredentialStore};

/// Permission tier for platform administrators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "admin_role", rename_all = "snake_case")]
pub enum AdminRole {
    /// Full platform control, including admin management.
    SuperAdmin,
    /// Day-to-day fleet and schedule operations.
    Operator,
    /// Read-mostly reporting access.
    Analyst,
}

/// A platform administrator record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Admin {
    pub id: Uuid,
    pub email: String,
    pub role: AdminRole,
    /// Argon2id digest in PHC string format.
    pub password_hash: String,
    /// Consecutive failed password attempts since the last success.
    pub failed_attempts: i32,
    /// Lockout deadline; `None` or past means not locked.
    pub locked_until: Option<DateTime<Utc>>,
    /// AES-256-GCM-encrypted TOTP secret (hex), present once enrollment
    /// starts.
    pub totp_secret: Option<String>,
    /// True only after enrollment is confirmed with a valid code.
    pub totp_enabled: bool,
    /// SHA-256 digests of unused backup codes.
    pub backup_codes: Vec<String>,
    /// Deactivated admins cannot log in or refresh.
    pub active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Admin {
    /// Whether the account is locked at `now`.
    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

/// Store-level failure. Callers treat any variant as "try again later";
/// detail goes to logs, not clients.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

/// Durable admin credential operations.
///
/// Mutations are atomic per admin: `increment_failed_attempts` returns the
/// post-increment count so the caller's lockout decision and the increment
/// cannot interleave, and `consume_backup_code` removes at most one code.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Admin>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Admin>, StoreError>;

    /// Atomically bump the failure counter, returning the new count.
    async fn increment_failed_attempts(&self, id: Uuid) -> Result<i32, StoreError>;

    /// Reset the failure counter to zero.
    async fn clear_failed_attempts(&self, id: Uuid) -> Result<(), StoreError>;

    /// Set or clear the lockout deadline. Setting a deadline also resets the
    /// failure counter, so the next window starts clean.
    async fn set_lockout(&self, id: Uuid, until: Option<DateTime<Utc>>) -> Result<(), StoreError>;

    /// Store or clear the encrypted TOTP secret (enrollment start/abort).
    async fn set_totp_secret(&self, id: Uuid, secret: Option<&str>) -> Result<(), StoreError>;

    /// Flip TOTP on and store the backup-code digests in one step.
    async fn enable_totp(&self, id: Uuid, backup_code_digests: &[String])
        -> Result<(), StoreError>;

    /// Clear the secret, backup codes, and the enabled flag.
    async fn disable_totp(&self, id: Uuid) -> Result<(), StoreError>;

    /// Replace the backup-code digest set.
    async fn set_backup_codes(&self, id: Uuid, digests: &[String]) -> Result<(), StoreError>;

    /// Remove one matching backup-code digest; `true` only if it was present.
    /// Concurrent calls with the same digest succeed at most once.
    async fn consume_backup_code(&self, id: Uuid, digest: &str) -> Result<bool, StoreError>;

    /// Stamp a successful login.
    async fn record_login(&self, id: Uuid, ip: Option<&str>) -> Result<(), StoreError>;

    /// Activate or deactivate an account.
    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), StoreError>;
}
