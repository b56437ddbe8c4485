//! In-memory credential store for tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::{Admin, CredentialStore, StoreError};

/// DashMap-backed [`CredentialStore`]. Each mutation holds the entry's shard
/// lock for its duration, which gives the same per-admin atomicity the
/// Postgres store gets from single-statement updates.
#[derive(Default)]
pub struct MemoryCredentialStore {
    admins: DashMap<Uuid, Admin>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an admin record directly (test setup).
    pub fn insert(&self, admin: Admin) {
        self.admins.insert(admin.id, admin);
    }

    fn update<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Admin) -> T,
    ) -> Result<T, StoreError> {
        let mut entry = self
            .admins
            .get_mut(&id)
            .ok_or_else(|| StoreError::Unavailable(format!("no admin {id}")))?;
        entry.updated_at = Utc::now();
        Ok(f(&mut entry))
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Admin>, StoreError> {
        Ok(self
            .admins
            .iter()
            .find(|entry| entry.email.eq_ignore_ascii_case(email))
            .map(|entry| entry.clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Admin>, StoreError> {
        Ok(self.admins.get(&id).map(|entry| entry.clone()))
    }

    async fn increment_failed_attempts(&self, id: Uuid) -> Result<i32, StoreError> {
        self.update(id, |admin| {
            admin.failed_attempts += 1;
            admin.failed_attempts
        })
    }

    async fn clear_failed_attempts(&self, id: Uuid) -> Result<(), StoreError> {
        self.update(id, |admin| admin.failed_attempts = 0)
    }

    async fn set_lockout(&self, id: Uuid, until: Option<DateTime<Utc>>) -> Result<(), StoreError> {
        self.update(id, |admin| {
            admin.locked_until = until;
            if until.is_some() {
                admin.failed_attempts = 0;
            }
        })
    }

    async fn set_totp_secret(&self, id: Uuid, secret: Option<&str>) -> Result<(), StoreError> {
        self.update(id, |admin| {
            admin.totp_secret = secret.map(String::from);
        })
    }

    async fn enable_totp(
        &self,
        id: Uuid,
        backup_code_digests: &[String],
    ) -> Result<(), StoreError> {
        self.update(id, |admin| {
            admin.totp_enabled = true;
            admin.backup_codes = backup_code_digests.to_vec();
        })
    }

    async fn disable_totp(&self, id: Uuid) -> Result<(), StoreError> {
        self.update(id, |admin| {
            admin.totp_enabled = false;
            admin.totp_secret = None;
            admin.backup_codes.clear();
        })
    }

    async fn set_backup_codes(&self, id: Uuid, digests: &[String]) -> Result<(), StoreError> {
        self.update(id, |admin| admin.backup_codes = digests.to_vec())
    }

    async fn consume_backup_code(&self, id: Uuid, digest: &str) -> Result<bool, StoreError> {
        self.update(id, |admin| {
            match admin.backup_codes.iter().position(|d| d == digest) {
                Some(idx) => {
                    admin.backup_codes.remove(idx);
                    true
                }
                None => false,
            }
        })
    }

    async fn record_login(&self, id: Uuid, ip: Option<&str>) -> Result<(), StoreError> {
        self.update(id, |admin| {
            admin.last_login_at = Some(Utc::now());
            admin.last_login_ip = ip.map(String::from);
            admin.failed_attempts = 0;
            admin.locked_until = None;
        })
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        self.update(id, |admin| admin.active = active)
    }
}
