//! Session Registry
//!
//! Tracks one live entry per (admin ID, correlation ID) — one refresh lineage
//! on one logical client. An admin may hold many concurrent sessions
//! (multi-device); each is keyed by the correlation identifier of the token
//! pair that created it.
//!
//! `remove` reports whether an entry was actually removed. The refresh flow
//! uses that as its linearization point: of two concurrent refreshes with the
//! same token, exactly one observes the removal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::store::StoreError;

/// Client metadata captured at login/refresh time.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    /// Origin address.
    pub ip_address: Option<String>,
    /// User-agent string (sanitized by the transport layer).
    pub user_agent: Option<String>,
}

/// A live refresh lineage for one admin on one client.
#[derive(Debug, Clone)]
pub struct Session {
    /// Owning admin.
    pub admin_id: Uuid,
    /// Correlation identifier of the token pair that created this session.
    pub correlation_id: Uuid,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Mirrors the refresh-token expiry.
    pub expires_at: DateTime<Utc>,
    /// Client metadata.
    pub client: ClientMeta,
}

/// Shared session store. All operations are atomic per key and idempotent;
/// removing a missing session is not an error.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Record a new session. Replaces any stale entry under the same key.
    async fn create(&self, session: Session) -> Result<(), StoreError>;

    /// Look up a live (non-expired) session.
    async fn get(&self, admin_id: Uuid, correlation_id: Uuid)
        -> Result<Option<Session>, StoreError>;

    /// Remove a session, returning whether it was present.
    async fn remove(&self, admin_id: Uuid, correlation_id: Uuid) -> Result<bool, StoreError>;

    /// Remove every session for an admin, returning the count removed.
    async fn remove_all_for_admin(&self, admin_id: Uuid) -> Result<usize, StoreError>;

    /// Drop sessions whose expiry has passed, returning the count dropped.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// DashMap-backed [`SessionRegistry`] for single-instance deployments.
#[derive(Default)]
pub struct InMemorySessionRegistry {
    sessions: DashMap<(Uuid, Uuid), Session>,
}

impl InMemorySessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries (expired-but-unswept included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    async fn create(&self, session: Session) -> Result<(), StoreError> {
        self.sessions
            .insert((session.admin_id, session.correlation_id), session);
        Ok(())
    }

    async fn get(
        &self,
        admin_id: Uuid,
        correlation_id: Uuid,
    ) -> Result<Option<Session>, StoreError> {
        let session = self
            .sessions
            .get(&(admin_id, correlation_id))
            .map(|entry| entry.clone())
            .filter(|session| session.expires_at > Utc::now());
        Ok(session)
    }

    async fn remove(&self, admin_id: Uuid, correlation_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.sessions.remove(&(admin_id, correlation_id)).is_some())
    }

    async fn remove_all_for_admin(&self, admin_id: Uuid) -> Result<usize, StoreError> {
        let keys: Vec<_> = self
            .sessions
            .iter()
            .filter(|entry| entry.admin_id == admin_id)
            .map(|entry| *entry.key())
            .collect();
        let mut removed = 0;
        for key in keys {
            if self.sessions.remove(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.expires_at > now);
        Ok(before.saturating_sub(self.sessions.len()))
    }
}
