//! Token Blacklist
//!
//! Records revoked refresh-token correlation identifiers until their natural
//! expiry. Presence is a hard rejection for refresh. Entries carry an
//! absolute deadline equal to the revoked token's remaining life, so the
//! blacklist never grows unbounded relative to the refresh lifetime.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::store::StoreError;

/// Shared revocation store; atomic per correlation identifier.
#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    /// Whether a correlation identifier has been revoked and is still within
    /// its original lifetime.
    async fn is_revoked(&self, correlation_id: Uuid) -> Result<bool, StoreError>;

    /// Revoke a correlation identifier until `expires_at` (the remaining
    /// life of its refresh token). Re-revoking is idempotent.
    async fn revoke(
        &self,
        correlation_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Drop entries whose deadline has passed, returning the count dropped.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// DashMap-backed [`TokenBlacklist`] for single-instance deployments.
#[derive(Default)]
pub struct InMemoryTokenBlacklist {
    revoked: DashMap<Uuid, DateTime<Utc>>,
}

impl InMemoryTokenBlacklist {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries (expired-but-unswept included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }
}

#[async_trait]
impl TokenBlacklist for InMemoryTokenBlacklist {
    async fn is_revoked(&self, correlation_id: Uuid) -> Result<bool, StoreError> {
        // Copy the deadline out so the shard read guard is released before
        // any removal; removing under the live guard would deadlock on the
        // shard's write lock.
        let deadline = self.revoked.get(&correlation_id).map(|entry| *entry);
        match deadline {
            Some(deadline) if deadline > Utc::now() => Ok(true),
            Some(_) => {
                self.revoked.remove(&correlation_id);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn revoke(
        &self,
        correlation_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.revoked.insert(correlation_id, expires_at);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let before = self.revoked.len();
        self.revoked.retain(|_, deadline| *deadline > now);
        Ok(before.saturating_sub(self.revoked.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_revoke_then_check() {
        let blacklist = InMemoryTokenBlacklist::new();
        let cid = Uuid::new_v4();

        assert!(!blacklist.is_revoked(cid).await.unwrap());
        blacklist
            .revoke(cid, Utc::now() + Duration::days(7))
            .await
            .unwrap();
        assert!(blacklist.is_revoked(cid).await.unwrap());
    }

    #[tokio::test]
    async fn test_entry_lapses_with_token_lifetime() {
        let blacklist = InMemoryTokenBlacklist::new();
        let cid = Uuid::new_v4();

        blacklist
            .revoke(cid, Utc::now() - Duration::seconds(1))
            .await
            .unwrap();
        assert!(!blacklist.is_revoked(cid).await.unwrap());
        // Lazy removal on check keeps the map bounded even without sweeps.
        assert!(blacklist.is_empty());
    }

    #[tokio::test]
    async fn test_lapsed_entry_can_be_revoked_again() {
        let blacklist = InMemoryTokenBlacklist::new();
        let cid = Uuid::new_v4();

        blacklist
            .revoke(cid, Utc::now() - Duration::seconds(1))
            .await
            .unwrap();
        // The check both reports the lapse and drops the stale entry, and
        // the same identifier stays usable afterwards.
        assert!(!blacklist.is_revoked(cid).await.unwrap());
        assert!(!blacklist.is_revoked(cid).await.unwrap());

        blacklist
            .revoke(cid, Utc::now() + Duration::days(1))
            .await
            .unwrap();
        assert!(blacklist.is_revoked(cid).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let blacklist = InMemoryTokenBlacklist::new();
        blacklist
            .revoke(Uuid::new_v4(), Utc::now() - Duration::seconds(1))
            .await
            .unwrap();
        blacklist
            .revoke(Uuid::new_v4(), Utc::now() + Duration::days(1))
            .await
            .unwrap();

        assert_eq!(blacklist.purge_expired(Utc::now()).await.unwrap(), 1);
        assert_eq!(blacklist.len(), 1);
    }
}
