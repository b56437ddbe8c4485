//! Audit Trail
//!
//! Security-relevant events flow through an [`AuditSink`]. Recording is
//! best-effort from the engine's point of view: a sink failure is logged and
//! never fails the operation that produced the event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Login,
    LoginFailed,
    Logout,
    TokenRefreshed,
    AccountLocked,
    MfaEnrolled,
    MfaEnabled,
    MfaDisabled,
    BackupCodesRegenerated,
    Deactivated,
}

/// How loudly it should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
}

/// One security event.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Admin involved, if known. Failed logins against unknown emails have
    /// no admin to attribute.
    pub admin_id: Option<Uuid>,
    pub action: AuditAction,
    pub severity: AuditSeverity,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Action-specific detail (attempt counts, session counts, ...).
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    #[must_use]
    pub fn new(action: AuditAction, severity: AuditSeverity) -> Self {
        Self {
            admin_id: None,
            action,
            severity,
            ip_address: None,
            user_agent: None,
            metadata: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn admin(mut self, id: Uuid) -> Self {
        self.admin_id = Some(id);
        self
    }

    #[must_use]
    pub fn client(mut self, ip: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip;
        self.user_agent = user_agent;
        self
    }

    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> anyhow::Result<()>;
}

/// Emits events as structured tracing records. Downstream log shipping turns
/// these into the platform's audit trail.
#[derive(Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) -> anyhow::Result<()> {
        match event.severity {
            AuditSeverity::Info => tracing::info!(
                target: "audit",
                admin_id = ?event.admin_id,
                action = ?event.action,
                ip = event.ip_address.as_deref(),
                user_agent = event.user_agent.as_deref(),
                metadata = %event.metadata,
                "audit event"
            ),
            AuditSeverity::Warning => tracing::warn!(
                target: "audit",
                admin_id = ?event.admin_id,
                action = ?event.action,
                ip = event.ip_address.as_deref(),
                user_agent = event.user_agent.as_deref(),
                metadata = %event.metadata,
                "audit event"
            ),
        }
        Ok(())
    }
}
