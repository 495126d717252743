//! Collaborator interfaces consumed by the confirmation service
//!
//! The service is constructed with injected implementations of these traits
//! so tests can substitute the in-memory fakes below. The account record's
//! unrelated fields, the session machinery, and group storage all live
//! elsewhere; only the narrow contracts here are used.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::ConfirmResult;

/// Account fields touched by this subsystem
pub const FIELD_EMAIL: &str = "email";
pub const FIELD_EMAIL_CONFIRMED: &str = "email:confirmed";
pub const FIELD_USERNAME: &str = "username";

/// Group an account joins once its email is confirmed
pub const VERIFIED_GROUP: &str = "verified-users";
/// Group an account leaves once its email is confirmed
pub const UNVERIFIED_GROUP: &str = "unverified-users";

/// Narrow view of the account record store
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_field(&self, uid: u64, field: &str) -> ConfirmResult<Option<String>>;

    async fn set_field(&self, uid: u64, field: &str, value: &str) -> ConfirmResult<()>;

    async fn set_fields(&self, uid: u64, fields: Vec<(String, String)>) -> ConfirmResult<()>;
}

/// Group membership transitions
#[async_trait]
pub trait GroupMembership: Send + Sync {
    async fn join(&self, group: &str, uid: u64) -> ConfirmResult<()>;

    async fn leave(&self, group: &str, uid: u64) -> ConfirmResult<()>;
}

/// Session revocation
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Revoke all of an account's sessions, keeping `except` alive when given
    async fn revoke_all(&self, uid: u64, except: Option<&str>) -> ConfirmResult<()>;
}

/// Structured audit event
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// Event type (e.g., "email-confirmation-sent", "email-change")
    pub event: String,
    /// Account the event concerns
    pub uid: Option<u64>,
    /// Additional details about the event (JSON)
    pub details: Option<serde_json::Value>,
    /// Timestamp when the event occurred
    #[serde(with = "chrono::serde::ts_seconds")]
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(event: impl Into<String>, uid: u64) -> Self {
        Self {
            event: event.into(),
            uid: Some(uid),
            details: None,
            recorded_at: Utc::now(),
        }
    }

    /// Add additional details to the record
    ///
    /// The details are serialized to JSON.
    pub fn with_details(mut self, details: impl Serialize) -> Self {
        self.details = serde_json::to_value(details).ok();
        self
    }
}

/// Audit log sink
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn log(&self, record: AuditRecord);
}

/// Audit log that emits to the `audit` tracing target
///
/// Configure the logging backend to route the `audit` target to a separate
/// file/system.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditLog;

#[async_trait]
impl AuditLog for TracingAuditLog {
    async fn log(&self, record: AuditRecord) {
        tracing::info!(
            target: "audit",
            event = %record.event,
            uid = record.uid,
            details = ?record.details,
            "{}",
            serde_json::to_string(&record)
                .unwrap_or_else(|_| "Failed to serialize audit record".to_string())
        );
    }
}

/// In-memory account store (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryAccountStore {
    fields: Arc<RwLock<HashMap<u64, HashMap<String, String>>>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account with a username and optional email
    pub async fn insert_account(&self, uid: u64, username: &str, email: Option<&str>) {
        let mut fields = self.fields.write().await;
        let account = fields.entry(uid).or_default();
        account.insert(FIELD_USERNAME.to_string(), username.to_string());
        if let Some(email) = email {
            account.insert(FIELD_EMAIL.to_string(), email.to_string());
        }
    }

    /// Read a field directly (test convenience)
    pub async fn field(&self, uid: u64, field: &str) -> Option<String> {
        let fields = self.fields.read().await;
        fields.get(&uid).and_then(|account| account.get(field)).cloned()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get_field(&self, uid: u64, field: &str) -> ConfirmResult<Option<String>> {
        Ok(self.field(uid, field).await)
    }

    async fn set_field(&self, uid: u64, field: &str, value: &str) -> ConfirmResult<()> {
        let mut fields = self.fields.write().await;
        fields
            .entry(uid)
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn set_fields(&self, uid: u64, updates: Vec<(String, String)>) -> ConfirmResult<()> {
        let mut fields = self.fields.write().await;
        let account = fields.entry(uid).or_default();
        for (field, value) in updates {
            account.insert(field, value);
        }
        Ok(())
    }
}

/// In-memory group membership (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryGroups {
    members: Arc<RwLock<HashMap<String, BTreeSet<u64>>>>,
}

impl InMemoryGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_member(&self, group: &str, uid: u64) -> bool {
        let members = self.members.read().await;
        members.get(group).is_some_and(|set| set.contains(&uid))
    }
}

#[async_trait]
impl GroupMembership for InMemoryGroups {
    async fn join(&self, group: &str, uid: u64) -> ConfirmResult<()> {
        let mut members = self.members.write().await;
        members.entry(group.to_string()).or_default().insert(uid);
        Ok(())
    }

    async fn leave(&self, group: &str, uid: u64) -> ConfirmResult<()> {
        let mut members = self.members.write().await;
        if let Some(set) = members.get_mut(group) {
            set.remove(&uid);
        }
        Ok(())
    }
}

/// One recorded session revocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRevocation {
    pub uid: u64,
    /// Session that survived the revocation, if any
    pub kept_session: Option<String>,
}

/// Session manager that records revocations instead of performing them
#[derive(Debug, Default, Clone)]
pub struct RecordingSessionManager {
    revocations: Arc<RwLock<Vec<SessionRevocation>>>,
}

impl RecordingSessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn revocations(&self) -> Vec<SessionRevocation> {
        self.revocations.read().await.clone()
    }

    pub async fn revocations_for(&self, uid: u64) -> Vec<SessionRevocation> {
        self.revocations
            .read()
            .await
            .iter()
            .filter(|r| r.uid == uid)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SessionManager for RecordingSessionManager {
    async fn revoke_all(&self, uid: u64, except: Option<&str>) -> ConfirmResult<()> {
        self.revocations.write().await.push(SessionRevocation {
            uid,
            kept_session: except.map(|s| s.to_string()),
        });
        Ok(())
    }
}

/// Audit log that keeps records in memory (for testing)
#[derive(Debug, Default, Clone)]
pub struct RecordingAuditLog {
    records: Arc<RwLock<Vec<AuditRecord>>>,
}

impl RecordingAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }

    pub async fn events(&self) -> Vec<String> {
        self.records.read().await.iter().map(|r| r.event.clone()).collect()
    }
}

#[async_trait]
impl AuditLog for RecordingAuditLog {
    async fn log(&self, record: AuditRecord) {
        self.records.write().await.push(record);
    }
}
