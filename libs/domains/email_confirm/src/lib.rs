//! Email Confirmation Domain
//!
//! This module provides the email-ownership verification subsystem: a user
//! claims an address, receives a time-limited single-use confirmation code,
//! and atomically transitions from unverified to verified while no two
//! accounts can simultaneously hold the same address.
//!
//! # Features
//!
//! - Token issuance with passive TTL expiry (one live token per account)
//! - Resend throttling
//! - Global email→uid uniqueness index with append-only history
//! - Confirmation side effects: group transition, session revocation,
//!   audit events
//! - Last-writer-wins displacement of stale claims
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │   Service   │  ← orchestration: issuance, confirmation, removal
//! └──────┬──────┘
//!        │
//! ┌──────▼──────────────────────────┐
//! │ TokenStore · Throttle · Index   │  ← domain state over the KV store
//! └──────┬──────────────────────────┘
//!        │
//! ┌──────▼──────┐   ┌───────────────────────────────┐
//! │   KvStore   │   │ Collaborators (injected)      │
//! │ redis / mem │   │ accounts · groups · sessions  │
//! └─────────────┘   │ audit · hooks · transport     │
//!                   └───────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use domain_email_confirm::{
//!     collaborators::{InMemoryAccountStore, InMemoryGroups, RecordingSessionManager, TracingAuditLog},
//!     ConfirmConfig, EmailConfirmService, InMemoryKvStore,
//! };
//! use email::{MockProvider, TemplateEngine};
//!
//! let service = EmailConfirmService::new(
//!     Arc::new(InMemoryKvStore::new()),
//!     ConfirmConfig::default(),
//!     Arc::new(InMemoryAccountStore::new()),
//!     Arc::new(InMemoryGroups::new()),
//!     Arc::new(RecordingSessionManager::new()),
//!     Arc::new(TracingAuditLog),
//!     Arc::new(MockProvider::new()),
//!     Arc::new(TemplateEngine::new().unwrap()),
//! );
//! ```

pub mod collaborators;
pub mod error;
pub mod hooks;
pub mod index;
pub mod kv;
pub mod models;
pub mod redis;
pub mod service;
pub mod throttle;
pub mod tokens;

// Re-export commonly used types
pub use collaborators::{
    AccountStore, AuditLog, AuditRecord, GroupMembership, InMemoryAccountStore, InMemoryGroups,
    RecordingAuditLog, RecordingSessionManager, SessionManager, SessionRevocation,
    TracingAuditLog, FIELD_EMAIL, FIELD_EMAIL_CONFIRMED, FIELD_USERNAME, UNVERIFIED_GROUP,
    VERIFIED_GROUP,
};
pub use error::{ConfirmError, ConfirmResult};
pub use hooks::{NoopVerifyHooks, VerifyHooks};
pub use index::EmailIndex;
pub use kv::{InMemoryKvStore, KvError, KvResult, KvStore, ZAdd};
pub use models::{ConfirmConfig, ConfirmationToken, EmailHistoryEntry, SendOptions, VerifyPayload};
pub use service::{
    EmailConfirmService, EVENT_CONFIRMATION_SENT, EVENT_EMAIL_CHANGE, EVENT_EMAIL_CONFIRMED,
};
pub use throttle::ThrottlePolicy;
pub use tokens::TokenStore;

pub use self::redis::RedisKvStore;
