//! Confirmation service orchestrating issuance and completion
//!
//! Ordering on the confirm path matters: the uniqueness claim happens only
//! after the token has resolved, and the consumed token is deleted last. A
//! crash mid-operation leaves the account either unconfirmed (retryable by
//! re-issuing) or fully confirmed with a stale token reference.

use std::sync::Arc;
use std::time::Duration;

use email::{Email, EmailProvider, TemplateEngine};
use serde_json::json;
use validator::Validate;

use crate::collaborators::{
    AccountStore, AuditLog, AuditRecord, GroupMembership, SessionManager, FIELD_EMAIL,
    FIELD_EMAIL_CONFIRMED, FIELD_USERNAME, UNVERIFIED_GROUP, VERIFIED_GROUP,
};
use crate::error::{ConfirmError, ConfirmResult};
use crate::hooks::{NoopVerifyHooks, VerifyHooks};
use crate::index::EmailIndex;
use crate::kv::KvStore;
use crate::models::{ConfirmConfig, EmailHistoryEntry, SendOptions, VerifyPayload};
use crate::throttle::ThrottlePolicy;
use crate::tokens::TokenStore;

/// Audit event recorded when a validation email is issued
pub const EVENT_CONFIRMATION_SENT: &str = "email-confirmation-sent";
/// Audit event recorded when an account's email changes (including removal)
pub const EVENT_EMAIL_CHANGE: &str = "email-change";
/// Event emitted after an email has been confirmed
pub const EVENT_EMAIL_CONFIRMED: &str = "user.email.confirmed";

const DEFAULT_SUBJECT: &str = "Verify your email address";
const DEFAULT_TEMPLATE: &str = "verify-email";

/// Service layer for email-ownership verification
///
/// Stateless; all state lives in the injected key-value store and the
/// collaborator services.
pub struct EmailConfirmService<K> {
    tokens: TokenStore<K>,
    index: EmailIndex<K>,
    throttle: ThrottlePolicy,
    accounts: Arc<dyn AccountStore>,
    groups: Arc<dyn GroupMembership>,
    sessions: Arc<dyn SessionManager>,
    audit: Arc<dyn AuditLog>,
    hooks: Arc<dyn VerifyHooks>,
    provider: Arc<dyn EmailProvider>,
    templates: Arc<TemplateEngine>,
    config: ConfirmConfig,
}

impl<K: KvStore> EmailConfirmService<K> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kv: Arc<K>,
        config: ConfirmConfig,
        accounts: Arc<dyn AccountStore>,
        groups: Arc<dyn GroupMembership>,
        sessions: Arc<dyn SessionManager>,
        audit: Arc<dyn AuditLog>,
        provider: Arc<dyn EmailProvider>,
        templates: Arc<TemplateEngine>,
    ) -> Self {
        Self {
            tokens: TokenStore::new(kv.clone()),
            index: EmailIndex::new(kv),
            throttle: ThrottlePolicy::from_config(&config),
            accounts,
            groups,
            sessions,
            audit,
            hooks: Arc::new(NoopVerifyHooks),
            provider,
            templates,
            config,
        }
    }

    /// Replace the pass-through verify hooks
    pub fn with_hooks(mut self, hooks: Arc<dyn VerifyHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn tokens(&self) -> &TokenStore<K> {
        &self.tokens
    }

    pub fn index(&self) -> &EmailIndex<K> {
        &self.index
    }

    pub fn config(&self) -> &ConfirmConfig {
        &self.config
    }

    /// Issue a confirmation token for `uid` and dispatch the validation email
    ///
    /// The target address is `options.email` when given and non-empty,
    /// otherwise the account's current email. Returns the issued code, or
    /// `None` when validation emails are disabled by configuration (an
    /// observable no-op, not an error).
    pub async fn send_validation_email(
        &self,
        uid: u64,
        options: SendOptions,
    ) -> ConfirmResult<Option<String>> {
        if !self.config.send_validation_email {
            tracing::info!(uid, "validation email not sent: disabled by configuration");
            return Ok(None);
        }

        let mut options = options;
        options.email = options.email.take().filter(|e| !e.is_empty());
        options
            .validate()
            .map_err(|e| ConfirmError::InvalidData(e.to_string()))?;

        let email = match &options.email {
            Some(email) => email.clone(),
            None => self.account_email(uid).await?.ok_or_else(|| {
                ConfirmError::InvalidData(format!("no email to confirm for uid {uid}"))
            })?,
        };
        let email = email.to_lowercase();

        self.throttle.check(&self.tokens, uid, options.force).await?;

        let code = self.tokens.issue(uid, &email, self.config.expiry).await?;
        let username = self.accounts.get_field(uid, FIELD_USERNAME).await?;

        let payload = VerifyPayload {
            uid,
            username,
            email: email.clone(),
            confirm_code: code.clone(),
            confirm_link: self.config.confirm_link(&code),
            subject: options
                .subject
                .clone()
                .unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            template: options
                .template
                .clone()
                .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
        };
        let payload = self.hooks.filter_payload(payload).await;

        self.audit
            .log(
                AuditRecord::new(EVENT_CONFIRMATION_SENT, uid).with_details(json!({
                    "email": email,
                    "code": code,
                    "force": options.force,
                })),
            )
            .await;

        if !self.hooks.deliver(&payload).await? {
            self.send_direct(&payload).await?;
        }

        tracing::info!(uid, email = %payload.email, "validation email sent");
        Ok(Some(code))
    }

    /// Confirm an email by the code sent in a validation email
    ///
    /// `session_id` is the caller's own session; it survives the revocation
    /// that accompanies an email change.
    pub async fn confirm_by_code(&self, code: &str, session_id: Option<&str>) -> ConfirmResult<()> {
        let token = self.tokens.resolve(code).await?.ok_or_else(|| {
            ConfirmError::InvalidData("unknown or expired confirmation code".to_string())
        })?;
        if token.uid == 0 || token.email.is_empty() {
            return Err(ConfirmError::InvalidData(
                "malformed confirmation token".to_string(),
            ));
        }

        // The newer confirmation always displaces a stale prior claim
        if let Some(owner) = self.index.owner_of(&token.email).await? {
            self.remove(owner, session_id).await?;
        }

        let old_email = self.account_email(token.uid).await?;
        match old_email.as_deref() {
            // Email change: the old address goes away and only the caller's
            // session survives
            Some(old) if old != token.email => self.remove(token.uid, session_id).await?,
            Some(_) => self.sessions.revoke_all(token.uid, session_id).await?,
            // First-time verification keeps existing sessions
            None => {}
        }

        self.accounts
            .set_field(token.uid, FIELD_EMAIL, &token.email)
            .await?;
        self.confirm_by_uid(token.uid).await?;

        self.tokens.discard_code(code).await?;

        self.audit
            .log(
                AuditRecord::new(EVENT_EMAIL_CHANGE, token.uid).with_details(json!({
                    "old_email": old_email.unwrap_or_default(),
                    "new_email": token.email,
                })),
            )
            .await;

        Ok(())
    }

    /// Confirm the account's current email without a code
    ///
    /// Claims the uniqueness index, sets the confirmed flag, moves the
    /// account from the unverified to the verified group, expires any
    /// pending token, and emits the confirmed event.
    pub async fn confirm_by_uid(&self, uid: u64) -> ConfirmResult<()> {
        if uid == 0 {
            return Err(ConfirmError::InvalidUid(uid));
        }
        let email = self
            .account_email(uid)
            .await?
            .ok_or(ConfirmError::InvalidEmail)?;
        let email = email.to_lowercase();

        self.index.claim(uid, &email).await?;
        self.accounts
            .set_field(uid, FIELD_EMAIL_CONFIRMED, "1")
            .await?;
        self.groups.join(VERIFIED_GROUP, uid).await?;
        self.groups.leave(UNVERIFIED_GROUP, uid).await?;
        self.tokens.invalidate(uid).await?;

        self.hooks.email_confirmed(uid, &email).await;
        self.audit
            .log(AuditRecord::new(EVENT_EMAIL_CONFIRMED, uid).with_details(json!({
                "email": email,
            })))
            .await;

        tracing::info!(uid, email = %email, "email confirmed");
        Ok(())
    }

    /// Clear an account's email and release its claim
    ///
    /// Revokes all sessions except `session_id` (all sessions when absent)
    /// and expires any pending token. No-op when the account has no email.
    pub async fn remove(&self, uid: u64, session_id: Option<&str>) -> ConfirmResult<()> {
        let Some(email) = self.account_email(uid).await? else {
            return Ok(());
        };

        self.accounts
            .set_fields(
                uid,
                vec![
                    (FIELD_EMAIL.to_string(), String::new()),
                    (FIELD_EMAIL_CONFIRMED.to_string(), "0".to_string()),
                ],
            )
            .await?;
        self.index.release(uid, &email).await?;
        self.tokens.invalidate(uid).await?;
        self.sessions.revoke_all(uid, session_id).await?;

        self.audit
            .log(AuditRecord::new(EVENT_EMAIL_CHANGE, uid).with_details(json!({
                "old_email": email,
                "new_email": "",
            })))
            .await;

        tracing::info!(uid, email = %email, "email removed from account");
        Ok(())
    }

    /// True iff a validation is pending for `uid`; with `email` given, only
    /// when the pending token targets that address
    pub async fn is_validation_pending(
        &self,
        uid: u64,
        email: Option<&str>,
    ) -> ConfirmResult<bool> {
        let Some(code) = self.tokens.current_code(uid).await? else {
            return Ok(false);
        };

        match email {
            Some(email) => Ok(self
                .tokens
                .resolve(&code)
                .await?
                .is_some_and(|token| token.email == email.to_lowercase())),
            None => Ok(true),
        }
    }

    /// Time until the pending validation expires, or `None` when none is
    /// pending
    pub async fn validation_expiry(&self, uid: u64) -> ConfirmResult<Option<Duration>> {
        Ok(self.tokens.remaining_ttl(uid).await?)
    }

    /// The account currently owning `email`, if any
    pub async fn owner_of(&self, email: &str) -> ConfirmResult<Option<u64>> {
        Ok(self.index.owner_of(email).await?)
    }

    /// True iff no account owns `email`
    pub async fn is_available(&self, email: &str) -> ConfirmResult<bool> {
        Ok(self.index.is_available(email).await?)
    }

    /// The account's confirmed addresses in chronological order
    pub async fn history(&self, uid: u64) -> ConfirmResult<Vec<EmailHistoryEntry>> {
        Ok(self.index.history(uid).await?)
    }

    async fn account_email(&self, uid: u64) -> ConfirmResult<Option<String>> {
        Ok(self
            .accounts
            .get_field(uid, FIELD_EMAIL)
            .await?
            .filter(|e| !e.is_empty()))
    }

    async fn send_direct(&self, payload: &VerifyPayload) -> ConfirmResult<()> {
        let data =
            serde_json::to_value(payload).map_err(|e| ConfirmError::Delivery(e.to_string()))?;
        let rendered = self
            .templates
            .render(&payload.template, &data)
            .map_err(|e| ConfirmError::Delivery(e.to_string()))?;

        let mut mail = Email::new(payload.email.clone(), payload.subject.clone());
        if let Some(text) = rendered.body_text {
            mail = mail.with_text(text);
        }
        if let Some(html) = rendered.body_html {
            mail = mail.with_html(html);
        }

        self.provider
            .send(&mail)
            .await
            .map_err(|e| ConfirmError::Delivery(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        InMemoryAccountStore, InMemoryGroups, RecordingAuditLog, RecordingSessionManager,
    };
    use crate::kv::InMemoryKvStore;
    use email::MockProvider;
    use tokio::sync::Mutex;

    struct Harness {
        service: EmailConfirmService<InMemoryKvStore>,
        accounts: Arc<InMemoryAccountStore>,
        groups: Arc<InMemoryGroups>,
        sessions: Arc<RecordingSessionManager>,
        audit: Arc<RecordingAuditLog>,
        provider: Arc<MockProvider>,
    }

    fn harness(config: ConfirmConfig) -> Harness {
        harness_with_provider(config, Arc::new(MockProvider::new()))
    }

    fn harness_with_provider(config: ConfirmConfig, provider: Arc<MockProvider>) -> Harness {
        let kv = Arc::new(InMemoryKvStore::new());
        let accounts = Arc::new(InMemoryAccountStore::new());
        let groups = Arc::new(InMemoryGroups::new());
        let sessions = Arc::new(RecordingSessionManager::new());
        let audit = Arc::new(RecordingAuditLog::new());
        let templates = Arc::new(TemplateEngine::new().unwrap());

        let service = EmailConfirmService::new(
            kv,
            config,
            accounts.clone(),
            groups.clone(),
            sessions.clone(),
            audit.clone(),
            provider.clone(),
            templates,
        );

        Harness {
            service,
            accounts,
            groups,
            sessions,
            audit,
            provider,
        }
    }

    fn test_config() -> ConfirmConfig {
        // expiry 24h, interval 5m, as in the canonical scenario
        ConfirmConfig::new(1, 5)
    }

    #[tokio::test]
    async fn test_send_then_confirm_happy_path() {
        let h = harness(test_config());
        h.accounts.insert_account(7, "alice", Some("a@x.com")).await;
        h.groups.join(UNVERIFIED_GROUP, 7).await.unwrap();

        let code = h
            .service
            .send_validation_email(7, SendOptions::default())
            .await
            .unwrap()
            .expect("code issued");

        assert!(h.service.is_validation_pending(7, None).await.unwrap());
        assert!(h.provider.was_sent_to("a@x.com").await);

        h.service.confirm_by_code(&code, Some("sess-1")).await.unwrap();

        assert!(!h.service.is_validation_pending(7, None).await.unwrap());
        assert_eq!(
            h.accounts.field(7, FIELD_EMAIL_CONFIRMED).await.as_deref(),
            Some("1")
        );
        assert_eq!(h.service.owner_of("a@x.com").await.unwrap(), Some(7));
        assert!(h.groups.is_member(VERIFIED_GROUP, 7).await);
        assert!(!h.groups.is_member(UNVERIFIED_GROUP, 7).await);
    }

    #[tokio::test]
    async fn test_second_send_within_interval_is_rate_limited() {
        let h = harness(test_config());
        h.accounts.insert_account(7, "alice", Some("a@x.com")).await;

        h.service
            .send_validation_email(7, SendOptions::default())
            .await
            .unwrap();

        let err = h
            .service
            .send_validation_email(7, SendOptions::default())
            .await
            .unwrap_err();

        match err {
            ConfirmError::RateLimited { interval_minutes } => assert_eq!(interval_minutes, 5),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_forced_resend_invalidates_previous_code() {
        let h = harness(test_config());
        h.accounts.insert_account(7, "alice", Some("a@x.com")).await;

        let first = h
            .service
            .send_validation_email(7, SendOptions::default())
            .await
            .unwrap()
            .unwrap();
        let second = h
            .service
            .send_validation_email(7, SendOptions::forced())
            .await
            .unwrap()
            .unwrap();

        let err = h.service.confirm_by_code(&first, None).await.unwrap_err();
        assert!(matches!(err, ConfirmError::InvalidData(_)));

        h.service.confirm_by_code(&second, None).await.unwrap();
        assert_eq!(h.service.owner_of("a@x.com").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_disabled_config_is_observable_noop() {
        let config = ConfirmConfig {
            send_validation_email: false,
            ..test_config()
        };
        let h = harness(config);
        h.accounts.insert_account(7, "alice", Some("a@x.com")).await;

        let code = h
            .service
            .send_validation_email(7, SendOptions::default())
            .await
            .unwrap();

        assert_eq!(code, None);
        assert_eq!(h.provider.sent_count().await, 0);
        assert!(h.audit.records().await.is_empty());
        assert!(!h.service.is_validation_pending(7, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_send_without_any_email_fails() {
        let h = harness(test_config());
        h.accounts.insert_account(7, "alice", None).await;

        let err = h
            .service
            .send_validation_email(7, SendOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ConfirmError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_explicit_email_is_validated_and_lowercased() {
        let h = harness(test_config());
        h.accounts.insert_account(7, "alice", None).await;

        let err = h
            .service
            .send_validation_email(7, SendOptions::with_email("not-an-email"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfirmError::InvalidData(_)));

        let code = h
            .service
            .send_validation_email(7, SendOptions::with_email("Alice@X.com"))
            .await
            .unwrap()
            .unwrap();

        let token = h.service.tokens().resolve(&code).await.unwrap().unwrap();
        assert_eq!(token.email, "alice@x.com");
    }

    #[tokio::test]
    async fn test_empty_email_option_falls_back_to_account() {
        let h = harness(test_config());
        h.accounts.insert_account(7, "alice", Some("a@x.com")).await;

        let code = h
            .service
            .send_validation_email(7, SendOptions::with_email(""))
            .await
            .unwrap()
            .unwrap();

        let token = h.service.tokens().resolve(&code).await.unwrap().unwrap();
        assert_eq!(token.email, "a@x.com");
    }

    #[tokio::test]
    async fn test_confirm_unknown_code_fails() {
        let h = harness(test_config());

        let err = h.service.confirm_by_code("bogus", None).await.unwrap_err();
        assert!(matches!(err, ConfirmError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_confirm_expired_code_fails() {
        let config = ConfirmConfig {
            expiry: Duration::from_millis(20),
            ..test_config()
        };
        let h = harness(config);
        h.accounts.insert_account(7, "alice", Some("a@x.com")).await;

        let code = h
            .service
            .send_validation_email(7, SendOptions::default())
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = h.service.confirm_by_code(&code, None).await.unwrap_err();
        assert!(matches!(err, ConfirmError::InvalidData(_)));
        assert!(!h.service.is_validation_pending(7, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_displacement_detaches_previous_owner() {
        let h = harness(test_config());
        h.accounts.insert_account(1, "alice", Some("a@x.com")).await;
        h.accounts.insert_account(2, "bob", None).await;

        let code = h
            .service
            .send_validation_email(1, SendOptions::default())
            .await
            .unwrap()
            .unwrap();
        h.service.confirm_by_code(&code, None).await.unwrap();
        assert_eq!(h.service.owner_of("a@x.com").await.unwrap(), Some(1));

        // Account 2 proves control of the same address and wins it
        let code = h
            .service
            .send_validation_email(2, SendOptions::with_email("a@x.com"))
            .await
            .unwrap()
            .unwrap();
        h.service.confirm_by_code(&code, Some("bob-sess")).await.unwrap();

        assert_eq!(h.service.owner_of("a@x.com").await.unwrap(), Some(2));
        assert_eq!(h.accounts.field(1, FIELD_EMAIL).await.as_deref(), Some(""));
        assert_eq!(
            h.accounts.field(1, FIELD_EMAIL_CONFIRMED).await.as_deref(),
            Some("0")
        );
        assert!(!h.sessions.revocations_for(1).await.is_empty());
        assert_eq!(h.accounts.field(2, FIELD_EMAIL).await.as_deref(), Some("a@x.com"));
    }

    #[tokio::test]
    async fn test_email_change_revokes_all_but_current_session() {
        let h = harness(test_config());
        h.accounts.insert_account(7, "alice", Some("a@x.com")).await;

        let code = h
            .service
            .send_validation_email(7, SendOptions::default())
            .await
            .unwrap()
            .unwrap();
        h.service.confirm_by_code(&code, Some("first")).await.unwrap();

        let code = h
            .service
            .send_validation_email(7, SendOptions {
                email: Some("b@x.com".to_string()),
                force: true,
                ..Default::default()
            })
            .await
            .unwrap()
            .unwrap();
        h.service.confirm_by_code(&code, Some("current")).await.unwrap();

        assert_eq!(h.accounts.field(7, FIELD_EMAIL).await.as_deref(), Some("b@x.com"));
        assert_eq!(h.service.owner_of("b@x.com").await.unwrap(), Some(7));
        assert!(h.service.is_available("a@x.com").await.unwrap());

        let revocations = h.sessions.revocations_for(7).await;
        let last = revocations.last().unwrap();
        assert_eq!(last.kept_session.as_deref(), Some("current"));

        let history = h.service.history(7).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].email, "a@x.com");
        assert_eq!(history[1].email, "b@x.com");
        assert!(history[0].recorded_at <= history[1].recorded_at);
    }

    #[tokio::test]
    async fn test_first_time_confirmation_keeps_sessions() {
        let h = harness(test_config());
        h.accounts.insert_account(7, "alice", None).await;

        let code = h
            .service
            .send_validation_email(7, SendOptions::with_email("a@x.com"))
            .await
            .unwrap()
            .unwrap();
        h.service.confirm_by_code(&code, Some("sess")).await.unwrap();

        assert!(h.sessions.revocations_for(7).await.is_empty());
        assert_eq!(h.service.owner_of("a@x.com").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_reconfirming_same_email_revokes_other_sessions() {
        let h = harness(test_config());
        h.accounts.insert_account(7, "alice", Some("a@x.com")).await;

        let code = h
            .service
            .send_validation_email(7, SendOptions::default())
            .await
            .unwrap()
            .unwrap();
        h.service.confirm_by_code(&code, None).await.unwrap();

        let code = h
            .service
            .send_validation_email(7, SendOptions::forced())
            .await
            .unwrap()
            .unwrap();
        h.service.confirm_by_code(&code, Some("current")).await.unwrap();

        assert_eq!(h.service.owner_of("a@x.com").await.unwrap(), Some(7));
        assert_eq!(
            h.accounts.field(7, FIELD_EMAIL_CONFIRMED).await.as_deref(),
            Some("1")
        );
        assert!(!h.sessions.revocations_for(7).await.is_empty());
    }

    #[tokio::test]
    async fn test_confirm_by_uid_preconditions() {
        let h = harness(test_config());
        h.accounts.insert_account(7, "alice", None).await;

        assert!(matches!(
            h.service.confirm_by_uid(0).await.unwrap_err(),
            ConfirmError::InvalidUid(0)
        ));
        assert!(matches!(
            h.service.confirm_by_uid(7).await.unwrap_err(),
            ConfirmError::InvalidEmail
        ));
    }

    #[tokio::test]
    async fn test_remove_clears_account_and_claim() {
        let h = harness(test_config());
        h.accounts.insert_account(7, "alice", Some("a@x.com")).await;

        let code = h
            .service
            .send_validation_email(7, SendOptions::default())
            .await
            .unwrap()
            .unwrap();
        h.service.confirm_by_code(&code, None).await.unwrap();

        h.service.remove(7, None).await.unwrap();

        assert_eq!(h.accounts.field(7, FIELD_EMAIL).await.as_deref(), Some(""));
        assert_eq!(
            h.accounts.field(7, FIELD_EMAIL_CONFIRMED).await.as_deref(),
            Some("0")
        );
        assert!(h.service.is_available("a@x.com").await.unwrap());
        assert!(!h.service.is_validation_pending(7, None).await.unwrap());

        let revocations = h.sessions.revocations_for(7).await;
        assert_eq!(revocations.last().unwrap().kept_session, None);
    }

    #[tokio::test]
    async fn test_remove_is_noop_without_email() {
        let h = harness(test_config());
        h.accounts.insert_account(7, "alice", None).await;

        h.service.remove(7, None).await.unwrap();

        assert!(h.sessions.revocations_for(7).await.is_empty());
        assert!(h.audit.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_pending_check_matches_stored_email() {
        let h = harness(test_config());
        h.accounts.insert_account(7, "alice", Some("a@x.com")).await;

        h.service
            .send_validation_email(7, SendOptions::default())
            .await
            .unwrap();

        assert!(h.service.is_validation_pending(7, Some("A@X.com")).await.unwrap());
        assert!(!h.service.is_validation_pending(7, Some("b@x.com")).await.unwrap());
        assert!(!h.service.is_validation_pending(9, None).await.unwrap());

        let remaining = h.service.validation_expiry(7).await.unwrap().unwrap();
        assert!(remaining <= h.service.config().expiry);
    }

    #[tokio::test]
    async fn test_audit_trail_of_full_flow() {
        let h = harness(test_config());
        h.accounts.insert_account(7, "alice", Some("a@x.com")).await;

        let code = h
            .service
            .send_validation_email(7, SendOptions::default())
            .await
            .unwrap()
            .unwrap();
        h.service.confirm_by_code(&code, None).await.unwrap();

        let events = h.audit.events().await;
        assert_eq!(
            events,
            vec![
                EVENT_CONFIRMATION_SENT.to_string(),
                EVENT_EMAIL_CONFIRMED.to_string(),
                EVENT_EMAIL_CHANGE.to_string(),
            ]
        );

        let records = h.audit.records().await;
        let sent = &records[0];
        assert_eq!(sent.uid, Some(7));
        let details = sent.details.as_ref().unwrap();
        assert_eq!(details["email"], "a@x.com");
        assert_eq!(details["code"], code);
    }

    #[tokio::test]
    async fn test_delivery_failure_propagates() {
        let h = harness_with_provider(test_config(), Arc::new(MockProvider::failing("smtp down")));
        h.accounts.insert_account(7, "alice", Some("a@x.com")).await;

        let err = h
            .service
            .send_validation_email(7, SendOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ConfirmError::Delivery(_)));
        // The token was already issued; the caller decides on retry policy
        assert!(h.service.is_validation_pending(7, None).await.unwrap());
    }

    struct RewritingHooks;

    #[async_trait::async_trait]
    impl VerifyHooks for RewritingHooks {
        async fn filter_payload(&self, mut payload: VerifyPayload) -> VerifyPayload {
            payload.subject = "Rewritten subject".to_string();
            payload
        }
    }

    #[tokio::test]
    async fn test_filter_hook_rewrites_payload() {
        let h = harness(test_config());
        h.accounts.insert_account(7, "alice", Some("a@x.com")).await;

        let kv = Arc::new(InMemoryKvStore::new());
        let templates = Arc::new(TemplateEngine::new().unwrap());
        let service = EmailConfirmService::new(
            kv,
            test_config(),
            h.accounts.clone(),
            h.groups.clone(),
            h.sessions.clone(),
            h.audit.clone(),
            h.provider.clone(),
            templates,
        )
        .with_hooks(Arc::new(RewritingHooks));

        service
            .send_validation_email(7, SendOptions::default())
            .await
            .unwrap();

        let sent = h.provider.sent_emails().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Rewritten subject");
    }

    #[derive(Default)]
    struct CapturingHooks {
        delivered: Mutex<Vec<VerifyPayload>>,
        confirmed: Mutex<Vec<(u64, String)>>,
    }

    #[async_trait::async_trait]
    impl VerifyHooks for CapturingHooks {
        async fn deliver(&self, payload: &VerifyPayload) -> ConfirmResult<bool> {
            self.delivered.lock().await.push(payload.clone());
            Ok(true)
        }

        async fn email_confirmed(&self, uid: u64, email: &str) {
            self.confirmed.lock().await.push((uid, email.to_string()));
        }
    }

    #[tokio::test]
    async fn test_delivery_hook_takes_over_sending() {
        let hooks = Arc::new(CapturingHooks::default());
        let h = harness(test_config());
        h.accounts.insert_account(7, "alice", Some("a@x.com")).await;

        let kv = Arc::new(InMemoryKvStore::new());
        let templates = Arc::new(TemplateEngine::new().unwrap());
        let service = EmailConfirmService::new(
            kv,
            test_config(),
            h.accounts.clone(),
            h.groups.clone(),
            h.sessions.clone(),
            h.audit.clone(),
            h.provider.clone(),
            templates,
        )
        .with_hooks(hooks.clone());

        let code = service
            .send_validation_email(7, SendOptions::default())
            .await
            .unwrap()
            .unwrap();

        // The listener assumed responsibility; nothing went to the transport
        assert_eq!(h.provider.sent_count().await, 0);
        let delivered = hooks.delivered.lock().await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].confirm_code, code);
        assert!(delivered[0].confirm_link.ends_with(&code));
        drop(delivered);

        service.confirm_by_code(&code, None).await.unwrap();
        assert_eq!(
            hooks.confirmed.lock().await.as_slice(),
            &[(7, "a@x.com".to_string())]
        );
    }
}
