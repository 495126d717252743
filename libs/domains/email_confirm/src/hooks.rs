//! Extension points around validation-email delivery
//!
//! The plugin bus is reduced to explicit extension points with pass-through
//! defaults: a payload transform and an optional delivery override. A third
//! notification fires after an email is confirmed.

use async_trait::async_trait;

use crate::error::ConfirmResult;
use crate::models::VerifyPayload;

/// Hooks invoked while sending and confirming validation emails
#[async_trait]
pub trait VerifyHooks: Send + Sync {
    /// Rewrite the outgoing verification payload before delivery
    async fn filter_payload(&self, payload: VerifyPayload) -> VerifyPayload {
        payload
    }

    /// Take over delivery of the verification email
    ///
    /// Returning `true` means the listener assumed responsibility for
    /// delivery and the service must not send the message itself.
    async fn deliver(&self, _payload: &VerifyPayload) -> ConfirmResult<bool> {
        Ok(false)
    }

    /// Notification fired after an account's email has been confirmed
    async fn email_confirmed(&self, _uid: u64, _email: &str) {}
}

/// Pass-through hooks used when no listener is registered
#[derive(Debug, Default)]
pub struct NoopVerifyHooks;

#[async_trait]
impl VerifyHooks for NoopVerifyHooks {}
