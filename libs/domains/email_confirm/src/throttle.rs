//! Resend throttling for validation emails

use std::time::Duration;

use crate::error::{ConfirmError, ConfirmResult};
use crate::kv::KvStore;
use crate::models::ConfirmConfig;
use crate::tokens::TokenStore;

/// Decides whether a new validation email may be sent for an account
#[derive(Debug, Clone)]
pub struct ThrottlePolicy {
    interval: Duration,
    expiry: Duration,
}

impl ThrottlePolicy {
    pub fn new(interval: Duration, expiry: Duration) -> Self {
        Self { interval, expiry }
    }

    pub fn from_config(config: &ConfirmConfig) -> Self {
        Self::new(config.interval, config.expiry)
    }

    /// A resend is allowed once the pending token has aged past the send
    /// interval: `remaining + interval < expiry`.
    ///
    /// When the interval reaches or exceeds the expiry the inequality can
    /// never hold and unforced resends are impossible while a token is
    /// pending.
    pub fn allows_resend(&self, remaining: Duration) -> bool {
        remaining + self.interval < self.expiry
    }

    /// Check whether issuance is allowed for `uid`
    ///
    /// `force` always allows. Without a pending token there is nothing to
    /// throttle.
    pub async fn check<K: KvStore>(
        &self,
        tokens: &TokenStore<K>,
        uid: u64,
        force: bool,
    ) -> ConfirmResult<()> {
        if force {
            return Ok(());
        }

        match tokens.remaining_ttl(uid).await? {
            None => Ok(()),
            Some(remaining) if self.allows_resend(remaining) => Ok(()),
            Some(_) => Err(ConfirmError::RateLimited {
                interval_minutes: self.interval_minutes(),
            }),
        }
    }

    /// The configured interval in whole minutes (carried in the
    /// rate-limited error for user messaging)
    pub fn interval_minutes(&self) -> u64 {
        self.interval.as_secs() / 60
    }
}
