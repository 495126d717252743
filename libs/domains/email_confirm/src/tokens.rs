//! Confirmation token persistence
//!
//! Tokens are kept under two keys: `confirm:byUid:<uid>` holds the current
//! code for an account, `confirm:<code>` holds the token payload. Both carry
//! the same TTL; the store alone expires them. At most one token is live per
//! uid at any time.

use std::sync::Arc;
use std::time::Duration;

use crate::kv::{KvResult, KvStore};
use crate::models::ConfirmationToken;

const CODE_LEN: usize = 32;

pub(crate) fn uid_key(uid: u64) -> String {
    format!("confirm:byUid:{uid}")
}

pub(crate) fn code_key(code: &str) -> String {
    format!("confirm:{code}")
}

/// Generates, persists, and expires confirmation tokens
pub struct TokenStore<K> {
    kv: Arc<K>,
}

impl<K: KvStore> TokenStore<K> {
    pub fn new(kv: Arc<K>) -> Self {
        Self { kv }
    }

    /// Generate a fresh confirmation code (32 alphanumeric characters from
    /// the thread-local CSPRNG)
    pub fn generate_code() -> String {
        use rand::RngExt;
        use std::iter;
        let mut rng = rand::rng();
        iter::repeat_with(|| {
            let idx: u8 = rng.random_range(0..62);
            match idx {
                0..=9 => (b'0' + idx) as char,
                10..=35 => (b'a' + idx - 10) as char,
                _ => (b'A' + idx - 36) as char,
            }
        })
        .take(CODE_LEN)
        .collect()
    }

    /// Issue a token for `uid`, superseding any prior pending token
    ///
    /// The previous token (if any) is deleted first and can no longer be
    /// confirmed, even if its recipient never acted on it.
    pub async fn issue(&self, uid: u64, email: &str, expiry: Duration) -> KvResult<String> {
        self.invalidate(uid).await?;

        let code = Self::generate_code();
        let payload = serde_json::to_string(&ConfirmationToken {
            uid,
            email: email.to_string(),
        })?;

        self.kv.set_px(&uid_key(uid), &code, expiry).await?;
        self.kv.set_px(&code_key(&code), &payload, expiry).await?;

        Ok(code)
    }

    /// Look up a token by code; `None` when never issued or expired
    pub async fn resolve(&self, code: &str) -> KvResult<Option<ConfirmationToken>> {
        match self.kv.get(&code_key(code)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// The code currently pending for `uid`, if any
    pub async fn current_code(&self, uid: u64) -> KvResult<Option<String>> {
        self.kv.get(&uid_key(uid)).await
    }

    /// True iff a non-expired token exists for `uid`
    pub async fn is_pending(&self, uid: u64) -> KvResult<bool> {
        Ok(self.current_code(uid).await?.is_some())
    }

    /// Time until the current token expires, or `None` when none is pending
    pub async fn remaining_ttl(&self, uid: u64) -> KvResult<Option<Duration>> {
        self.kv.pttl(&uid_key(uid)).await
    }

    /// Delete both the uid mapping and the token payload; idempotent
    pub async fn invalidate(&self, uid: u64) -> KvResult<()> {
        let mut keys = vec![uid_key(uid)];
        if let Some(code) = self.kv.get(&uid_key(uid)).await? {
            keys.push(code_key(&code));
        }
        self.kv.del(&keys).await
    }

    /// Delete a consumed token payload by code
    pub async fn discard_code(&self, code: &str) -> KvResult<()> {
        self.kv.del(&[code_key(code)]).await
    }
}
