//! Global email ownership index
//!
//! Maintains the email→uid mapping enforcing single ownership, a sorted
//! lookup set, and the append-only per-account email history. Addresses are
//! lowercased before touching any set. Issuing a token never writes here;
//! only a successful confirmation claims the index.

use std::sync::Arc;

use chrono::Utc;

use crate::kv::{KvResult, KvStore, ZAdd};
use crate::models::EmailHistoryEntry;

pub(crate) const EMAIL_UID_KEY: &str = "email:uid";
pub(crate) const EMAIL_SORTED_KEY: &str = "email:sorted";

fn history_key(uid: u64) -> String {
    format!("user:{uid}:emails")
}

/// The email→uid uniqueness index and per-account email history
pub struct EmailIndex<K> {
    kv: Arc<K>,
}

impl<K: KvStore> EmailIndex<K> {
    pub fn new(kv: Arc<K>) -> Self {
        Self { kv }
    }

    /// The account currently owning `email`, if any
    pub async fn owner_of(&self, email: &str) -> KvResult<Option<u64>> {
        let score = self.kv.zscore(EMAIL_UID_KEY, &email.to_lowercase()).await?;
        Ok(score.map(|s| s as u64).filter(|uid| *uid > 0))
    }

    /// True iff no account owns `email`
    pub async fn is_available(&self, email: &str) -> KvResult<bool> {
        Ok(self.owner_of(email).await?.is_none())
    }

    /// Record `email → uid` and append the address to the account's history
    ///
    /// All three sets are written in one batch. Must be called only after a
    /// confirmation succeeds; re-claiming an address moves ownership to the
    /// latest claimant.
    pub async fn claim(&self, uid: u64, email: &str) -> KvResult<()> {
        let email = email.to_lowercase();
        let now = Utc::now().timestamp_millis();

        self.kv
            .zadd_multi(&[
                ZAdd::new(EMAIL_UID_KEY, email.clone(), uid as f64),
                ZAdd::new(EMAIL_SORTED_KEY, format!("{email}:{uid}"), 0.0),
                ZAdd::new(history_key(uid), format!("{email}:{now}"), now as f64),
            ])
            .await
    }

    /// Remove `email` from the index for `uid`
    ///
    /// The history entry stays; the history is append-only.
    pub async fn release(&self, uid: u64, email: &str) -> KvResult<()> {
        let email = email.to_lowercase();
        self.kv.zrem(EMAIL_UID_KEY, &email).await?;
        self.kv.zrem(EMAIL_SORTED_KEY, &format!("{email}:{uid}")).await
    }

    /// The account's confirmed addresses in chronological order
    pub async fn history(&self, uid: u64) -> KvResult<Vec<EmailHistoryEntry>> {
        let members = self.kv.zrange_withscores(&history_key(uid)).await?;
        Ok(members
            .into_iter()
            .filter_map(|(member, score)| {
                let (email, _) = member.rsplit_once(':')?;
                Some(EmailHistoryEntry {
                    email: email.to_string(),
                    recorded_at: score as i64,
                })
            })
            .collect())
    }
}
