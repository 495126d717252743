//! Key-value store adapter
//!
//! The confirmation subsystem owns no storage itself; it issues commands
//! against a shared, externally synchronized key-value service. `KvStore`
//! captures exactly the commands the subsystem uses, so tests can substitute
//! the in-memory implementation for a real Redis.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type KvResult<T> = Result<T, KvError>;

/// A single sorted-set insertion, used for batched writes
#[derive(Debug, Clone)]
pub struct ZAdd {
    pub key: String,
    pub member: String,
    pub score: f64,
}

impl ZAdd {
    pub fn new(key: impl Into<String>, member: impl Into<String>, score: f64) -> Self {
        Self {
            key: key.into(),
            member: member.into(),
            score,
        }
    }
}

/// The store commands issued by this subsystem
///
/// Expiry is passive: keys written with a TTL are treated as absent once the
/// TTL elapses. No implementation runs a background sweep.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a string key
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// Write a string key with a millisecond-precision TTL
    async fn set_px(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()>;

    /// Delete keys; missing keys are ignored
    async fn del(&self, keys: &[String]) -> KvResult<()>;

    /// Remaining time to live, or `None` when the key is absent or has no
    /// expiry
    async fn pttl(&self, key: &str) -> KvResult<Option<Duration>>;

    /// Add or update a sorted-set member
    async fn zadd(&self, key: &str, member: &str, score: f64) -> KvResult<()>;

    /// Issue several sorted-set insertions as one batch
    async fn zadd_multi(&self, entries: &[ZAdd]) -> KvResult<()>;

    /// Remove a sorted-set member; missing members are ignored
    async fn zrem(&self, key: &str, member: &str) -> KvResult<()>;

    /// Score of a sorted-set member, or `None` when absent
    async fn zscore(&self, key: &str, member: &str) -> KvResult<Option<f64>>;

    /// All members of a sorted set with their scores, lowest score first
    async fn zrange_withscores(&self, key: &str) -> KvResult<Vec<(String, f64)>>;
}

#[derive(Default)]
struct Inner {
    strings: HashMap<String, (String, Option<Instant>)>,
    zsets: HashMap<String, BTreeMap<String, f64>>,
}

impl Inner {
    fn live_value(&self, key: &str) -> Option<&String> {
        match self.strings.get(key) {
            Some((_, Some(deadline))) if *deadline <= Instant::now() => None,
            Some((value, _)) => Some(value),
            None => None,
        }
    }
}

/// In-memory implementation of `KvStore` (for development/testing)
///
/// Expired string keys are treated as absent on read.
#[derive(Clone, Default)]
pub struct InMemoryKvStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let inner = self.inner.read().await;
        Ok(inner.live_value(key).cloned())
    }

    async fn set_px(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()> {
        let mut inner = self.inner.write().await;
        inner.strings.insert(
            key.to_string(),
            (value.to_string(), Some(Instant::now() + ttl)),
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> KvResult<()> {
        let mut inner = self.inner.write().await;
        for key in keys {
            inner.strings.remove(key);
            inner.zsets.remove(key);
        }
        Ok(())
    }

    async fn pttl(&self, key: &str) -> KvResult<Option<Duration>> {
        let inner = self.inner.read().await;
        let now = Instant::now();
        Ok(match inner.strings.get(key) {
            Some((_, Some(deadline))) if *deadline > now => Some(*deadline - now),
            _ => None,
        })
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> KvResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zadd_multi(&self, entries: &[ZAdd]) -> KvResult<()> {
        let mut inner = self.inner.write().await;
        for entry in entries {
            inner
                .zsets
                .entry(entry.key.clone())
                .or_default()
                .insert(entry.member.clone(), entry.score);
        }
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> KvResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(set) = inner.zsets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn zscore(&self, key: &str, member: &str) -> KvResult<Option<f64>> {
        let inner = self.inner.read().await;
        Ok(inner.zsets.get(key).and_then(|set| set.get(member)).copied())
    }

    async fn zrange_withscores(&self, key: &str) -> KvResult<Vec<(String, f64)>> {
        let inner = self.inner.read().await;
        let mut members: Vec<(String, f64)> = inner
            .zsets
            .get(key)
            .map(|set| set.iter().map(|(m, s)| (m.clone(), *s)).collect())
            .unwrap_or_default();
        members.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(members)
    }
}
