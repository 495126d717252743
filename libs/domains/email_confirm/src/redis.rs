//! Redis-backed `KvStore` implementation

use async_trait::async_trait;
use database::redis::RedisConfig;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

use crate::kv::{KvResult, KvStore, ZAdd};

/// `KvStore` over a shared Redis instance
///
/// All single-key operations rely on Redis' own atomicity; `zadd_multi` is
/// issued as one MULTI/EXEC pipeline.
#[derive(Clone)]
pub struct RedisKvStore {
    conn: ConnectionManager,
}

impl RedisKvStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connect to Redis and wrap the connection
    ///
    /// The connection is PING-verified and retried with backoff, which
    /// covers stores that are still starting up.
    pub async fn connect(config: &RedisConfig) -> redis::RedisResult<Self> {
        let conn = database::redis::connect_with_retry(&config.url, None).await?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_px(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()> {
        let mut conn = self.conn.clone();
        let millis = (ttl.as_millis() as u64).max(1);
        let _: () = conn.pset_ex(key, value, millis).await?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> KvResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = conn.del(keys).await?;
        Ok(())
    }

    async fn pttl(&self, key: &str) -> KvResult<Option<Duration>> {
        let mut conn = self.conn.clone();
        // PTTL returns -2 for a missing key and -1 for a key without expiry
        let millis: i64 = conn.pttl(key).await?;
        Ok(if millis > 0 {
            Some(Duration::from_millis(millis as u64))
        } else {
            None
        })
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> KvResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn zadd_multi(&self, entries: &[ZAdd]) -> KvResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for entry in entries {
            pipe.zadd(&entry.key, &entry.member, entry.score).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> KvResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.zrem(key, member).await?;
        Ok(())
    }

    async fn zscore(&self, key: &str, member: &str) -> KvResult<Option<f64>> {
        let mut conn = self.conn.clone();
        let score: Option<f64> = conn.zscore(key, member).await?;
        Ok(score)
    }

    async fn zrange_withscores(&self, key: &str) -> KvResult<Vec<(String, f64)>> {
        let mut conn = self.conn.clone();
        let members: Vec<(String, f64)> = conn.zrange_withscores(key, 0, -1).await?;
        Ok(members)
    }
}
