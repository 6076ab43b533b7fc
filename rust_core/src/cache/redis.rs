//! Redis-backed snapshot cache
//!
//! - `price-data`: JSON snapshot, written with `SET .. EX`
//! - `price-data:updating`: lease holding the owner's id, taken with `SET NX EX`
//!
//! The lease expires on its own, so a worker that dies mid-run cannot leave
//! the flag stuck.

use super::SnapshotCache;
use crate::error::CacheError;
use crate::models::{keys, AggregationSnapshot};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, Script};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Deletes the lease only if we still own it
const RELEASE_LEASE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    pub url: String,
    /// Identifies this worker as the lease holder
    pub holder_id: String,
    pub snapshot_ttl: Duration,
    pub lock_ttl: Duration,
}

#[derive(Clone)]
pub struct RedisSnapshotCache {
    conn: MultiplexedConnection,
    holder_id: String,
    snapshot_ttl_secs: u64,
    lock_ttl_secs: u64,
}

impl RedisSnapshotCache {
    pub async fn connect(config: RedisCacheConfig) -> Result<Self, CacheError> {
        let client = Client::open(config.url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        info!(holder = %config.holder_id, "Connected to Redis snapshot cache");

        Ok(Self {
            conn,
            holder_id: config.holder_id,
            snapshot_ttl_secs: config.snapshot_ttl.as_secs().max(1),
            lock_ttl_secs: config.lock_ttl.as_secs().max(1),
        })
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }
}

#[async_trait]
impl SnapshotCache for RedisSnapshotCache {
    async fn get(&self) -> Result<Option<AggregationSnapshot>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(keys::PRICE_SNAPSHOT)
            .query_async(&mut conn)
            .await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, snapshot: &AggregationSnapshot) -> Result<(), CacheError> {
        let json = serde_json::to_string(snapshot)?;
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(keys::PRICE_SNAPSHOT)
            .arg(&json)
            .arg("EX")
            .arg(self.snapshot_ttl_secs)
            .query_async(&mut conn)
            .await?;

        debug!(bytes = json.len(), ttl_secs = self.snapshot_ttl_secs, "Snapshot stored");
        Ok(())
    }

    async fn set_updating(&self, updating: bool) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();

        if updating {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(keys::UPDATE_LOCK)
                .arg(&self.holder_id)
                .arg("NX")
                .arg("EX")
                .arg(self.lock_ttl_secs)
                .query_async(&mut conn)
                .await?;
            return Ok(acquired.is_some());
        }

        let released: i64 = Script::new(RELEASE_LEASE)
            .key(keys::UPDATE_LOCK)
            .arg(&self.holder_id)
            .invoke_async(&mut conn)
            .await?;
        if released == 0 {
            warn!(holder = %self.holder_id, "Update lease was already gone or taken over");
        }
        Ok(released > 0)
    }

    async fn is_updating(&self) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let exists: i64 = redis::cmd("EXISTS")
            .arg(keys::UPDATE_LOCK)
            .query_async(&mut conn)
            .await?;
        Ok(exists > 0)
    }
}
