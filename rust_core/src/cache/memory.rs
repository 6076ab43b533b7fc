//! In-process snapshot cache
//!
//! Same contract as the Redis cache (TTL on the snapshot, lease on the
//! updating flag) without the network. Used by tests and single-process runs.

use super::SnapshotCache;
use crate::error::CacheError;
use crate::models::AggregationSnapshot;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Default)]
struct State {
    /// Serialized snapshot and its expiry
    snapshot: Option<(String, Instant)>,
    /// Lease expiry while the updating flag is held
    updating: Option<Instant>,
}

pub struct InMemorySnapshotCache {
    state: Mutex<State>,
    snapshot_ttl: Duration,
    lock_ttl: Duration,
    fail_writes: AtomicBool,
}

impl Default for InMemorySnapshotCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600), Duration::from_secs(300))
    }
}

impl InMemorySnapshotCache {
    pub fn new(snapshot_ttl: Duration, lock_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            snapshot_ttl,
            lock_ttl,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `set` fail with an I/O error (outage simulation)
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SnapshotCache for InMemorySnapshotCache {
    async fn get(&self) -> Result<Option<AggregationSnapshot>, CacheError> {
        let mut state = self.state.lock();
        let expired = matches!(&state.snapshot, Some((_, expires_at)) if *expires_at <= Instant::now());
        if expired {
            state.snapshot = None;
        }
        match &state.snapshot {
            Some((json, _)) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, snapshot: &AggregationSnapshot) -> Result<(), CacheError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Io("write rejected".to_string()));
        }
        let json = serde_json::to_string(snapshot)?;
        self.state.lock().snapshot = Some((json, Instant::now() + self.snapshot_ttl));
        Ok(())
    }

    async fn set_updating(&self, updating: bool) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let held = matches!(state.updating, Some(expires_at) if expires_at > now);

        if updating {
            if held {
                return Ok(false);
            }
            state.updating = Some(now + self.lock_ttl);
            Ok(true)
        } else {
            state.updating = None;
            Ok(held)
        }
    }

    async fn is_updating(&self) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(matches!(self.state.lock().updating, Some(expires_at) if expires_at > now))
    }
}
