//! Snapshot persistence
//!
//! The cache holds exactly two things: the last-good [`AggregationSnapshot`]
//! as one opaque blob with a TTL, and the persisted "update in progress" flag.

use crate::error::CacheError;
use crate::models::AggregationSnapshot;
use async_trait::async_trait;

pub mod memory;
pub mod redis;

pub use memory::InMemorySnapshotCache;
pub use self::redis::{RedisSnapshotCache, RedisCacheConfig};

#[async_trait]
pub trait SnapshotCache: Send + Sync {
    /// Current snapshot, or `None` if nothing was stored or the TTL lapsed
    async fn get(&self) -> Result<Option<AggregationSnapshot>, CacheError>;

    /// Replace the stored snapshot as a whole
    async fn set(&self, snapshot: &AggregationSnapshot) -> Result<(), CacheError>;

    /// Set or clear the updating flag.
    ///
    /// Returns whether the flag changed. `set_updating(true)` returning
    /// `false` means someone else already holds it.
    async fn set_updating(&self, updating: bool) -> Result<bool, CacheError>;

    async fn is_updating(&self) -> Result<bool, CacheError>;
}
