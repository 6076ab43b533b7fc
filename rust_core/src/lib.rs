//! Goldbar Core - gold bar price aggregation across marketplaces.
//!
//! This crate provides:
//! - Source adapters (generic regex listing pages) and their registry
//! - Parallel extraction with per-attempt timeouts, retries and isolation
//! - Normalization of scraped listings onto one price basis
//! - Best/average/range aggregation per game server
//! - A single-flight update coordinator persisting snapshots to Redis
//! - A read-only snapshot view with market statistics and source health

pub mod adapters;
pub mod aggregator;
pub mod cache;
pub mod coordinator;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod reader;
pub mod retry;
pub mod utils;

pub use adapters::{AdapterRegistry, Extraction, ListingPageAdapter, ListingSourceConfig, SourceAdapter};
pub use cache::{InMemorySnapshotCache, RedisCacheConfig, RedisSnapshotCache, SnapshotCache};
pub use coordinator::{RunReport, UpdateCoordinator};
pub use error::{AdapterError, CacheError, CoordinatorError};
pub use models::*;
pub use orchestrator::{ExtractionOrchestrator, OrchestratorConfig};
pub use reader::{HealthReport, PriceStatistics, SnapshotReader, SourceHealth, SourceLookup};
pub use retry::{retry_with_backoff, Backoff, RetryPolicy};
