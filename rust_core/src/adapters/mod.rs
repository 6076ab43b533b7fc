//! Source adapter abstractions
//!
//! Defines the SourceAdapter trait that every marketplace integration
//! implements. The orchestrator calls `extract` once per attempt and owns
//! timeouts and retries, so adapters stay simple:
//! - no retry loops of their own
//! - no state shared between attempts (create clients/processes inside `extract`)
//! - every resource held by an attempt must be released on drop, since a
//!   timed-out attempt is cancelled by dropping it

use crate::error::AdapterError;
use crate::models::{RawProductRecord, SourceStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// Concrete adapter implementations
pub mod listing;
pub mod registry;

pub use listing::{ListingPageAdapter, ListingSourceConfig};
pub use registry::AdapterRegistry;

/// What one extraction attempt produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub status: SourceStatus,
    pub products: Vec<RawProductRecord>,
    pub error: Option<String>,
}

impl Extraction {
    pub fn success(products: Vec<RawProductRecord>) -> Self {
        Self {
            status: SourceStatus::Success,
            products,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: SourceStatus::Error,
            products: Vec::new(),
            error: Some(message.into()),
        }
    }
}

/// One marketplace integration
///
/// Implementations must be Send + Sync: each attempt runs in its own task.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable identifier used as the snapshot key (e.g. "kopazar")
    fn source_id(&self) -> &str;

    /// Human-readable marketplace name (e.g. "Kopazar")
    fn source_name(&self) -> &str;

    /// Fetch the market page and extract candidate records.
    ///
    /// # Returns
    /// * `Ok(Extraction)` - the adapter's own view of the attempt; an
    ///   `Extraction` with `status: error` still counts as a failed attempt
    /// * `Err(AdapterError)` - transport or parse failure
    async fn extract(&self) -> Result<Extraction, AdapterError>;
}
