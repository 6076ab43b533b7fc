//! Read-side view of the price cache
//!
//! Serves the last good snapshot and figures derived from it. Reading never
//! triggers extraction; freshness is reported through `last_update` and
//! `is_updating` instead.

use crate::cache::SnapshotCache;
use crate::error::CacheError;
use crate::models::{AggregationSnapshot, ServerBest, ServerId, SourceResult, SourceStatus};
use crate::utils::money::{mean, round_to_cents};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Market-wide figures over every successful product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceStatistics {
    pub total_sources: usize,
    pub active_sources: usize,
    pub total_prices: usize,
    pub average_price: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub price_range: Option<f64>,
    pub last_update: Option<DateTime<Utc>>,
    pub is_updating: bool,
}

impl PriceStatistics {
    pub fn from_snapshot(snapshot: &AggregationSnapshot) -> Self {
        let prices: Vec<f64> = snapshot
            .by_source
            .values()
            .filter(|r| r.is_success())
            .flat_map(|r| r.products.iter().map(|p| p.buy_price_per_gb))
            .collect();

        let min_price = prices.iter().copied().reduce(f64::min);
        let max_price = prices.iter().copied().reduce(f64::max);

        Self {
            total_sources: snapshot.by_source.len(),
            active_sources: snapshot.by_source.values().filter(|r| r.is_success()).count(),
            total_prices: prices.len(),
            average_price: mean(&prices).map(round_to_cents),
            min_price,
            max_price,
            price_range: min_price.zip(max_price).map(|(min, max)| round_to_cents(max - min)),
            last_update: snapshot.last_update,
            is_updating: snapshot.is_updating,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source_id: String,
    pub source_name: String,
    pub status: SourceStatus,
    pub fetched_at: DateTime<Utc>,
    pub product_count: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub sources: Vec<SourceHealth>,
    pub last_update: Option<DateTime<Utc>>,
    pub is_updating: bool,
}

impl HealthReport {
    pub fn from_snapshot(snapshot: &AggregationSnapshot) -> Self {
        let sources = snapshot
            .by_source
            .values()
            .map(|r| SourceHealth {
                source_id: r.source_id.clone(),
                source_name: r.source_name.clone(),
                status: r.status,
                fetched_at: r.fetched_at,
                product_count: r.products.len(),
                error: r.error.clone(),
            })
            .collect();

        Self {
            sources,
            last_update: snapshot.last_update,
            is_updating: snapshot.is_updating,
        }
    }
}

/// Result of looking up one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceLookup {
    Found(SourceResult),
    NotFound { available: Vec<String> },
}

#[derive(Clone)]
pub struct SnapshotReader {
    cache: Arc<dyn SnapshotCache>,
}

impl SnapshotReader {
    pub fn new(cache: Arc<dyn SnapshotCache>) -> Self {
        Self { cache }
    }

    /// Last good snapshot with the live updating flag, or an empty snapshot if
    /// no run has completed yet (or the TTL lapsed)
    pub async fn current(&self) -> Result<AggregationSnapshot, CacheError> {
        let mut snapshot = self.cache.get().await?.unwrap_or_else(AggregationSnapshot::empty);

        match self.cache.is_updating().await {
            Ok(updating) => snapshot.is_updating = updating,
            Err(e) => warn!("Could not read updating flag: {}", e),
        }

        Ok(snapshot)
    }

    pub async fn best_prices(&self) -> Result<BTreeMap<ServerId, ServerBest>, CacheError> {
        Ok(self.current().await?.best_by_server)
    }

    pub async fn source(&self, source_id: &str) -> Result<SourceLookup, CacheError> {
        let mut snapshot = self.current().await?;
        Ok(match snapshot.by_source.remove(source_id) {
            Some(result) => SourceLookup::Found(result),
            None => SourceLookup::NotFound {
                available: snapshot.by_source.into_keys().collect(),
            },
        })
    }

    pub async fn summary(&self) -> Result<PriceStatistics, CacheError> {
        Ok(PriceStatistics::from_snapshot(&self.current().await?))
    }

    pub async fn source_health(&self) -> Result<HealthReport, CacheError> {
        Ok(HealthReport::from_snapshot(&self.current().await?))
    }
}
