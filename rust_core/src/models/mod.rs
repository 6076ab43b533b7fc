// Shared models for the gold bar price pipeline
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod server;

pub use server::ServerId;

// ============================================================================
// Raw extraction output
// ============================================================================

/// Quantity a marketplace quotes its price for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawUnit {
    #[serde(rename = "1M")]
    OneMillion,
    #[serde(rename = "10M")]
    TenMillion,
    #[serde(rename = "100M")]
    HundredMillion,
    #[serde(rename = "1GB")]
    OneGb,
}

impl RawUnit {
    /// Size of the unit counted in 1M steps (1GB = 100 × 1M)
    pub fn multiplier(&self) -> f64 {
        match self {
            RawUnit::OneMillion => 1.0,
            RawUnit::TenMillion => 10.0,
            RawUnit::HundredMillion => 100.0,
            RawUnit::OneGb => 100.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RawUnit::OneMillion => "1M",
            RawUnit::TenMillion => "10M",
            RawUnit::HundredMillion => "100M",
            RawUnit::OneGb => "1GB",
        }
    }

    /// Parse unit text as it appears on listing pages ("10M", "10 m", "100.000.000", "1 GB")
    pub fn parse(text: &str) -> Option<RawUnit> {
        let compact: String = text
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '.' && *c != ',')
            .collect::<String>()
            .to_uppercase();

        match compact.as_str() {
            "1M" | "1000000" => Some(RawUnit::OneMillion),
            "10M" | "10000000" => Some(RawUnit::TenMillion),
            "100M" | "100000000" => Some(RawUnit::HundredMillion),
            "1GB" | "GB" => Some(RawUnit::OneGb),
            _ => None,
        }
    }
}

impl fmt::Display for RawUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate listing as scraped, before any cleanup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawProductRecord {
    /// Free-form server text ("Zero", "Knight Online ZERO GB", ...)
    pub server: String,
    /// Buy price text exactly as shown by the marketplace
    pub raw_buy_price: String,
    pub raw_sell_price: Option<String>,
    pub raw_unit: RawUnit,
    pub source_id: String,
}

// ============================================================================
// Normalized data
// ============================================================================

/// A listing converted to the canonical GB basis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedProduct {
    pub server: ServerId,
    pub buy_price_per_gb: f64,
    pub sell_price_per_gb: Option<f64>,
    pub source_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Success,
    Error,
}

/// Terminal outcome of one adapter within one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    pub source_id: String,
    pub source_name: String,
    pub status: SourceStatus,
    pub products: Vec<NormalizedProduct>,
    pub error: Option<String>,
    pub fetched_at: DateTime<Utc>,
    /// Attempts spent before reaching this outcome
    pub attempts: u32,
}

impl SourceResult {
    pub fn success(
        source_id: impl Into<String>,
        source_name: impl Into<String>,
        products: Vec<NormalizedProduct>,
        attempts: u32,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source_name: source_name.into(),
            status: SourceStatus::Success,
            products,
            error: None,
            fetched_at: Utc::now(),
            attempts,
        }
    }

    pub fn failure(
        source_id: impl Into<String>,
        source_name: impl Into<String>,
        error: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source_name: source_name.into(),
            status: SourceStatus::Error,
            products: Vec::new(),
            error: Some(error.into()),
            fetched_at: Utc::now(),
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SourceStatus::Success
    }
}

// ============================================================================
// Aggregated output
// ============================================================================

/// One source's quote for one server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub source_id: String,
    pub source_name: String,
    pub buy_price_per_gb: f64,
    pub sell_price_per_gb: Option<f64>,
}

/// Best price view for a single server, recomputed every run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerBest {
    pub best_source: String,
    pub best_price: f64,
    /// Every offer, cheapest first
    pub all_offers: Vec<Offer>,
    pub average_price: f64,
    pub price_range: f64,
}

impl ServerBest {
    /// The winning offer (first of `all_offers`)
    pub fn best(&self) -> Option<&Offer> {
        self.all_offers.first()
    }
}

/// Complete result of one run. Replaces the previous snapshot wholesale.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregationSnapshot {
    pub by_source: BTreeMap<String, SourceResult>,
    pub best_by_server: BTreeMap<ServerId, ServerBest>,
    pub last_update: Option<DateTime<Utc>>,
    pub is_updating: bool,
}

impl AggregationSnapshot {
    /// Snapshot served before the first run has ever completed
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_run(results: Vec<SourceResult>, best_by_server: BTreeMap<ServerId, ServerBest>) -> Self {
        let by_source = results
            .into_iter()
            .map(|result| (result.source_id.clone(), result))
            .collect();

        Self {
            by_source,
            best_by_server,
            last_update: Some(Utc::now()),
            is_updating: false,
        }
    }
}

// ============================================================================
// Redis keys and channels
// ============================================================================

pub mod keys {
    /// Last-good snapshot blob
    pub const PRICE_SNAPSHOT: &str = "price-data";
    /// Persisted in-flight run flag (value = holder id)
    pub const UPDATE_LOCK: &str = "price-data:updating";
}

pub mod channels {
    pub const UPDATE_REQUESTS: &str = "prices:update:requests";
    pub const UPDATE_RESULTS: &str = "prices:update:results";
}
