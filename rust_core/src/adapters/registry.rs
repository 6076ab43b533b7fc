//! Adapter Registry
//!
//! Holds the configured marketplaces in registration order. The order matters:
//! the orchestrator reports results in it, and the aggregator breaks price ties
//! with it.

use super::{ListingPageAdapter, ListingSourceConfig, SourceAdapter};
use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Ordered set of source adapters
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Build a registry of listing-page adapters, one per config
    pub fn from_listing_configs(configs: Vec<ListingSourceConfig>) -> Result<Self> {
        let mut registry = Self::new();
        for config in configs {
            let id = config.id.clone();
            let adapter = ListingPageAdapter::new(config)
                .with_context(|| format!("Invalid item_pattern for source {}", id))?;
            registry.register(Arc::new(adapter))?;
        }

        info!("AdapterRegistry initialized with {} sources", registry.len());
        Ok(registry)
    }

    /// Load listing source definitions from a JSON file
    pub fn from_sources_file(path: impl AsRef<Path>) -> Result<Self> {
        let configs = load_sources(path)?;
        Self::from_listing_configs(configs)
    }

    /// Register an adapter. Source ids must be unique.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) -> Result<()> {
        let id = adapter.source_id();
        if id.trim().is_empty() {
            bail!("Source adapter with empty id");
        }
        if self.get(id).is_some() {
            return Err(anyhow!("Source already registered: {}", id));
        }

        info!("Registering source: {} ({})", id, adapter.source_name());
        self.adapters.push(adapter);
        Ok(())
    }

    pub fn get(&self, source_id: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.source_id() == source_id)
            .cloned()
    }

    /// Adapters in registration order
    pub fn adapters(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.adapters
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.source_id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Read a JSON array of [`ListingSourceConfig`]
pub fn load_sources(path: impl AsRef<Path>) -> Result<Vec<ListingSourceConfig>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sources file {}", path.display()))?;
    let configs: Vec<ListingSourceConfig> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse sources file {}", path.display()))?;

    if configs.is_empty() {
        warn!("Sources file {} defines no sources", path.display());
    }
    Ok(configs)
}
