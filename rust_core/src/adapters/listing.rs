//! Generic listing-page adapter
//!
//! Most marketplaces render gold bar offers as a plain HTML product list.
//! Instead of one hand-written scraper per site, a [`ListingSourceConfig`]
//! describes the page: its URL, the unit it quotes in, and a regex whose named
//! groups pick out one offer per match:
//! - `server` (required): listing title or server name
//! - `buy` (required): buy price text
//! - `sell` (optional): sell price text
//! - `unit` (optional): unit text overriding `default_unit` ("10M", "1 GB")

use super::{Extraction, SourceAdapter};
use crate::error::AdapterError;
use crate::models::{RawProductRecord, RawUnit};
use anyhow::bail;
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, PRAGMA, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Capture groups every item pattern must define
const REQUIRED_GROUPS: [&str; 2] = ["server", "buy"];

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Declarative description of one marketplace listing page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSourceConfig {
    pub id: String,
    pub name: String,
    pub url: String,
    pub default_unit: RawUnit,
    pub item_pattern: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Connect timeout for the page request; the orchestrator's attempt timeout
    /// still bounds the whole attempt
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// Adapter driven by a [`ListingSourceConfig`]
pub struct ListingPageAdapter {
    config: ListingSourceConfig,
    item_pattern: Regex,
    markup: Regex,
}

impl ListingPageAdapter {
    pub fn new(config: ListingSourceConfig) -> anyhow::Result<Self> {
        let item_pattern = Regex::new(&config.item_pattern)?;
        for group in REQUIRED_GROUPS {
            if !item_pattern.capture_names().flatten().any(|name| name == group) {
                bail!("item_pattern has no named group `{}`", group);
            }
        }
        let markup = Regex::new(r"<[^>]*>|&nbsp;")?;
        Ok(Self {
            config,
            item_pattern,
            markup,
        })
    }

    pub fn config(&self) -> &ListingSourceConfig {
        &self.config
    }

    /// Extract raw records from page markup
    pub fn parse_page(&self, html: &str) -> Vec<RawProductRecord> {
        self.item_pattern
            .captures_iter(html)
            .filter_map(|caps| {
                let server = self.clean(caps.name("server")?.as_str());
                let raw_buy_price = self.clean(caps.name("buy")?.as_str());
                let raw_sell_price = caps
                    .name("sell")
                    .map(|m| self.clean(m.as_str()))
                    .filter(|s| !s.is_empty());
                let raw_unit = caps
                    .name("unit")
                    .and_then(|m| RawUnit::parse(&self.clean(m.as_str())))
                    .unwrap_or(self.config.default_unit);

                Some(RawProductRecord {
                    server,
                    raw_buy_price,
                    raw_sell_price,
                    raw_unit,
                    source_id: self.config.id.clone(),
                })
            })
            .collect()
    }

    fn clean(&self, text: &str) -> String {
        self.markup
            .replace_all(text, " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let agent = self
            .config
            .user_agent
            .as_deref()
            .unwrap_or(DEFAULT_USER_AGENT);
        if let Ok(value) = HeaderValue::from_str(agent) {
            headers.insert(USER_AGENT, value);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("tr-TR,tr;q=0.9,en;q=0.8"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        headers
    }
}

/// Classify an HTTP status: client errors (bar rate limiting) will not fix themselves
fn status_error(status: StatusCode) -> AdapterError {
    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        AdapterError::Fatal(format!("HTTP {}", status))
    } else {
        AdapterError::Reported(format!("HTTP {}", status))
    }
}

#[async_trait]
impl SourceAdapter for ListingPageAdapter {
    fn source_id(&self) -> &str {
        &self.config.id
    }

    fn source_name(&self) -> &str {
        &self.config.name
    }

    async fn extract(&self) -> Result<Extraction, AdapterError> {
        // Fresh client per attempt: nothing survives a cancelled attempt
        let client = reqwest::Client::builder()
            .default_headers(self.headers())
            .connect_timeout(Duration::from_secs(self.config.connect_timeout_secs))
            .gzip(true)
            .build()
            .map_err(|e| AdapterError::Fatal(format!("Failed to build HTTP client: {}", e)))?;

        let response = client
            .get(&self.config.url)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    AdapterError::Fatal(format!("Invalid request for {}: {}", self.config.url, e))
                } else {
                    AdapterError::Reported(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        let html = response
            .text()
            .await
            .map_err(|e| AdapterError::Reported(format!("Failed to read body: {}", e)))?;

        let products = self.parse_page(&html);
        debug!(
            source = %self.config.id,
            bytes = html.len(),
            records = products.len(),
            "Parsed listing page"
        );

        if products.is_empty() {
            return Err(AdapterError::Parse("no listing matched item_pattern".to_string()));
        }

        Ok(Extraction::success(products))
    }
}
