//! Configuration for price_worker_rust

use anyhow::{anyhow, Result};
use goldbar_rust_core::{Backoff, OrchestratorConfig, RedisCacheConfig, RetryPolicy};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Highest accepted `ADAPTER_MAX_ATTEMPTS`
pub const MAX_ADAPTER_ATTEMPTS: u32 = 20;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    // Identity
    pub worker_id: String,

    // Redis
    pub redis_url: String,
    pub snapshot_ttl_secs: u64,
    pub update_lock_ttl_secs: u64,

    // Scheduling
    pub update_interval_secs: u64,
    pub run_on_startup: bool,

    // Sources
    pub sources_file: PathBuf,
    pub orchestrator: OrchestratorConfig,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        let redis_url = env::var("REDIS_URL").map_err(|_| anyhow!("REDIS_URL must be set"))?;

        let update_interval_secs = parse_u64("PRICE_UPDATE_INTERVAL_SECS", 900)?;
        let snapshot_ttl_secs = parse_u64("SNAPSHOT_TTL_SECS", 3600)?;
        let update_lock_ttl_secs = parse_u64("UPDATE_LOCK_TTL_SECS", 300)?;

        if update_interval_secs == 0 {
            return Err(anyhow!("PRICE_UPDATE_INTERVAL_SECS must be > 0"));
        }

        let orchestrator = orchestrator_config(AdapterSettings {
            timeout_secs: parse_u64("ADAPTER_TIMEOUT_SECS", 25)?,
            max_attempts: parse_u32("ADAPTER_MAX_ATTEMPTS", 3)?,
            backoff: env::var("ADAPTER_BACKOFF").unwrap_or_else(|_| "linear".to_string()),
            backoff_base_ms: parse_u64("ADAPTER_BACKOFF_BASE_MS", 5000)?,
            backoff_max_ms: parse_u64("ADAPTER_BACKOFF_MAX_MS", 30000)?,
            jitter_pct: parse_f64("ADAPTER_BACKOFF_JITTER_PCT", 0.1)?,
        })?;

        // Worst case for one source: every attempt times out plus all backoff
        let worst_case = worst_case_run(&orchestrator);
        if update_lock_ttl_secs < worst_case.as_secs() {
            return Err(anyhow!(
                "UPDATE_LOCK_TTL_SECS ({}) must cover a full run ({}s)",
                update_lock_ttl_secs,
                worst_case.as_secs()
            ));
        }

        Ok(Self {
            worker_id: env::var("WORKER_ID").unwrap_or_else(|_| default_worker_id()),
            redis_url,
            snapshot_ttl_secs,
            update_lock_ttl_secs,
            update_interval_secs,
            run_on_startup: parse_bool("RUN_ON_STARTUP", true)?,
            sources_file: env::var("PRICE_SOURCES_FILE")
                .unwrap_or_else(|_| "sources.json".to_string())
                .into(),
            orchestrator,
        })
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn cache_config(&self) -> RedisCacheConfig {
        RedisCacheConfig {
            url: self.redis_url.clone(),
            holder_id: self.worker_id.clone(),
            snapshot_ttl: Duration::from_secs(self.snapshot_ttl_secs),
            lock_ttl: Duration::from_secs(self.update_lock_ttl_secs),
        }
    }
}

/// Raw adapter settings as read from the environment
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff: String,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub jitter_pct: f64,
}

/// Validate adapter settings and turn them into an orchestrator config
pub fn orchestrator_config(settings: AdapterSettings) -> Result<OrchestratorConfig> {
    if settings.timeout_secs == 0 {
        return Err(anyhow!("ADAPTER_TIMEOUT_SECS must be > 0"));
    }
    if !(1..=MAX_ADAPTER_ATTEMPTS).contains(&settings.max_attempts) {
        return Err(anyhow!(
            "ADAPTER_MAX_ATTEMPTS must be between 1 and {}",
            MAX_ADAPTER_ATTEMPTS
        ));
    }
    if !(0.0..=1.0).contains(&settings.jitter_pct) {
        return Err(anyhow!("ADAPTER_BACKOFF_JITTER_PCT must be between 0 and 1"));
    }

    let base = Duration::from_millis(settings.backoff_base_ms);
    let max = Duration::from_millis(settings.backoff_max_ms);
    let backoff = Backoff::from_name(&settings.backoff, base, max).ok_or_else(|| {
        anyhow!(
            "ADAPTER_BACKOFF must be one of linear, exponential, none (got {:?})",
            settings.backoff
        )
    })?;
    match backoff {
        Backoff::Linear { .. } | Backoff::Exponential { .. } if base.is_zero() => {
            return Err(anyhow!("ADAPTER_BACKOFF_BASE_MS must be > 0"));
        }
        Backoff::Exponential { .. } if max < base => {
            return Err(anyhow!("ADAPTER_BACKOFF_MAX_MS must be >= ADAPTER_BACKOFF_BASE_MS"));
        }
        _ => {}
    }

    Ok(OrchestratorConfig {
        attempt_timeout: Duration::from_secs(settings.timeout_secs),
        retry: RetryPolicy::new(settings.max_attempts, backoff).with_jitter(settings.jitter_pct),
    })
}

/// Upper bound on one source's time in a run, saturating at `Duration::MAX`
pub fn worst_case_run(config: &OrchestratorConfig) -> Duration {
    let attempts = config.retry.max_attempts.clamp(1, MAX_ADAPTER_ATTEMPTS);
    let timeouts = config
        .attempt_timeout
        .checked_mul(attempts)
        .unwrap_or(Duration::MAX);
    let backoff = (1..attempts)
        .map(|attempt| config.retry.backoff.delay(attempt))
        .fold(Duration::ZERO, Duration::saturating_add);
    // Jitter can stretch each delay by up to jitter_pct
    let stretched = Duration::try_from_secs_f64(backoff.as_secs_f64() * (1.0 + config.retry.jitter_pct))
        .unwrap_or(Duration::MAX);
    timeouts.saturating_add(stretched)
}

fn default_worker_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "price-worker".to_string());
    format!("{}-{}", host, std::process::id())
}

/// Parse environment variable as u64 with default fallback
fn parse_u64(var_name: &str, default: u64) -> Result<u64> {
    match env::var(var_name) {
        Ok(val) => val.trim().parse().map_err(|_| anyhow!("{} must be a valid u64", var_name)),
        Err(_) => Ok(default),
    }
}

/// Parse environment variable as u32 with default fallback
fn parse_u32(var_name: &str, default: u32) -> Result<u32> {
    match env::var(var_name) {
        Ok(val) => val.trim().parse().map_err(|_| anyhow!("{} must be a valid u32", var_name)),
        Err(_) => Ok(default),
    }
}

/// Parse environment variable as f64 with default fallback
fn parse_f64(var_name: &str, default: f64) -> Result<f64> {
    match env::var(var_name) {
        Ok(val) => val
            .trim()
            .parse()
            .ok()
            .filter(|v: &f64| v.is_finite())
            .ok_or_else(|| anyhow!("{} must be a valid number", var_name)),
        Err(_) => Ok(default),
    }
}

fn parse_bool(var_name: &str, default: bool) -> Result<bool> {
    match env::var(var_name) {
        Ok(val) => match val.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(anyhow!("{} must be a boolean", var_name)),
        },
        Err(_) => Ok(default),
    }
}
