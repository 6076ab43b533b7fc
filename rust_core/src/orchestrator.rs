//! Extraction Orchestrator
//!
//! Fans out every registered adapter into its own task and waits for all of
//! them. Inside an adapter's task the retry combinator drives attempts; each
//! attempt is spawned again so a hung or panicking `extract` can be cut off
//! with `abort()` without the adapter's cooperation.
//!
//! Nothing an adapter does can fail the run: every outcome ends as a
//! [`SourceResult`], and results come back in registration order.

use crate::adapters::SourceAdapter;
use crate::error::AdapterError;
use crate::models::{NormalizedProduct, SourceResult, SourceStatus};
use crate::normalizer::normalize_all;
use crate::retry::{retry_with_backoff, RetryPolicy};
use futures_util::future::join_all;
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

/// Per-attempt timeout and retry schedule
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub attempt_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(25),
            retry: RetryPolicy::default(),
        }
    }
}

pub struct ExtractionOrchestrator {
    config: OrchestratorConfig,
}

impl ExtractionOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run every adapter to a terminal outcome.
    ///
    /// Returns one `SourceResult` per adapter, in the order of `adapters`.
    pub async fn run(&self, adapters: &[Arc<dyn SourceAdapter>]) -> Vec<SourceResult> {
        let started = Instant::now();
        info!("Starting extraction across {} sources", adapters.len());

        let handles: Vec<_> = adapters
            .iter()
            .map(|adapter| {
                let adapter = Arc::clone(adapter);
                let config = self.config.clone();
                tokio::spawn(async move { run_adapter(adapter, config).await })
            })
            .collect();

        let joined = join_all(handles).await;

        let results: Vec<SourceResult> = adapters
            .iter()
            .zip(joined)
            .map(|(adapter, outcome)| match outcome {
                Ok(result) => result,
                Err(e) => {
                    warn!(source = adapter.source_id(), "Adapter task failed: {}", e);
                    SourceResult::failure(
                        adapter.source_id(),
                        adapter.source_name(),
                        AdapterError::Panicked(join_error_message(e)).to_string(),
                        0,
                    )
                }
            })
            .collect();

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(
            succeeded,
            failed = results.len() - succeeded,
            "Extraction finished in {:.1}s",
            started.elapsed().as_secs_f64()
        );

        results
    }
}

/// Drive one adapter through its retry budget
async fn run_adapter(adapter: Arc<dyn SourceAdapter>, config: OrchestratorConfig) -> SourceResult {
    let source_id = adapter.source_id().to_string();
    let timeout = config.attempt_timeout;

    let outcome = retry_with_backoff(&config.retry, &source_id, |attempt| {
        let adapter = Arc::clone(&adapter);
        async move {
            debug!(source = adapter.source_id(), attempt, "Starting attempt");
            run_attempt(adapter, timeout).await
        }
    })
    .await;

    match outcome.result {
        Ok(products) => {
            info!(
                source = %source_id,
                attempts = outcome.attempts,
                products = products.len(),
                "Source extracted"
            );
            SourceResult::success(source_id, adapter.source_name(), products, outcome.attempts)
        }
        Err(e) => {
            warn!(
                source = %source_id,
                attempts = outcome.attempts,
                error = %e,
                "Source failed"
            );
            SourceResult::failure(source_id, adapter.source_name(), e.to_string(), outcome.attempts)
        }
    }
}

/// One attempt in a fresh task, cut off after `timeout`
async fn run_attempt(
    adapter: Arc<dyn SourceAdapter>,
    timeout: Duration,
) -> Result<Vec<NormalizedProduct>, AdapterError> {
    let mut handle = tokio::spawn(async move { adapter.extract().await });

    let extraction = match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(result)) => result?,
        Ok(Err(e)) => return Err(AdapterError::Panicked(join_error_message(e))),
        Err(_) => {
            // Dropping the task releases whatever the attempt was holding
            handle.abort();
            return Err(AdapterError::Timeout(timeout));
        }
    };

    if extraction.status == SourceStatus::Error {
        let message = extraction
            .error
            .unwrap_or_else(|| "source reported an error".to_string());
        return Err(AdapterError::Reported(message));
    }

    if extraction.products.is_empty() {
        return Err(AdapterError::Parse("no records extracted".to_string()));
    }

    let products = normalize_all(&extraction.products);
    if products.is_empty() {
        return Err(AdapterError::Parse(format!(
            "all {} records dropped by normalization",
            extraction.products.len()
        )));
    }

    Ok(products)
}

fn join_error_message(e: JoinError) -> String {
    if e.is_cancelled() {
        return "task cancelled".to_string();
    }
    panic_message(e.into_panic())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Extraction;
    use crate::models::{RawProductRecord, RawUnit, ServerId};
    use crate::retry::Backoff;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    fn record(server: &str, buy: &str) -> RawProductRecord {
        RawProductRecord {
            server: server.to_string(),
            raw_buy_price: buy.to_string(),
            raw_sell_price: None,
            raw_unit: RawUnit::TenMillion,
            source_id: "test".to_string(),
        }
    }

    fn config(max_attempts: u32) -> OrchestratorConfig {
        OrchestratorConfig {
            attempt_timeout: Duration::from_secs(25),
            retry: RetryPolicy::new(
                max_attempts,
                Backoff::Linear {
                    step: Duration::from_secs(5),
                },
            ),
        }
    }

    /// Plays back one scripted outcome per attempt; the last one repeats
    struct Scripted {
        id: &'static str,
        script: Vec<Result<Extraction, AdapterError>>,
        calls: AtomicU32,
        delay: Duration,
        started_at: Mutex<Vec<tokio::time::Instant>>,
    }

    impl Scripted {
        fn new(id: &'static str, script: Vec<Result<Extraction, AdapterError>>) -> Arc<Self> {
            Self::delayed(id, Duration::ZERO, script)
        }

        fn delayed(
            id: &'static str,
            delay: Duration,
            script: Vec<Result<Extraction, AdapterError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                id,
                script,
                calls: AtomicU32::new(0),
                delay,
                started_at: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SourceAdapter for Scripted {
        fn source_id(&self) -> &str {
            self.id
        }

        fn source_name(&self) -> &str {
            self.id
        }

        async fn extract(&self) -> Result<Extraction, AdapterError> {
            self.started_at.lock().unwrap().push(tokio::time::Instant::now());
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let step = call.min(self.script.len() - 1);
            self.script[step].clone()
        }
    }

    /// Never completes; flips `released` when its attempt is dropped
    struct Hanging {
        calls: AtomicU32,
        released: Arc<AtomicBool>,
    }

    struct ReleaseOnDrop(Arc<AtomicBool>);

    impl Drop for ReleaseOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl SourceAdapter for Hanging {
        fn source_id(&self) -> &str {
            "hanging"
        }

        fn source_name(&self) -> &str {
            "Hanging"
        }

        async fn extract(&self) -> Result<Extraction, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _guard = ReleaseOnDrop(self.released.clone());
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    struct Panicking;

    #[async_trait]
    impl SourceAdapter for Panicking {
        fn source_id(&self) -> &str {
            "panicking"
        }

        fn source_name(&self) -> &str {
            "Panicking"
        }

        async fn extract(&self) -> Result<Extraction, AdapterError> {
            panic!("selector blew up");
        }
    }

    fn ok(records: Vec<RawProductRecord>) -> Result<Extraction, AdapterError> {
        Ok(Extraction::success(records))
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_adapter_does_not_hold_back_others() {
        let released = Arc::new(AtomicBool::new(false));
        let hanging = Arc::new(Hanging {
            calls: AtomicU32::new(0),
            released: released.clone(),
        });
        let fast = Scripted::new("fast", vec![ok(vec![record("Zero", "28.4")])]);
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![hanging.clone(), fast.clone()];

        let started = tokio::time::Instant::now();
        let results = ExtractionOrchestrator::new(config(3)).run(&adapters).await;

        // Fast source ran immediately, not after the hung one
        assert_eq!(fast.started_at.lock().unwrap()[0], started);
        assert!(results[1].is_success());
        assert_eq!(results[1].products[0].buy_price_per_gb, 2.84);

        // Three timed-out attempts with 5s and 10s backoff in between
        assert_eq!(hanging.calls.load(Ordering::SeqCst), 3);
        assert_eq!(results[0].status, SourceStatus::Error);
        assert_eq!(results[0].attempts, 3);
        assert!(results[0].error.as_deref().unwrap().contains("timed out"));
        assert_eq!(started.elapsed(), Duration::from_secs(25 * 3 + 5 + 10));

        tokio::task::yield_now().await;
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let flaky = Scripted::new(
            "flaky",
            vec![
                Ok(Extraction::error("captcha page")),
                ok(Vec::new()),
                ok(vec![record("Felis", "17.5"), record("Destan", "37")]),
            ],
        );
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![flaky.clone()];

        let results = ExtractionOrchestrator::new(config(3)).run(&adapters).await;

        assert!(results[0].is_success());
        assert_eq!(results[0].attempts, 3);
        assert_eq!(results[0].products.len(), 2);
        assert_eq!(flaky.calls(), 3);

        let starts = flaky.started_at.lock().unwrap();
        assert_eq!(starts[1] - starts[0], Duration::from_secs(5));
        assert_eq!(starts[2] - starts[1], Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_carries_last_message() {
        let blocked = Scripted::new(
            "blocked",
            vec![
                Ok(Extraction::error("first")),
                Ok(Extraction::error("second")),
                Ok(Extraction::error("Cloudflare challenge")),
            ],
        );
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![blocked];

        let results = ExtractionOrchestrator::new(config(3)).run(&adapters).await;

        assert_eq!(results[0].status, SourceStatus::Error);
        assert_eq!(results[0].error.as_deref(), Some("Cloudflare challenge"));
        assert!(results[0].products.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let gone = Scripted::new("gone", vec![Err(AdapterError::Fatal("HTTP 404 Not Found".into()))]);
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![gone.clone()];

        let results = ExtractionOrchestrator::new(config(3)).run(&adapters).await;

        assert_eq!(gone.calls(), 1);
        assert_eq!(results[0].attempts, 1);
        assert!(!results[0].is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_records_dropped_is_parse_error() {
        let junk = Scripted::new("junk", vec![ok(vec![record("Ares", "28.4"), record("Zero", "yok")])]);
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![junk.clone()];

        let results = ExtractionOrchestrator::new(config(2)).run(&adapters).await;

        assert_eq!(junk.calls(), 2);
        assert!(results[0].error.as_deref().unwrap().contains("dropped by normalization"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_adapter_becomes_error_result() {
        let healthy = Scripted::new("healthy", vec![ok(vec![record("Zero", "28.4")])]);
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(Panicking), healthy];

        let results = ExtractionOrchestrator::new(config(2)).run(&adapters).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source_id, "panicking");
        assert_eq!(results[0].attempts, 2);
        assert!(results[0].error.as_deref().unwrap().contains("selector blew up"));
        assert!(results[1].is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_follow_registration_order() {
        let slow = Scripted::delayed("slow", Duration::from_secs(10), vec![ok(vec![record("Zero", "28.4")])]);
        let medium = Scripted::delayed("medium", Duration::from_secs(5), vec![ok(vec![record("Zero", "28.5")])]);
        let quick = Scripted::new("quick", vec![ok(vec![record("Zero", "28.0")])]);
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![slow, medium, quick];

        let results = ExtractionOrchestrator::new(config(1)).run(&adapters).await;

        let ids: Vec<&str> = results.iter().map(|r| r.source_id.as_str()).collect();
        assert_eq!(ids, vec!["slow", "medium", "quick"]);
    }

    #[tokio::test]
    async fn test_no_adapters() {
        let results = ExtractionOrchestrator::new(config(3)).run(&[]).await;
        assert!(results.is_empty());
    }
}
