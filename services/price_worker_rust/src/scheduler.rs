//! Update scheduler
//!
//! Turns three kinds of trigger into coordinator runs: one at startup, one per
//! interval tick, and one per manual request. Every run is spawned, so a
//! trigger that arrives mid-run reaches the coordinator immediately and is
//! rejected there instead of being queued behind the active run.

use crate::triggers::{OutcomePublisher, UpdateOutcome, UpdateRequest};
use goldbar_rust_core::UpdateCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub enum Trigger {
    Startup,
    Interval,
    Manual(UpdateRequest),
}

impl Trigger {
    fn label(&self) -> &'static str {
        match self {
            Trigger::Startup => "startup",
            Trigger::Interval => "interval",
            Trigger::Manual(_) => "manual",
        }
    }
}

pub struct Scheduler {
    coordinator: Arc<UpdateCoordinator>,
    publisher: Arc<dyn OutcomePublisher>,
    worker_id: String,
    interval: Duration,
    run_on_startup: bool,
}

impl Scheduler {
    pub fn new(
        coordinator: Arc<UpdateCoordinator>,
        publisher: Arc<dyn OutcomePublisher>,
        worker_id: impl Into<String>,
        interval: Duration,
        run_on_startup: bool,
    ) -> Self {
        Self {
            coordinator,
            publisher,
            worker_id: worker_id.into(),
            interval,
            run_on_startup,
        }
    }

    /// Serve triggers until `shutdown` flips to true, then wait for any run
    /// still in flight so its flag reset is not lost.
    pub async fn run(self, mut requests: mpsc::Receiver<UpdateRequest>, mut shutdown: watch::Receiver<bool>) {
        let mut runs = JoinSet::new();

        // First tick one full period out; the startup run covers "now"
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Scheduler started (interval: {}s, run on startup: {})",
            self.interval.as_secs(),
            self.run_on_startup
        );

        if self.run_on_startup {
            self.dispatch(&mut runs, Trigger::Startup);
        }

        let mut requests_open = true;
        loop {
            tokio::select! {
                _ = ticker.tick() => self.dispatch(&mut runs, Trigger::Interval),
                request = requests.recv(), if requests_open => match request {
                    Some(request) => self.dispatch(&mut runs, Trigger::Manual(request)),
                    None => {
                        warn!("Update request channel closed; continuing on interval only");
                        requests_open = false;
                    }
                },
                Some(joined) = runs.join_next(), if !runs.is_empty() => {
                    if let Err(e) = joined {
                        error!("Update task failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Scheduler stopping, waiting for {} in-flight run(s)", runs.len());
        while runs.join_next().await.is_some() {}
    }

    fn dispatch(&self, runs: &mut JoinSet<()>, trigger: Trigger) {
        let coordinator = Arc::clone(&self.coordinator);
        let publisher = Arc::clone(&self.publisher);
        let worker_id = self.worker_id.clone();

        debug!(trigger = trigger.label(), "Dispatching update");
        runs.spawn(async move {
            let result = coordinator.run().await;

            match trigger {
                Trigger::Manual(request) => {
                    let outcome = UpdateOutcome::from_run(&request, &worker_id, &result);
                    if let Err(e) = publisher.publish(&outcome).await {
                        error!("Failed to publish outcome for manual update: {}", e);
                    }
                }
                other => {
                    if let Err(e) = result {
                        if e.is_busy() {
                            info!(trigger = other.label(), "Skipped: previous update still running");
                        }
                        // Other failures are already logged by the coordinator
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triggers::OutcomeStatus;
    use async_trait::async_trait;
    use goldbar_rust_core::{
        AdapterError, AdapterRegistry, Backoff, Extraction, ExtractionOrchestrator, InMemorySnapshotCache,
        OrchestratorConfig, RawProductRecord, RawUnit, RetryPolicy, SnapshotCache, SourceAdapter,
    };
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    struct SlowMarket {
        calls: Arc<AtomicU32>,
        delay: Duration,
    }

    #[async_trait]
    impl SourceAdapter for SlowMarket {
        fn source_id(&self) -> &str {
            "kopazar"
        }

        fn source_name(&self) -> &str {
            "Kopazar"
        }

        async fn extract(&self) -> Result<Extraction, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(Extraction::success(vec![RawProductRecord {
                server: "Zero".to_string(),
                raw_buy_price: "28.4".to_string(),
                raw_sell_price: None,
                raw_unit: RawUnit::TenMillion,
                source_id: "kopazar".to_string(),
            }]))
        }
    }

    #[derive(Default)]
    struct Collected(Mutex<Vec<UpdateOutcome>>);

    #[async_trait]
    impl OutcomePublisher for Collected {
        async fn publish(&self, outcome: &UpdateOutcome) -> anyhow::Result<()> {
            self.0.lock().await.push(outcome.clone());
            Ok(())
        }
    }

    struct Harness {
        calls: Arc<AtomicU32>,
        cache: Arc<InMemorySnapshotCache>,
        published: Arc<Collected>,
        requests: mpsc::Sender<UpdateRequest>,
        shutdown: watch::Sender<bool>,
        handle: tokio::task::JoinHandle<()>,
    }

    fn start(run_on_startup: bool, extract_delay: Duration) -> Harness {
        let calls = Arc::new(AtomicU32::new(0));
        let cache = Arc::new(InMemorySnapshotCache::default());
        let published = Arc::new(Collected::default());

        let mut registry = AdapterRegistry::new();
        registry
            .register(Arc::new(SlowMarket {
                calls: calls.clone(),
                delay: extract_delay,
            }))
            .unwrap();
        let orchestrator = ExtractionOrchestrator::new(OrchestratorConfig {
            // Longer than any extract delay used below
            attempt_timeout: Duration::from_secs(120),
            retry: RetryPolicy::new(1, Backoff::Immediate),
        });
        let coordinator = Arc::new(UpdateCoordinator::new(orchestrator, registry, cache.clone()));

        let scheduler = Scheduler::new(
            coordinator,
            published.clone(),
            "worker-test",
            Duration::from_secs(900),
            run_on_startup,
        );
        let (requests, request_rx) = mpsc::channel(8);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(scheduler.run(request_rx, shutdown_rx));

        Harness {
            calls,
            cache,
            published,
            requests,
            shutdown,
            handle,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_run_then_interval() {
        let harness = start(true, Duration::from_secs(1));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
        assert!(harness.cache.get().await.unwrap().is_some());

        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(harness.calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(harness.calls.load(Ordering::SeqCst), 3);

        harness.shutdown.send(true).unwrap();
        tokio_test::assert_ok!(harness.handle.await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_startup_run_when_disabled() {
        let harness = start(false, Duration::from_secs(1));

        tokio::time::sleep(Duration::from_secs(899)).await;
        assert_eq!(harness.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(harness.calls.load(Ordering::SeqCst), 1);

        harness.shutdown.send(true).unwrap();
        tokio_test::assert_ok!(harness.handle.await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_request_during_run_is_rejected() {
        let harness = start(true, Duration::from_secs(60));

        // Startup run is busy extracting
        tokio::time::sleep(Duration::from_secs(5)).await;
        harness
            .requests
            .send(UpdateRequest {
                request_id: Some("during".to_string()),
                requested_by: None,
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        {
            let published = harness.published.0.lock().await;
            assert_eq!(published.len(), 1);
            assert_eq!(published[0].request_id.as_deref(), Some("during"));
            assert_eq!(published[0].status, OutcomeStatus::Rejected);
        }

        // After the startup run finishes a manual request goes through
        tokio::time::sleep(Duration::from_secs(60)).await;
        harness
            .requests
            .send(UpdateRequest {
                request_id: Some("after".to_string()),
                requested_by: None,
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;

        let published = harness.published.0.lock().await;
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].status, OutcomeStatus::Completed);
        assert_eq!(published[1].report.as_ref().unwrap().succeeded, 1);
        assert_eq!(harness.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_run() {
        let harness = start(true, Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(harness.cache.is_updating().await.unwrap());

        harness.shutdown.send(true).unwrap();
        tokio_test::assert_ok!(harness.handle.await);

        assert!(!harness.cache.is_updating().await.unwrap());
        assert!(harness.cache.get().await.unwrap().is_some());
    }
}
