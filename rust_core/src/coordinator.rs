//! Update Coordinator
//!
//! Runs the whole pipeline (extract → normalize → aggregate → persist) at most
//! once at a time. Two guards must be taken before a run starts:
//! 1. an in-process flag, so concurrent triggers in this process are rejected
//!    without touching the cache
//! 2. the cache's persisted updating flag, so other instances (or this one
//!    after a restart) see the run too
//!
//! Both are released on every exit path. A failed run never touches the
//! stored snapshot, so readers keep getting the last good data.

use crate::adapters::AdapterRegistry;
use crate::aggregator::aggregate;
use crate::cache::SnapshotCache;
use crate::error::CoordinatorError;
use crate::models::{AggregationSnapshot, ServerId};
use crate::orchestrator::ExtractionOrchestrator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Summary of one completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub succeeded: usize,
    pub failed: usize,
    /// Servers with at least one offer
    pub servers: usize,
    pub last_update: DateTime<Utc>,
    pub duration: Duration,
}

/// Clears the in-process flag when dropped
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct UpdateCoordinator {
    orchestrator: ExtractionOrchestrator,
    registry: AdapterRegistry,
    cache: Arc<dyn SnapshotCache>,
    known_servers: Vec<ServerId>,
    running: AtomicBool,
}

impl UpdateCoordinator {
    pub fn new(
        orchestrator: ExtractionOrchestrator,
        registry: AdapterRegistry,
        cache: Arc<dyn SnapshotCache>,
    ) -> Self {
        Self {
            orchestrator,
            registry,
            cache,
            known_servers: ServerId::ALL.to_vec(),
            running: AtomicBool::new(false),
        }
    }

    /// Restrict aggregation to a subset of servers
    pub fn with_known_servers(mut self, servers: Vec<ServerId>) -> Self {
        self.known_servers = servers;
        self
    }

    /// Whether this instance is currently running an update
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn cache(&self) -> &Arc<dyn SnapshotCache> {
        &self.cache
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Run one update.
    ///
    /// # Errors
    /// * `Busy` - another run holds either guard; nothing was done
    /// * `NoSuccessfulSources` - every source failed; previous snapshot kept
    /// * `CacheIo` - the flag or snapshot could not be written; previous
    ///   snapshot kept
    pub async fn run(&self) -> Result<RunReport, CoordinatorError> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            warn!("Update rejected: a run is already active in this process");
            return Err(CoordinatorError::Busy);
        };

        if !self.cache.set_updating(true).await? {
            warn!("Update rejected: updating flag held by another instance");
            return Err(CoordinatorError::Busy);
        }

        let run_id = Uuid::new_v4();
        let outcome = self.execute(run_id).await;

        // Reset regardless of outcome; a lost reset still expires with the lease
        if let Err(e) = self.cache.set_updating(false).await {
            error!(%run_id, "Failed to clear updating flag: {}", e);
        }

        match &outcome {
            Ok(report) => info!(
                %run_id,
                succeeded = report.succeeded,
                failed = report.failed,
                servers = report.servers,
                "Price update completed in {:.1}s",
                report.duration.as_secs_f64()
            ),
            Err(e) => error!(%run_id, "Price update failed, keeping previous snapshot: {}", e),
        }

        outcome
    }

    async fn execute(&self, run_id: Uuid) -> Result<RunReport, CoordinatorError> {
        let started = Instant::now();
        info!(%run_id, sources = self.registry.len(), "Price update started");

        let results = self.orchestrator.run(self.registry.adapters()).await;
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let failed = results.len() - succeeded;

        if succeeded == 0 {
            return Err(CoordinatorError::NoSuccessfulSources { failed });
        }
        if failed > 0 {
            warn!(%run_id, failed, "Degraded run: some sources failed");
        }

        let best_by_server = aggregate(&results, &self.known_servers);
        let servers = best_by_server.len();
        let snapshot = AggregationSnapshot::from_run(results, best_by_server);
        self.cache.set(&snapshot).await?;

        Ok(RunReport {
            run_id,
            succeeded,
            failed,
            servers,
            last_update: snapshot.last_update.unwrap_or_else(Utc::now),
            duration: started.elapsed(),
        })
    }
}
