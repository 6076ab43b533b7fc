//! On-demand update triggers over Redis pub/sub
//!
//! Requests arrive on `prices:update:requests`; every request gets exactly
//! one outcome on `prices:update:results`, rejections included. The
//! subscription reconnects on its own with exponential backoff.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use goldbar_rust_core::channels;
use goldbar_rust_core::{Backoff, CoordinatorError, RetryPolicy, RunReport};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Manual update request. Every field is optional; an empty or non-JSON
/// payload is still a valid request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub requested_by: Option<String>,
}

impl UpdateRequest {
    pub fn from_payload(payload: &str) -> Self {
        serde_json::from_str(payload).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Completed,
    Rejected,
    Failed,
}

/// Published once per manual request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub request_id: Option<String>,
    pub worker_id: String,
    pub status: OutcomeStatus,
    pub report: Option<RunReport>,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

impl UpdateOutcome {
    pub fn from_run(
        request: &UpdateRequest,
        worker_id: &str,
        result: &Result<RunReport, CoordinatorError>,
    ) -> Self {
        let (status, report, error) = match result {
            Ok(report) => (OutcomeStatus::Completed, Some(report.clone()), None),
            Err(e) if e.is_busy() => (OutcomeStatus::Rejected, None, Some(e.to_string())),
            Err(e) => (OutcomeStatus::Failed, None, Some(e.to_string())),
        };

        Self {
            request_id: request.request_id.clone(),
            worker_id: worker_id.to_string(),
            status,
            report,
            error,
            at: Utc::now(),
        }
    }
}

/// Where manual-request outcomes go
#[async_trait]
pub trait OutcomePublisher: Send + Sync {
    async fn publish(&self, outcome: &UpdateOutcome) -> Result<()>;
}

#[derive(Clone)]
pub struct RedisOutcomePublisher {
    conn: MultiplexedConnection,
}

impl RedisOutcomePublisher {
    pub async fn connect(client: &Client) -> Result<Self> {
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to open Redis publish connection")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl OutcomePublisher for RedisOutcomePublisher {
    async fn publish(&self, outcome: &UpdateOutcome) -> Result<()> {
        let payload = serde_json::to_string(outcome)?;
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channels::UPDATE_RESULTS, payload)
            .await
            .context("Failed to publish update outcome")?;
        Ok(())
    }
}

/// Subscribe to update requests, forwarding them into a channel.
///
/// The listener task lives until the receiver is dropped.
pub fn listen_for_requests(client: Client) -> mpsc::Receiver<UpdateRequest> {
    let (sender, receiver) = mpsc::channel(16);
    tokio::spawn(async move {
        subscription_loop(client, sender).await;
    });
    receiver
}

async fn subscription_loop(client: Client, sender: mpsc::Sender<UpdateRequest>) {
    let reconnect = RetryPolicy::new(
        u32::MAX,
        Backoff::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
        },
    )
    .with_jitter(0.1);
    let mut failures: u32 = 0;

    loop {
        match subscribe(&client).await {
            Ok(pubsub) => {
                failures = 0;
                info!("Listening for update requests on {}", channels::UPDATE_REQUESTS);

                let mut pubsub = pubsub;
                let mut messages = pubsub.on_message();
                while let Some(msg) = messages.next().await {
                    let payload: String = msg.get_payload().unwrap_or_default();
                    let request = UpdateRequest::from_payload(&payload);
                    if sender.send(request).await.is_err() {
                        info!("Request receiver dropped, stopping listener");
                        return;
                    }
                }

                warn!("Update request subscription ended, reconnecting...");
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                let delay = reconnect.delay_for(failures);
                error!(
                    "Failed to subscribe (attempt {}): {}. Retrying in {:?}...",
                    failures, e, delay
                );
                tokio::time::sleep(delay).await;
            }
        }

        if sender.is_closed() {
            return;
        }
    }
}

async fn subscribe(client: &Client) -> Result<redis::aio::PubSub> {
    let conn = client
        .get_async_connection()
        .await
        .context("Failed to get async Redis connection")?;
    let mut pubsub = conn.into_pubsub();
    pubsub
        .subscribe(channels::UPDATE_REQUESTS)
        .await
        .with_context(|| format!("Failed to subscribe to channel: {}", channels::UPDATE_REQUESTS))?;
    Ok(pubsub)
}
