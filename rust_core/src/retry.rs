//! Retry with backoff for adapter attempts
//!
//! One combinator shared by every source: the orchestrator hands it an
//! attempt closure and a [`RetryPolicy`], and gets back the final result plus
//! the number of attempts spent.

use crate::error::AdapterError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Errors that know whether a retry makes sense
pub trait Retriable {
    fn is_retriable(&self) -> bool;
}

impl Retriable for AdapterError {
    fn is_retriable(&self) -> bool {
        AdapterError::is_retriable(self)
    }
}

/// Delay function between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// No wait between attempts
    Immediate,
    /// `attempt × step` (5s, 10s, 15s, ...)
    Linear { step: Duration },
    /// `base × 2^(attempt-1)`, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Build a schedule from its configured name. `base` is the linear step
    /// or the exponential start. Unknown names give `None`.
    pub fn from_name(name: &str, base: Duration, max: Duration) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "linear" => Some(Backoff::Linear { step: base }),
            "exponential" => Some(Backoff::Exponential { base, max }),
            "none" | "immediate" => Some(Backoff::Immediate),
            _ => None,
        }
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Immediate => Duration::ZERO,
            Backoff::Linear { step } => step.saturating_mul(attempt.max(1)),
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Attempt budget and delay schedule
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1)
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Jitter percentage applied to each delay (0.1 = ±10%)
    pub jitter_pct: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Linear {
                step: Duration::from_millis(5000),
            },
            jitter_pct: 0.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            jitter_pct: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter_pct: f64) -> Self {
        self.jitter_pct = jitter_pct.clamp(0.0, 1.0);
        self
    }

    /// Delay to wait after the given failed attempt, jitter included
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff.delay(attempt);
        if self.jitter_pct <= 0.0 || delay.is_zero() {
            return delay;
        }

        let delay_ms = delay.as_millis() as f64;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * delay_ms * self.jitter_pct;
        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }
}

/// Final result of a retried operation
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails with a non-retriable error, or the
/// attempt budget is spent. `op` receives the 1-based attempt number.
///
/// # Example
/// ```ignore
/// let outcome = retry_with_backoff(&policy, "kopazar", |attempt| async move {
///     fetch_listing(attempt).await
/// })
/// .await;
/// ```
pub async fn retry_with_backoff<F, Fut, T, E>(policy: &RetryPolicy, label: &str, mut op: F) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retriable + std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) if attempt < max_attempts && e.is_retriable() => {
                let delay = policy.delay_for(attempt);
                warn!(
                    source = label,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Attempt failed, retrying in {}ms",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return RetryOutcome {
                    result: Err(e),
                    attempts: attempt,
                }
            }
        }
    }
}
