//! Error taxonomy for the extraction pipeline
//!
//! Adapter errors never leave the orchestrator: they end up as the `error`
//! message of a failed `SourceResult`. Coordinator errors are returned to the
//! caller that triggered the run.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single adapter attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Page fetched but produced no usable records
    #[error("parse error: {0}")]
    Parse(String),

    /// Unrecoverable network/transport failure
    #[error("fatal error: {0}")]
    Fatal(String),

    /// Adapter completed but reported `status: error` itself
    #[error("{0}")]
    Reported(String),

    #[error("adapter task panicked: {0}")]
    Panicked(String),
}

impl AdapterError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retriable(&self) -> bool {
        !matches!(self, AdapterError::Fatal(_))
    }
}

/// Failure of the persistence layer
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(String),

    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Io(e.to_string())
    }
}

/// Failure of a whole run, as seen by whoever triggered it
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Another run holds the update flag; the trigger was rejected
    #[error("price update already in progress")]
    Busy,

    #[error(transparent)]
    CacheIo(#[from] CacheError),

    #[error("no source produced prices ({failed} failed)")]
    NoSuccessfulSources { failed: usize },
}

impl CoordinatorError {
    pub fn is_busy(&self) -> bool {
        matches!(self, CoordinatorError::Busy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_is_not_retriable() {
        assert!(!AdapterError::Fatal("dns failure".into()).is_retriable());
        assert!(AdapterError::Timeout(Duration::from_secs(25)).is_retriable());
        assert!(AdapterError::Parse("no records".into()).is_retriable());
        assert!(AdapterError::Reported("blocked".into()).is_retriable());
        assert!(AdapterError::Panicked("boom".into()).is_retriable());
    }

    #[test]
    fn test_messages_are_readable() {
        let err = AdapterError::Timeout(Duration::from_secs(25));
        assert_eq!(err.to_string(), "attempt timed out after 25s");
        let err = CoordinatorError::NoSuccessfulSources { failed: 5 };
        assert_eq!(err.to_string(), "no source produced prices (5 failed)");
    }
}
