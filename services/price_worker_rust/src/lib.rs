//! Price worker: schedules gold bar price updates and answers manual
//! update requests.

pub mod config;
pub mod scheduler;
pub mod triggers;

pub use config::WorkerConfig;
pub use scheduler::{Scheduler, Trigger};
pub use triggers::{OutcomePublisher, OutcomeStatus, RedisOutcomePublisher, UpdateOutcome, UpdateRequest};
