//! Crate-level error type.
//!
//! Subsystems define their own `thiserror` enums; `MissionError` folds the ones
//! that can escape the supervisor or the runtime.

use thiserror::Error;

use crate::config::ConfigError;
use crate::detection::{ConsistencyViolation, RegistryError};
use crate::planner::PlannerError;

#[derive(Debug, Error)]
pub enum MissionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An already-helped target reappeared as unhelped. Never recoverable.
    #[error("Consistency violation: {0}")]
    Consistency(#[from] ConsistencyViolation),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Planner error: {0}")]
    Planner(#[from] PlannerError),

    #[error("Startup preconditions not satisfied: {0}")]
    StartupPreconditions(String),

    #[error("Startup preconditions not satisfied after {waited_ms} ms: {faults}")]
    StartupTimeout { waited_ms: u64, faults: String },

    #[error("Supervisor used before initialize()")]
    NotInitialized,

    #[error("Feed closed before startup preconditions were satisfied")]
    FeedClosed,
}

impl MissionError {
    /// Errors that must terminate the process instead of being retried.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MissionError::Planner(_))
    }
}
