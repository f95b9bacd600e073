// SARMC Library
// Search-and-rescue mission control: symbolic supervision and action executors

pub mod actions;
pub mod config;
pub mod detection;
pub mod equipment;
pub mod error;
pub mod knowledge;
pub mod locations;
pub mod planner;
pub mod runtime;
pub mod supervisor;
pub mod telemetry;

pub use crate::config::MissionConfig;
pub use crate::error::MissionError;
pub use crate::supervisor::{ControllerState, MissionSupervisor};
