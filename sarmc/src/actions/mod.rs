//! Action executors
//!
//! One executor per plan action capability. An executor is activated with
//! the symbolic arguments of a plan step, stepped at its own rate with the
//! latest telemetry, and reports progress until it succeeds or fails. It then
//! deactivates itself; all per-activation state is dropped.
//!
//! # Architecture
//!
//! - `move_action`: point-to-point movement through hover/move transitions
//! - `search_action`: waypoint sweep around a named location
//! - `drop_action`: marker and life-vest release over a tracked target
//!
//! Executors never talk to the vehicle directly: each step returns the
//! [`VehicleCommand`]s to send.

pub mod drop_action;
pub mod move_action;
pub mod search_action;

pub use drop_action::{DropExecutor, DropPrecondition, EquipmentNotifier};
pub use move_action::{movement_aligned, MoveExecutor};
pub use search_action::{
    CircleWaypoints, DetectionKind, FinishedActionNotifier, NoVelocityController, SearchExecutor,
    VelocityControllerSwitch, WaypointGenerator,
};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::telemetry::{NedPoint, TelemetrySnapshot};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Unknown location: {0}")]
    UnknownLocation(String),

    #[error("Action {action} is missing argument {index}")]
    MissingArgument { action: String, index: usize },

    #[error("Unable to drop: {0}")]
    Drop(#[from] DropPrecondition),

    #[error("No search waypoints generated around {0}")]
    NoWaypoints(String),

    #[error("Waypoint generator failed: {0}")]
    WaypointGenerator(String),
}

/// Command for the vehicle's position controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VehicleCommand {
    /// Relative displacement in the body frame. All zeros means hover.
    MoveBy { dx: f64, dy: f64, dz: f64 },
    /// Absolute NED target
    MoveTo { target: NedPoint },
}

impl VehicleCommand {
    pub fn hover() -> Self {
        VehicleCommand::MoveBy {
            dx: 0.0,
            dy: 0.0,
            dz: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionStatus {
    Inactive,
    Running { progress: f64, message: String },
    Succeeded { message: String },
    Failed { message: String },
}

impl ActionStatus {
    pub fn running(progress: f64, message: impl Into<String>) -> Self {
        ActionStatus::Running {
            progress,
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Succeeded { .. } | ActionStatus::Failed { .. }
        )
    }
}

/// Outcome of one executor step
#[derive(Debug, Clone, PartialEq)]
pub struct ActionTick {
    pub status: ActionStatus,
    pub commands: Vec<VehicleCommand>,
}

impl ActionTick {
    pub fn inactive() -> Self {
        Self::status(ActionStatus::Inactive)
    }

    pub fn status(status: ActionStatus) -> Self {
        Self {
            status,
            commands: Vec::new(),
        }
    }

    pub fn running(progress: f64, message: impl Into<String>) -> Self {
        Self::status(ActionStatus::running(progress, message))
    }

    pub fn succeeded(message: impl Into<String>) -> Self {
        Self::status(ActionStatus::Succeeded {
            message: message.into(),
        })
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::status(ActionStatus::Failed {
            message: message.into(),
        })
    }

    pub fn with_command(mut self, command: VehicleCommand) -> Self {
        self.commands.push(command);
        self
    }
}

pub trait ActionExecutor {
    /// Action name as it appears in plans
    fn name(&self) -> &str;

    fn activate(&mut self, args: &[String], telemetry: &TelemetrySnapshot)
        -> Result<(), ActionError>;

    fn deactivate(&mut self);

    fn step(&mut self, telemetry: &TelemetrySnapshot, now: DateTime<Utc>) -> ActionTick;

    fn is_active(&self) -> bool;
}

fn argument<'a>(action: &str, args: &'a [String], index: usize) -> Result<&'a str, ActionError> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| ActionError::MissingArgument {
            action: action.to_string(),
            index,
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateResult {
    Passed,
    Waiting,
    Exhausted,
}

/// Bounded retry of a vehicle-state precondition
#[derive(Debug, Clone, Copy)]
struct PreconditionGate {
    passed: bool,
    failures: u32,
    max_failures: u32,
}

impl PreconditionGate {
    fn new(max_failures: u32) -> Self {
        Self {
            passed: false,
            failures: 0,
            max_failures,
        }
    }

    /// Once passed, the gate stays open for the rest of the activation.
    fn check(&mut self, satisfied: bool) -> GateResult {
        if self.passed || satisfied {
            self.passed = true;
            return GateResult::Passed;
        }
        self.failures += 1;
        if self.failures >= self.max_failures {
            GateResult::Exhausted
        } else {
            GateResult::Waiting
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_exhausts_after_max_failures() {
        let mut gate = PreconditionGate::new(3);
        assert_eq!(gate.check(false), GateResult::Waiting);
        assert_eq!(gate.check(false), GateResult::Waiting);
        assert_eq!(gate.check(false), GateResult::Exhausted);
    }

    #[test]
    fn test_gate_stays_open() {
        let mut gate = PreconditionGate::new(2);
        assert_eq!(gate.check(false), GateResult::Waiting);
        assert_eq!(gate.check(true), GateResult::Passed);
        assert_eq!(gate.check(false), GateResult::Passed);
    }

    #[test]
    fn test_missing_argument() {
        let args = vec!["drone1".to_string()];
        assert_eq!(argument("move", &args, 0).unwrap(), "drone1");
        assert!(matches!(
            argument("move", &args, 2),
            Err(ActionError::MissingArgument { index: 2, .. })
        ));
    }
}
