use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::{argument, ActionError, ActionExecutor, ActionTick, GateResult, PreconditionGate, VehicleCommand};
use crate::config::MoveConfig;
use crate::locations::LocationMap;
use crate::telemetry::{FlightState, NedPoint, TelemetrySnapshot};

/// Goal location is the third argument: `(move <drone> <from> <to>)`
const GOAL_ARGUMENT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MoveState {
    Hover,
    Move,
}

#[derive(Debug, Clone)]
struct Activation {
    goal: NedPoint,
    start_distance: f64,
    state: MoveState,
    gate: PreconditionGate,
    ticks_since_command: u32,
    progress: f64,
}

/// Point-to-point movement.
///
/// Displacement commands are only issued while the vehicle hovers, since a
/// relative move entered with non-zero roll or pitch lands somewhere else.
/// The executor therefore alternates between HOVER (settle, then decide) and
/// MOVE (throttled move-by towards the goal).
pub struct MoveExecutor {
    locations: Arc<LocationMap>,
    config: MoveConfig,
    active: Option<Activation>,
}

impl MoveExecutor {
    pub fn new(locations: Arc<LocationMap>, config: MoveConfig) -> Self {
        Self {
            locations,
            config,
            active: None,
        }
    }

    fn finish(&mut self, tick: ActionTick) -> ActionTick {
        self.active = None;
        tick
    }
}

impl ActionExecutor for MoveExecutor {
    fn name(&self) -> &str {
        "move"
    }

    fn activate(
        &mut self,
        args: &[String],
        telemetry: &TelemetrySnapshot,
    ) -> Result<(), ActionError> {
        let goal_name = argument(self.name(), args, GOAL_ARGUMENT)?;
        let goal = *self
            .locations
            .get(goal_name)
            .ok_or_else(|| ActionError::UnknownLocation(goal_name.to_string()))?;

        log::info!("Starting move to {}", goal_name);
        self.active = Some(Activation {
            goal,
            start_distance: (telemetry.position_ned() - goal).norm(),
            state: MoveState::Hover,
            gate: PreconditionGate::new(self.config.max_precondition_attempts),
            ticks_since_command: 0,
            progress: 0.0,
        });
        Ok(())
    }

    fn deactivate(&mut self) {
        self.active = None;
    }

    fn step(&mut self, telemetry: &TelemetrySnapshot, _now: DateTime<Utc>) -> ActionTick {
        let radius = self.config.acceptance_radius_m;
        let max_error = self.config.max_position_error_m;
        let period = self.config.command_period_ticks;
        let Some(activation) = self.active.as_mut() else {
            return ActionTick::inactive();
        };

        match activation.gate.check(telemetry.allows_commanded_movement()) {
            GateResult::Passed => {}
            GateResult::Waiting => return ActionTick::running(0.0, "Waiting for movement preconditions"),
            GateResult::Exhausted => {
                log::error!("Preconditions for move failed!");
                return self.finish(ActionTick::failed("Preconditions for move failed!"));
            }
        }

        let error_ned = telemetry.position_ned() - activation.goal;
        let distance = error_ned.norm();
        let reached = distance <= radius;
        let hovering = telemetry.is_hovering();

        match activation.state {
            MoveState::Hover => {
                if !hovering {
                    return ActionTick::running(activation.progress, "Starting hovering")
                        .with_command(VehicleCommand::hover());
                }
                if !reached {
                    log::debug!("Hovering while goal not reached");
                    activation.state = MoveState::Move;
                    activation.ticks_since_command = 0;
                    return ActionTick::running(activation.progress, "Hovering");
                }
                log::info!("Hovering close to goal position");
                self.finish(ActionTick::succeeded("Position reached"))
            }
            MoveState::Move => {
                if reached {
                    log::info!("Goal achieved during move");
                    activation.state = MoveState::Hover;
                    return ActionTick::running(activation.progress, "Goal achieved during move");
                }
                if !hovering {
                    return ActionTick::running(activation.progress, "Moving");
                }
                if distance > max_error {
                    log::error!(
                        "Position error norm {:.2} exceeds maximum expected norm {:.2}",
                        distance,
                        max_error
                    );
                    return self.finish(ActionTick::failed("Position error norm exceeds maximum"));
                }

                activation.ticks_since_command += 1;
                if activation.ticks_since_command < period {
                    return ActionTick::running(activation.progress, "Hovering before move");
                }
                activation.ticks_since_command = 0;

                let body = telemetry.body_frame_error(&activation.goal);
                if activation.start_distance > f64::EPSILON {
                    activation.progress =
                        (1.0 - distance / activation.start_distance).clamp(0.0, 1.0);
                }
                log::info!(
                    "Move ordered: x = {:.2}, y = {:.2}, z = {:.2}",
                    -body.x,
                    -body.y,
                    -body.z
                );
                ActionTick::running(activation.progress, "Movement ordered").with_command(
                    VehicleCommand::MoveBy {
                        dx: -body.x,
                        dy: -body.y,
                        dz: -body.z,
                    },
                )
            }
        }
    }

    fn is_active(&self) -> bool {
        self.active.is_some()
    }
}

/// Whether the vehicle is flying roughly along `move_vector`.
///
/// Requires FLYING, a move vector of at least 0.5, a speed of at least 0.1
/// and a horizontal angle of at most 10 degrees between the two.
pub fn movement_aligned(telemetry: &TelemetrySnapshot, move_vector: &NedPoint) -> bool {
    const MIN_MOVE_NORM: f64 = 0.5;
    const MIN_SPEED: f64 = 0.1;
    const MIN_HORIZONTAL_NORM: f64 = 0.01;
    const MAX_ANGLE_DEG: f64 = 10.0;

    if telemetry.flight_state() != Some(FlightState::Flying) {
        return false;
    }
    if move_vector.norm() < MIN_MOVE_NORM {
        return false;
    }
    let velocity = &telemetry.velocity_body().linear;
    if velocity.norm() < MIN_SPEED {
        return false;
    }

    let move_h = move_vector.xy();
    let vel_h = velocity.xy();
    if move_h.norm() < MIN_HORIZONTAL_NORM || vel_h.norm() < MIN_HORIZONTAL_NORM {
        return false;
    }
    move_h.angle(&vel_h) <= MAX_ANGLE_DEG.to_radians()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionStatus;
    use crate::config::fixtures::sample_config;
    use crate::telemetry::BodyTwist;
    use nalgebra::Vector3;

    fn executor() -> MoveExecutor {
        let config = sample_config();
        let locations = Arc::new(LocationMap::from_config(&config.locations).unwrap());
        MoveExecutor::new(locations, config.actions.movement)
    }

    fn hovering_at(position: NedPoint) -> TelemetrySnapshot {
        let mut telemetry = TelemetrySnapshot::new();
        telemetry.set_flight_state(FlightState::Hovering);
        telemetry.set_position_ned(position);
        telemetry
    }

    fn args(to: &str) -> Vec<String> {
        vec!["drone1".to_string(), "h1".to_string(), to.to_string()]
    }

    #[test]
    fn test_unknown_goal_fails_activation() {
        let mut move_exec = executor();
        let telemetry = hovering_at(NedPoint::zeros());
        assert!(matches!(
            move_exec.activate(&args("zz"), &telemetry),
            Err(ActionError::UnknownLocation(name)) if name == "zz"
        ));
        assert!(!move_exec.is_active());
    }

    #[test]
    fn test_success_when_hovering_inside_radius() {
        let mut move_exec = executor();
        let telemetry = hovering_at(NedPoint::new(20.3, 0.0, -5.0));
        move_exec.activate(&args("a1"), &telemetry).unwrap();
        let tick = move_exec.step(&telemetry, Utc::now());
        assert!(matches!(tick.status, ActionStatus::Succeeded { .. }));
        assert!(!move_exec.is_active());
    }

    #[test]
    fn test_not_complete_inside_radius_while_flying() {
        let mut move_exec = executor();
        let mut telemetry = hovering_at(NedPoint::new(20.3, 0.0, -5.0));
        telemetry.set_flight_state(FlightState::Flying);
        move_exec.activate(&args("a1"), &telemetry).unwrap();
        for _ in 0..20 {
            let tick = move_exec.step(&telemetry, Utc::now());
            assert!(matches!(tick.status, ActionStatus::Running { .. }));
            assert_eq!(tick.commands, vec![VehicleCommand::hover()]);
        }
    }

    #[test]
    fn test_precondition_attempts_exhausted() {
        let mut move_exec = executor();
        let mut telemetry = TelemetrySnapshot::new();
        telemetry.set_flight_state(FlightState::Landed);
        move_exec.activate(&args("a1"), &telemetry).unwrap();
        for _ in 0..4 {
            let tick = move_exec.step(&telemetry, Utc::now());
            assert!(matches!(tick.status, ActionStatus::Running { .. }));
        }
        let tick = move_exec.step(&telemetry, Utc::now());
        assert_eq!(
            tick.status,
            ActionStatus::Failed {
                message: "Preconditions for move failed!".to_string()
            }
        );
    }

    #[test]
    fn test_move_commands_throttled() {
        let mut move_exec = executor();
        let telemetry = hovering_at(NedPoint::new(0.0, 0.0, -5.0));
        move_exec.activate(&args("a1"), &telemetry).unwrap();

        // First tick switches HOVER -> MOVE
        assert!(move_exec.step(&telemetry, Utc::now()).commands.is_empty());

        let commands: Vec<VehicleCommand> = (0..30)
            .flat_map(|_| move_exec.step(&telemetry, Utc::now()).commands)
            .collect();
        assert_eq!(commands.len(), 3);
        // Identity attitude: body frame equals NED, command points at the goal
        assert_eq!(
            commands[0],
            VehicleCommand::MoveBy {
                dx: 20.0,
                dy: 0.0,
                dz: 0.0
            }
        );
    }

    #[test]
    fn test_far_position_error_fails() {
        let mut move_exec = executor();
        let telemetry = hovering_at(NedPoint::new(-200.0, 0.0, -5.0));
        move_exec.activate(&args("a1"), &telemetry).unwrap();
        move_exec.step(&telemetry, Utc::now());
        let tick = move_exec.step(&telemetry, Utc::now());
        assert!(matches!(tick.status, ActionStatus::Failed { .. }));
    }

    #[test]
    fn test_movement_alignment() {
        let mut telemetry = TelemetrySnapshot::new();
        telemetry.set_flight_state(FlightState::Flying);
        telemetry.set_velocity_body(BodyTwist {
            linear: Vector3::new(1.0, 0.1, 0.0),
            angular: Vector3::zeros(),
        });
        assert!(movement_aligned(&telemetry, &Vector3::new(5.0, 0.0, 0.0)));
        assert!(!movement_aligned(&telemetry, &Vector3::new(0.0, 5.0, 0.0)));
        assert!(!movement_aligned(&telemetry, &Vector3::new(0.2, 0.0, 0.0)));

        telemetry.set_flight_state(FlightState::Hovering);
        assert!(!movement_aligned(&telemetry, &Vector3::new(5.0, 0.0, 0.0)));
    }
}
