use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use super::{argument, ActionError, ActionExecutor, ActionTick, GateResult, PreconditionGate, VehicleCommand};
use crate::config::SearchConfig;
use crate::locations::LocationMap;
use crate::telemetry::{NedPoint, TelemetrySnapshot};

/// Searched location is the second argument: `(search <drone> <loc>)`
const LOCATION_ARGUMENT: usize = 1;

/// Produces the sweep pattern around a search center
pub trait WaypointGenerator {
    fn generate(&mut self, center: &NedPoint, radius: f64) -> Result<Vec<NedPoint>, ActionError>;
}

/// Told when the search of a location is over
pub trait FinishedActionNotifier {
    fn search_finished(&mut self, location: &str) -> bool;
}

/// External controller that tracks a detection with velocity commands
pub trait VelocityControllerSwitch {
    fn set_enabled(&mut self, enabled: bool) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoVelocityController;

impl VelocityControllerSwitch for NoVelocityController {
    fn set_enabled(&mut self, _enabled: bool) -> bool {
        true
    }
}

/// Evenly spaced points on a circle around the center, at the center's altitude
#[derive(Debug, Clone, Copy)]
pub struct CircleWaypoints {
    pub points: usize,
}

impl Default for CircleWaypoints {
    fn default() -> Self {
        Self { points: 8 }
    }
}

impl WaypointGenerator for CircleWaypoints {
    fn generate(&mut self, center: &NedPoint, radius: f64) -> Result<Vec<NedPoint>, ActionError> {
        let step = std::f64::consts::TAU / self.points.max(1) as f64;
        Ok((0..self.points)
            .map(|i| {
                let angle = step * i as f64;
                NedPoint::new(
                    center.x + radius * angle.cos(),
                    center.y + radius * angle.sin(),
                    center.z,
                )
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionKind {
    Person,
    Tag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchPhase {
    Hover,
    Sweep,
    Track,
}

#[derive(Debug, Clone)]
struct Activation {
    location: String,
    waypoints: Vec<NedPoint>,
    index: usize,
    phase: SearchPhase,
    gate: PreconditionGate,
    waypoint_commanded: bool,
    tracked_ticks: u32,
}

/// Sweeps the waypoints generated around a named location.
///
/// A recent detection pauses the sweep: the vehicle holds position and the
/// external velocity controller tracks the detection. Once no detection is
/// recent the sweep resumes at the current waypoint.
pub struct SearchExecutor<G, N, V = NoVelocityController> {
    locations: Arc<LocationMap>,
    config: SearchConfig,
    generator: G,
    notifier: N,
    velocity: V,
    last_detection: Option<DateTime<Utc>>,
    active: Option<Activation>,
}

impl<G, N, V> SearchExecutor<G, N, V>
where
    G: WaypointGenerator,
    N: FinishedActionNotifier,
    V: VelocityControllerSwitch,
{
    pub fn new(
        locations: Arc<LocationMap>,
        config: SearchConfig,
        generator: G,
        notifier: N,
        velocity: V,
    ) -> Self {
        Self {
            locations,
            config,
            generator,
            notifier,
            velocity,
            last_detection: None,
            active: None,
        }
    }

    pub fn on_detection(&mut self, kind: DetectionKind, stamp: DateTime<Utc>) {
        log::debug!("{:?} detected at {}", kind, stamp);
        if self.last_detection.map_or(true, |last| stamp > last) {
            self.last_detection = Some(stamp);
        }
    }

    fn detection_recent(&self, now: DateTime<Utc>) -> bool {
        let window = Duration::milliseconds(self.config.detection_window_ms as i64);
        self.last_detection
            .map_or(false, |stamp| (now - stamp).abs() <= window)
    }

    fn set_tracking(&mut self, enabled: bool) {
        if !self.velocity.set_enabled(enabled) {
            log::warn!(
                "Failed to {} the velocity controller",
                if enabled { "enable" } else { "disable" }
            );
        }
    }

    fn finish(&mut self, location: &str, message: String) -> ActionTick {
        if self
            .active
            .as_ref()
            .map_or(false, |a| a.phase == SearchPhase::Track)
        {
            self.set_tracking(false);
        }
        self.active = None;
        if !self.notifier.search_finished(location) {
            log::error!("Failed to report finished search of {}", location);
        }
        ActionTick::succeeded(message)
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn velocity_controller(&self) -> &V {
        &self.velocity
    }
}

impl<G, N, V> ActionExecutor for SearchExecutor<G, N, V>
where
    G: WaypointGenerator,
    N: FinishedActionNotifier,
    V: VelocityControllerSwitch,
{
    fn name(&self) -> &str {
        "search"
    }

    fn activate(
        &mut self,
        args: &[String],
        _telemetry: &TelemetrySnapshot,
    ) -> Result<(), ActionError> {
        let location = argument(self.name(), args, LOCATION_ARGUMENT)?.to_string();
        let center = *self
            .locations
            .get(&location)
            .ok_or_else(|| ActionError::UnknownLocation(location.clone()))?;

        let waypoints = self
            .generator
            .generate(&center, self.config.search_radius_m)?;
        if waypoints.is_empty() {
            return Err(ActionError::NoWaypoints(location));
        }

        log::info!("Searching {} through {} waypoints", location, waypoints.len());
        self.active = Some(Activation {
            location,
            waypoints,
            index: 0,
            phase: SearchPhase::Hover,
            gate: PreconditionGate::new(self.config.max_precondition_attempts),
            waypoint_commanded: false,
            tracked_ticks: 0,
        });
        Ok(())
    }

    fn deactivate(&mut self) {
        if self
            .active
            .as_ref()
            .map_or(false, |a| a.phase == SearchPhase::Track)
        {
            self.set_tracking(false);
        }
        self.active = None;
    }

    fn step(&mut self, telemetry: &TelemetrySnapshot, now: DateTime<Utc>) -> ActionTick {
        let recent = self.detection_recent(now);
        let radius = self.config.acceptance_radius_m;
        let confirm_ticks = self.config.detection_confirm_ticks;
        let finish_on_detection = self.config.finish_on_detection;

        let Some(activation) = self.active.as_mut() else {
            return ActionTick::inactive();
        };

        match activation.gate.check(telemetry.allows_commanded_movement()) {
            GateResult::Passed => {}
            GateResult::Waiting => return ActionTick::running(0.0, "Waiting for search preconditions"),
            GateResult::Exhausted => {
                log::error!("Preconditions for search failed!");
                self.active = None;
                return ActionTick::failed("Preconditions for search failed!");
            }
        }

        let progress = activation.index as f64 / activation.waypoints.len() as f64;

        if recent {
            let started_tracking = activation.phase != SearchPhase::Track;
            activation.phase = SearchPhase::Track;
            activation.tracked_ticks += 1;
            let confirmed = finish_on_detection && activation.tracked_ticks >= confirm_ticks;
            let location = activation.location.clone();

            if started_tracking {
                log::info!("Detection during search of {}, holding position", location);
                self.set_tracking(true);
            }
            if confirmed {
                return self.finish(&location, format!("Detection confirmed at {}", location));
            }
            return ActionTick::running(progress, "Tracking detection")
                .with_command(VehicleCommand::hover());
        }

        if activation.phase == SearchPhase::Track {
            log::info!("Detection lost, resuming search of {}", activation.location);
            activation.phase = SearchPhase::Hover;
            activation.tracked_ticks = 0;
            activation.waypoint_commanded = false;
            self.set_tracking(false);
            return ActionTick::running(progress, "Resuming search");
        }

        if activation.phase == SearchPhase::Hover {
            if !telemetry.is_hovering() {
                return ActionTick::running(progress, "Starting hovering")
                    .with_command(VehicleCommand::hover());
            }
            activation.phase = SearchPhase::Sweep;
        }

        let Some(target) = activation.waypoints.get(activation.index).copied() else {
            let location = activation.location.clone();
            return self.finish(&location, format!("Search of {} finished", location));
        };

        if (telemetry.position_ned() - target).norm() <= radius {
            activation.index += 1;
            activation.waypoint_commanded = false;
            let progress = activation.index as f64 / activation.waypoints.len() as f64;
            return ActionTick::running(progress, "Waypoint reached");
        }

        if activation.waypoint_commanded {
            return ActionTick::running(progress, "Moving to waypoint");
        }
        activation.waypoint_commanded = true;
        ActionTick::running(progress, format!("Waypoint {}", activation.index + 1))
            .with_command(VehicleCommand::MoveTo { target })
    }

    fn is_active(&self) -> bool {
        self.active.is_some()
    }
}
