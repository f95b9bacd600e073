//! Vehicle telemetry
//!
//! `TelemetrySnapshot` keeps the latest sample of every signal the supervisor
//! and the action executors read. Each field has exactly one feed writing it;
//! a newer observation overwrites the previous one and nothing else is kept.

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Point or vector in the north-east-down frame.
pub type NedPoint = Vector3<f64>;

/// Discrete flight state reported by the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlightState {
    Landed,
    Ramping,
    TakingOff,
    Hovering,
    Flying,
    Landing,
    Emergency,
}

impl FlightState {
    pub const ALL: [FlightState; 7] = [
        FlightState::Landed,
        FlightState::Ramping,
        FlightState::TakingOff,
        FlightState::Hovering,
        FlightState::Flying,
        FlightState::Landing,
        FlightState::Emergency,
    ];

    /// Name used on the vehicle's state topic
    pub fn wire_name(&self) -> &'static str {
        match self {
            FlightState::Landed => "FS_LANDED",
            FlightState::Ramping => "FS_MOTOR_RAMPING",
            FlightState::TakingOff => "FS_TAKINGOFF",
            FlightState::Hovering => "FS_HOVERING",
            FlightState::Flying => "FS_FLYING",
            FlightState::Landing => "FS_LANDING",
            FlightState::Emergency => "FS_EMERGENCY",
        }
    }

    fn short_name(&self) -> &'static str {
        match self {
            FlightState::Landed => "LANDED",
            FlightState::Ramping => "RAMPING",
            FlightState::TakingOff => "TAKING_OFF",
            FlightState::Hovering => "HOVERING",
            FlightState::Flying => "FLYING",
            FlightState::Landing => "LANDING",
            FlightState::Emergency => "EMERGENCY",
        }
    }

    /// Relative movement commands are only valid in these states.
    pub fn allows_commanded_movement(&self) -> bool {
        matches!(self, FlightState::Hovering | FlightState::Flying)
    }
}

impl fmt::Display for FlightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown flight state: {0}")]
pub struct UnknownFlightState(pub String);

impl FromStr for FlightState {
    type Err = UnknownFlightState;

    /// Accepts both the wire names (`FS_HOVERING`) and the bare names (`HOVERING`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        FlightState::ALL
            .iter()
            .copied()
            .find(|state| state.wire_name() == s || state.short_name() == s)
            .ok_or_else(|| UnknownFlightState(s.to_string()))
    }
}

/// Body-frame velocity
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BodyTwist {
    pub linear: Vector3<f64>,
    pub angular: Vector3<f64>,
}

/// One observation from the telemetry feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum TelemetryUpdate {
    FlightState {
        state: String,
    },
    Position {
        ned: [f64; 3],
    },
    Velocity {
        linear: [f64; 3],
        #[serde(default)]
        angular: [f64; 3],
    },
    Attitude {
        w: f64,
        x: f64,
        y: f64,
        z: f64,
    },
    Battery {
        percent: f64,
    },
}

/// Latest value of every telemetry signal
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    position_ned: NedPoint,
    velocity_body: BodyTwist,
    attitude: UnitQuaternion<f64>,
    flight_state: Option<FlightState>,
    battery_percent: f64,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            position_ned: NedPoint::zeros(),
            velocity_body: BodyTwist::default(),
            attitude: UnitQuaternion::identity(),
            flight_state: None,
            battery_percent: 0.0,
        }
    }
}

impl TelemetrySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one feed observation. Returns `false` if it was rejected and the
    /// previous value kept.
    pub fn apply(&mut self, update: &TelemetryUpdate) -> bool {
        match update {
            TelemetryUpdate::FlightState { state } => match state.parse::<FlightState>() {
                Ok(state) => {
                    self.flight_state = Some(state);
                    true
                }
                Err(e) => {
                    log::warn!("{}", e);
                    false
                }
            },
            TelemetryUpdate::Position { ned } => {
                self.position_ned = NedPoint::new(ned[0], ned[1], ned[2]);
                true
            }
            TelemetryUpdate::Velocity { linear, angular } => {
                self.velocity_body = BodyTwist {
                    linear: Vector3::new(linear[0], linear[1], linear[2]),
                    angular: Vector3::new(angular[0], angular[1], angular[2]),
                };
                true
            }
            TelemetryUpdate::Attitude { w, x, y, z } => {
                match UnitQuaternion::try_new(Quaternion::new(*w, *x, *y, *z), 1e-9) {
                    Some(attitude) => {
                        self.attitude = attitude;
                        true
                    }
                    None => {
                        log::warn!("Rejected degenerate attitude quaternion");
                        false
                    }
                }
            }
            TelemetryUpdate::Battery { percent } => {
                self.battery_percent = *percent;
                true
            }
        }
    }

    pub fn position_ned(&self) -> &NedPoint {
        &self.position_ned
    }

    pub fn velocity_body(&self) -> &BodyTwist {
        &self.velocity_body
    }

    pub fn attitude(&self) -> &UnitQuaternion<f64> {
        &self.attitude
    }

    /// `None` until the first recognized state arrives
    pub fn flight_state(&self) -> Option<FlightState> {
        self.flight_state
    }

    pub fn battery_percent(&self) -> f64 {
        self.battery_percent
    }

    pub fn is_hovering(&self) -> bool {
        self.flight_state == Some(FlightState::Hovering)
    }

    pub fn allows_commanded_movement(&self) -> bool {
        self.flight_state
            .map_or(false, |state| state.allows_commanded_movement())
    }

    /// Battery is usable for flight: within (0, 100].
    pub fn battery_valid(&self) -> bool {
        self.battery_percent > 0.0 && self.battery_percent <= 100.0
    }

    pub fn set_position_ned(&mut self, position: NedPoint) {
        self.position_ned = position;
    }

    pub fn set_velocity_body(&mut self, velocity: BodyTwist) {
        self.velocity_body = velocity;
    }

    pub fn set_attitude(&mut self, attitude: UnitQuaternion<f64>) {
        self.attitude = attitude;
    }

    pub fn set_flight_state(&mut self, state: FlightState) {
        self.flight_state = Some(state);
    }

    pub fn set_battery_percent(&mut self, percent: f64) {
        self.battery_percent = percent;
    }

    /// Position error `position - target` rotated into the body frame.
    pub fn body_frame_error(&self, target: &NedPoint) -> Vector3<f64> {
        self.attitude
            .inverse_transform_vector(&(self.position_ned - target))
    }
}

/// Distance in the north-east plane, ignoring altitude.
pub fn horizontal_distance(a: &NedPoint, b: &NedPoint) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}
