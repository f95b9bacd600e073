use std::fmt;

use crate::config::StartupConfig;
use crate::telemetry::TelemetrySnapshot;

/// A startup precondition that does not hold yet
#[derive(Debug, Clone, PartialEq)]
pub enum StartupFault {
    NoFlightState,
    InvalidBattery(f64),
    PositionNotNearOrigin { norm: f64, max: f64 },
}

impl fmt::Display for StartupFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupFault::NoFlightState => f.write_str("No flight state received"),
            StartupFault::InvalidBattery(percent) => write!(f, "Invalid battery: {}", percent),
            StartupFault::PositionNotNearOrigin { norm, max } => write!(
                f,
                "NED position norm {:.2} exceeds {:.2}; position estimate likely incorrect",
                norm, max
            ),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StartupCheck {
    max_initial_ned_norm: f64,
}

impl StartupCheck {
    pub fn new(config: &StartupConfig) -> Self {
        Self {
            max_initial_ned_norm: config.max_initial_ned_norm,
        }
    }

    /// Every failing condition, in a fixed order. Empty means ready.
    pub fn evaluate(&self, telemetry: &TelemetrySnapshot) -> Vec<StartupFault> {
        let mut faults = Vec::new();
        if telemetry.flight_state().is_none() {
            faults.push(StartupFault::NoFlightState);
        }
        if !telemetry.battery_valid() {
            faults.push(StartupFault::InvalidBattery(telemetry.battery_percent()));
        }
        let norm = telemetry.position_ned().norm();
        if norm > self.max_initial_ned_norm {
            faults.push(StartupFault::PositionNotNearOrigin {
                norm,
                max: self.max_initial_ned_norm,
            });
        }
        faults
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{FlightState, NedPoint};

    #[test]
    fn test_fresh_snapshot_reports_all_but_position() {
        let check = StartupCheck::new(&StartupConfig::default());
        let faults = check.evaluate(&TelemetrySnapshot::new());
        assert_eq!(
            faults,
            vec![StartupFault::NoFlightState, StartupFault::InvalidBattery(0.0)]
        );
    }

    #[test]
    fn test_ready_snapshot() {
        let check = StartupCheck::new(&StartupConfig::default());
        let mut telemetry = TelemetrySnapshot::new();
        telemetry.set_flight_state(FlightState::Landed);
        telemetry.set_battery_percent(80.0);
        telemetry.set_position_ned(NedPoint::new(3.0, 4.0, 0.0));
        assert!(check.evaluate(&telemetry).is_empty());

        telemetry.set_position_ned(NedPoint::new(3.0, 4.0, 1.0));
        assert!(matches!(
            check.evaluate(&telemetry).as_slice(),
            [StartupFault::PositionNotNearOrigin { .. }]
        ));
    }
}
