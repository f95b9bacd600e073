use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{ActionError, ActionExecutor, ActionTick};
use crate::config::DropConfig;
use crate::detection::Severity;
use crate::equipment::{EquipmentCounters, EquipmentKind};
use crate::telemetry::{horizontal_distance, FlightState, NedPoint, TelemetrySnapshot};

/// Reports a changed equipment count to whoever owns the planning functions
pub trait EquipmentNotifier {
    fn set_equipment(&mut self, kind: EquipmentKind, count: u32) -> bool;
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DropPrecondition {
    #[error("vehicle is not hovering (state: {0:?})")]
    NotHovering(Option<FlightState>),

    #[error("no target tracked")]
    NoTarget,

    #[error("target is {distance:.2} m away horizontally, maximum is {max:.2} m")]
    TooFar { distance: f64, max: f64 },

    #[error("altitude {altitude:.2} m exceeds {max:.2} m")]
    TooHigh { altitude: f64, max: f64 },

    #[error("target severity {severity} is below {min}")]
    SeverityTooLow { severity: Severity, min: Severity },

    #[error("no {0} left")]
    NoEquipment(EquipmentKind),
}

#[derive(Debug, Clone, Copy)]
struct Activation {
    target: NedPoint,
    already_served: bool,
}

/// Releases one marker or life vest over the tracked target.
///
/// Targets are fed by the detector through [`DropExecutor::on_detection`].
/// A target that already received this kind of equipment is not served
/// twice: the action then succeeds without dropping anything.
pub struct DropExecutor<N> {
    kind: EquipmentKind,
    config: DropConfig,
    min_severity: Severity,
    counters: EquipmentCounters,
    notifier: N,
    tracked: Option<(NedPoint, Severity)>,
    served: Vec<NedPoint>,
    active: Option<Activation>,
}

impl<N: EquipmentNotifier> DropExecutor<N> {
    pub fn new(
        kind: EquipmentKind,
        config: DropConfig,
        counters: EquipmentCounters,
        notifier: N,
    ) -> Self {
        let min_severity = match kind {
            EquipmentKind::Marker => config.marker_min_severity,
            EquipmentKind::Lifevest => config.lifevest_min_severity,
        };
        Self {
            kind,
            config,
            min_severity,
            counters,
            notifier,
            tracked: None,
            served: Vec::new(),
            active: None,
        }
    }

    pub fn marker(config: DropConfig, counters: EquipmentCounters, notifier: N) -> Self {
        Self::new(EquipmentKind::Marker, config, counters, notifier)
    }

    pub fn lifevest(config: DropConfig, counters: EquipmentCounters, notifier: N) -> Self {
        Self::new(EquipmentKind::Lifevest, config, counters, notifier)
    }

    pub fn kind(&self) -> EquipmentKind {
        self.kind
    }

    pub fn remaining(&self) -> u32 {
        self.counters.get(self.kind)
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Track a detection as the drop target.
    ///
    /// Ignored when it lies within `same_target_radius_m` of a served target
    /// or of the one already tracked.
    pub fn on_detection(&mut self, position: NedPoint, severity: Severity) -> bool {
        let radius = self.config.same_target_radius_m;
        let near = |other: &NedPoint| horizontal_distance(other, &position) <= radius;
        if self.served.iter().any(near) {
            return false;
        }
        if let Some((tracked, _)) = &self.tracked {
            if near(tracked) {
                return false;
            }
        }
        log::debug!("Tracking {} target at {:?}", self.kind, position);
        self.tracked = Some((position, severity));
        true
    }

    fn check(&self, telemetry: &TelemetrySnapshot) -> Result<Activation, DropPrecondition> {
        if !telemetry.is_hovering() {
            return Err(DropPrecondition::NotHovering(telemetry.flight_state()));
        }
        let (target, severity) = self.tracked.ok_or(DropPrecondition::NoTarget)?;

        let distance = horizontal_distance(telemetry.position_ned(), &target);
        if distance > self.config.max_horizontal_offset_m {
            return Err(DropPrecondition::TooFar {
                distance,
                max: self.config.max_horizontal_offset_m,
            });
        }
        let altitude = telemetry.position_ned().z.abs();
        if altitude > self.config.max_altitude_m {
            return Err(DropPrecondition::TooHigh {
                altitude,
                max: self.config.max_altitude_m,
            });
        }

        let already_served = self
            .served
            .iter()
            .any(|served| horizontal_distance(served, &target) <= self.config.same_target_radius_m);
        if !already_served {
            if severity < self.min_severity {
                return Err(DropPrecondition::SeverityTooLow {
                    severity,
                    min: self.min_severity,
                });
            }
            if self.counters.get(self.kind) == 0 {
                return Err(DropPrecondition::NoEquipment(self.kind));
            }
        }
        Ok(Activation {
            target,
            already_served,
        })
    }
}

impl<N: EquipmentNotifier> ActionExecutor for DropExecutor<N> {
    fn name(&self) -> &str {
        match self.kind {
            EquipmentKind::Marker => "drop_marker",
            EquipmentKind::Lifevest => "drop_lifevest",
        }
    }

    fn activate(
        &mut self,
        _args: &[String],
        telemetry: &TelemetrySnapshot,
    ) -> Result<(), ActionError> {
        let activation = self.check(telemetry).map_err(|e| {
            log::warn!("Unable to drop {}: {}", self.kind, e);
            e
        })?;
        self.active = Some(activation);
        Ok(())
    }

    fn deactivate(&mut self) {
        self.active = None;
    }

    fn step(&mut self, _telemetry: &TelemetrySnapshot, _now: DateTime<Utc>) -> ActionTick {
        let Some(activation) = self.active.take() else {
            return ActionTick::inactive();
        };
        if activation.already_served {
            return ActionTick::succeeded(format!("Target already has a {}", self.kind));
        }

        let remaining = match self.counters.try_take(self.kind) {
            Ok(remaining) => remaining,
            Err(e) => return ActionTick::failed(e.to_string()),
        };
        log::info!("Dropped {}, {} left", self.kind, remaining);
        if !self.notifier.set_equipment(self.kind, remaining) {
            log::error!("Failed to report remaining {} count", self.kind);
        }
        self.served.push(activation.target);
        if self
            .tracked
            .map_or(false, |(tracked, _)| tracked == activation.target)
        {
            self.tracked = None;
        }
        ActionTick::succeeded(format!("{} dropped", self.kind))
    }

    fn is_active(&self) -> bool {
        self.active.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionStatus;

    #[derive(Default)]
    struct Counts(Vec<(EquipmentKind, u32)>);

    impl EquipmentNotifier for Counts {
        fn set_equipment(&mut self, kind: EquipmentKind, count: u32) -> bool {
            self.0.push((kind, count));
            true
        }
    }

    fn hovering_at(position: NedPoint) -> TelemetrySnapshot {
        let mut telemetry = TelemetrySnapshot::new();
        telemetry.set_flight_state(FlightState::Hovering);
        telemetry.set_position_ned(position);
        telemetry
    }

    fn marker(count: u32) -> DropExecutor<Counts> {
        DropExecutor::marker(
            DropConfig::default(),
            EquipmentCounters::new(count, 0),
            Counts::default(),
        )
    }

    #[test]
    fn test_drop_decrements_and_notifies() {
        let mut drop = marker(2);
        drop.on_detection(NedPoint::new(10.0, 0.0, 0.0), Severity::Moderate);
        let telemetry = hovering_at(NedPoint::new(10.5, 0.5, -3.0));

        drop.activate(&[], &telemetry).unwrap();
        let tick = drop.step(&telemetry, Utc::now());
        assert!(matches!(tick.status, ActionStatus::Succeeded { .. }));
        assert_eq!(drop.remaining(), 1);
        assert_eq!(drop.notifier().0, vec![(EquipmentKind::Marker, 1)]);
        assert!(!drop.is_active());
    }

    #[test]
    fn test_served_target_not_served_twice() {
        let mut drop = marker(2);
        let target = NedPoint::new(10.0, 0.0, 0.0);
        let telemetry = hovering_at(NedPoint::new(10.0, 0.0, -3.0));
        drop.on_detection(target, Severity::High);
        drop.activate(&[], &telemetry).unwrap();
        drop.step(&telemetry, Utc::now());

        // Same person seen again is ignored
        assert!(!drop.on_detection(NedPoint::new(11.0, 0.0, 0.0), Severity::High));
        assert!(matches!(drop.check(&telemetry), Err(DropPrecondition::NoTarget)));
        assert_eq!(drop.remaining(), 1);
    }

    #[test]
    fn test_preconditions() {
        let mut drop = marker(1);
        let mut telemetry = hovering_at(NedPoint::new(0.0, 0.0, -3.0));
        assert_eq!(drop.check(&telemetry).unwrap_err(), DropPrecondition::NoTarget);

        drop.on_detection(NedPoint::new(5.0, 0.0, 0.0), Severity::Moderate);
        assert!(matches!(
            drop.check(&telemetry),
            Err(DropPrecondition::TooFar { .. })
        ));

        telemetry.set_position_ned(NedPoint::new(5.0, 0.0, -6.0));
        assert!(matches!(
            drop.check(&telemetry),
            Err(DropPrecondition::TooHigh { .. })
        ));

        telemetry.set_position_ned(NedPoint::new(5.0, 0.0, -3.0));
        telemetry.set_flight_state(FlightState::Flying);
        assert_eq!(
            drop.check(&telemetry).unwrap_err(),
            DropPrecondition::NotHovering(Some(FlightState::Flying))
        );
    }

    #[test]
    fn test_lifevest_requires_high_severity() {
        let mut drop = DropExecutor::lifevest(
            DropConfig::default(),
            EquipmentCounters::new(0, 1),
            Counts::default(),
        );
        assert_eq!(drop.name(), "drop_lifevest");
        let telemetry = hovering_at(NedPoint::new(0.0, 0.0, -2.0));
        drop.on_detection(NedPoint::new(0.0, 0.0, 0.0), Severity::Moderate);
        assert!(matches!(
            drop.activate(&[], &telemetry),
            Err(ActionError::Drop(DropPrecondition::SeverityTooLow { .. }))
        ));
    }

    #[test]
    fn test_no_equipment_left() {
        let mut drop = marker(0);
        let telemetry = hovering_at(NedPoint::new(0.0, 0.0, -2.0));
        drop.on_detection(NedPoint::new(0.0, 0.0, 0.0), Severity::High);
        assert_eq!(
            drop.check(&telemetry).unwrap_err(),
            DropPrecondition::NoEquipment(EquipmentKind::Marker)
        );
        assert_eq!(drop.remaining(), 0);
    }
}
