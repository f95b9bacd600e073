//! Replanning policy
//!
//! Pure functions of the committed controller state and the pending mission
//! events. Nothing here touches the knowledge base or the planner.

use std::fmt;

use super::goals::{synthesize_goals, GoalContext, MissionGoalSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerState {
    Init,
    Idle,
    Search,
    Rescue,
    Emergency,
    AreaUnavailable,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerState::Init => "INIT",
            ControllerState::Idle => "IDLE",
            ControllerState::Search => "SEARCH",
            ControllerState::Rescue => "RESCUE",
            ControllerState::Emergency => "EMERGENCY",
            ControllerState::AreaUnavailable => "AREA_UNAVAILABLE",
        };
        f.write_str(name)
    }
}

/// Asynchronous events folded into the next tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MissionEvents {
    /// A new person was registered and no RESCUE plan covering it is committed
    pub detection_pending: bool,
    pub emergency: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplanReason {
    PersonDetected,
    Emergency,
    /// Nothing committed yet, or the previous area became unavailable
    NeedsSearch,
}

impl fmt::Display for ReplanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplanReason::PersonDetected => f.write_str("Person detected"),
            ReplanReason::Emergency => f.write_str("Emergency occurred"),
            ReplanReason::NeedsSearch => f.write_str("INIT or area unavailable"),
        }
    }
}

/// Target state for a replan, by fixed precedence: detection, then
/// emergency, then the need to start (or restart) searching.
pub fn recommend_replan(
    state: ControllerState,
    events: MissionEvents,
) -> Option<(ControllerState, ReplanReason)> {
    if events.detection_pending {
        return Some((ControllerState::Rescue, ReplanReason::PersonDetected));
    }
    if events.emergency && state != ControllerState::Emergency {
        return Some((ControllerState::Emergency, ReplanReason::Emergency));
    }
    match state {
        ControllerState::Init | ControllerState::AreaUnavailable => {
            Some((ControllerState::Search, ReplanReason::NeedsSearch))
        }
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub target: ControllerState,
    pub reason: ReplanReason,
    pub goals: MissionGoalSet,
}

/// Replan decision together with the goal set for its target
pub fn decide(
    state: ControllerState,
    events: MissionEvents,
    ctx: &GoalContext<'_>,
) -> Option<Decision> {
    let (target, reason) = recommend_replan(state, events)?;
    Some(Decision {
        target,
        reason,
        goals: synthesize_goals(target, ctx),
    })
}
