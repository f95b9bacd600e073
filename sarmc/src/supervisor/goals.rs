//! Goal synthesis per controller state

use std::collections::BTreeSet;

use super::policy::ControllerState;
use crate::config::MissionGoalsConfig;
use crate::detection::{DetectionRegistry, PersonId};
use crate::knowledge::{GoalSet, Predicate};
use crate::locations::LocationMap;

/// Everything goal synthesis reads
#[derive(Debug, Clone, Copy)]
pub struct GoalContext<'a> {
    pub drone: &'a str,
    pub goals: &'a MissionGoalsConfig,
    pub locations: &'a LocationMap,
    pub registry: &'a DetectionRegistry,
    /// Locations already reported as searched
    pub searched: &'a BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissionGoalSet {
    /// Location the drone must end up at
    pub end_location: Option<String>,
    /// Require `(landed <drone>)` at the end
    pub land: bool,
    pub search_locations: BTreeSet<String>,
    pub rescue_goals: BTreeSet<Predicate>,
    /// People the rescue goals are about
    pub targets: BTreeSet<PersonId>,
}

impl MissionGoalSet {
    pub fn is_empty(&self) -> bool {
        self.end_location.is_none()
            && !self.land
            && self.search_locations.is_empty()
            && self.rescue_goals.is_empty()
    }

    /// Goal predicates handed to the planner
    pub fn predicates(&self, drone: &str) -> GoalSet {
        let mut goals: GoalSet = self.rescue_goals.clone();
        if let Some(location) = &self.end_location {
            goals.insert(Predicate::new("drone_at", [drone, location.as_str()]));
        }
        if self.land {
            goals.insert(Predicate::new("landed", [drone]));
        }
        for location in &self.search_locations {
            goals.insert(Predicate::new("searched", [location.as_str()]));
        }
        goals
    }
}

pub fn synthesize_goals(state: ControllerState, ctx: &GoalContext<'_>) -> MissionGoalSet {
    match state {
        ControllerState::Search => search_goals(ctx, ctx.goals.include_search_goals),
        // Get the drone back to the landing location, nothing else
        ControllerState::Emergency => search_goals(ctx, false),
        ControllerState::Rescue => rescue_goals(ctx),
        ControllerState::AreaUnavailable | ControllerState::Idle | ControllerState::Init => {
            MissionGoalSet::default()
        }
    }
}

fn search_goals(ctx: &GoalContext<'_>, include_search: bool) -> MissionGoalSet {
    let search_locations = if include_search {
        ctx.goals
            .locations_to_search
            .iter()
            .filter(|location| !ctx.searched.contains(*location))
            .cloned()
            .collect()
    } else {
        BTreeSet::new()
    };

    MissionGoalSet {
        end_location: Some(ctx.goals.preferred_landing_location.clone()),
        land: ctx.goals.drone_landed,
        search_locations,
        ..MissionGoalSet::default()
    }
}

fn rescue_goals(ctx: &GoalContext<'_>) -> MissionGoalSet {
    let mut set = MissionGoalSet::default();
    for person in ctx.registry.unhelped() {
        let Some(location) = ctx.locations.resolve(&person.position) else {
            log::warn!(
                "{} at ({:.1}, {:.1}) is between locations; no rescue goals",
                person.symbol(),
                person.position.x,
                person.position.y
            );
            continue;
        };
        let symbol = person.symbol();
        for obligation in person.severity.obligations() {
            set.rescue_goals.insert(Predicate::new(
                obligation.goal_predicate(),
                [symbol.as_str(), location],
            ));
        }
        set.targets.insert(person.id);
    }
    set
}
