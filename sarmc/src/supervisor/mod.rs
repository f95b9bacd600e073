//! Mission supervisor
//!
//! Fuses telemetry, detections and emergencies into replanning decisions and
//! keeps the symbolic knowledge base in step with the mission.
//!
//! # Architecture
//!
//! - `policy`: which state to replan to, by fixed precedence
//! - `goals`: goal sets per controller state
//! - `startup`: preconditions checked before the first tick
//!
//! `policy` and `goals` are pure. [`MissionSupervisor`] is the side-effecting
//! shell around them: it owns the registry and the knowledge base, calls the
//! planner, and starts or cancels plans on the executor. All mutation goes
//! through `&mut self`, so a single owner serializes events and ticks.

pub mod goals;
pub mod policy;
pub mod startup;

pub use goals::{synthesize_goals, GoalContext, MissionGoalSet};
pub use policy::{decide, recommend_replan, ControllerState, Decision, MissionEvents, ReplanReason};
pub use startup::{StartupCheck, StartupFault};

use itertools::Itertools;
use std::collections::BTreeSet;

use crate::config::MissionConfig;
use crate::detection::{
    person_symbol, ConsistencyViolation, DetectionRegistry, Insertion, PersonId, Severity,
};
use crate::equipment::{EquipmentCounters, EquipmentKind};
use crate::error::MissionError;
use crate::knowledge::{KnowledgeBase, Predicate};
use crate::locations::LocationMap;
use crate::planner::{ExecutionStatus, Plan, PlanExecutor, PlannerFacade};
use crate::telemetry::{FlightState, NedPoint, TelemetrySnapshot, TelemetryUpdate};

/// Published to mission observers
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Text(String),
    Plan(Plan),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionOutcome {
    Added { id: PersonId, location: String },
    Duplicate(PersonId),
    /// No named location near the detection; nothing was registered
    Unresolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Steady,
    Replanned { target: ControllerState },
    PlanningFailed { target: ControllerState },
}

/// Goals of the plan currently committed
#[derive(Debug, Clone, PartialEq)]
struct Commitment {
    target: ControllerState,
    goals: MissionGoalSet,
}

pub struct MissionSupervisor<P, E> {
    config: MissionConfig,
    locations: LocationMap,
    registry: DetectionRegistry,
    knowledge: KnowledgeBase,
    telemetry: TelemetrySnapshot,
    equipment: EquipmentCounters,
    startup: StartupCheck,
    planner: P,
    executor: E,
    state: ControllerState,
    detection_pending: bool,
    emergency_requested: bool,
    searched: BTreeSet<String>,
    committed: Option<Commitment>,
    current_plan: Option<Plan>,
    status: Vec<StatusUpdate>,
    initialized: bool,
}

impl<P, E> MissionSupervisor<P, E>
where
    P: PlannerFacade,
    E: PlanExecutor,
{
    pub fn new(config: MissionConfig, planner: P, executor: E) -> Result<Self, MissionError> {
        config.check()?;
        let locations = LocationMap::from_config(&config.locations)?;
        Ok(Self {
            equipment: EquipmentCounters::from_payload(&config.mission_init.payload),
            startup: StartupCheck::new(&config.startup),
            locations,
            registry: DetectionRegistry::default(),
            knowledge: KnowledgeBase::new(),
            telemetry: TelemetrySnapshot::new(),
            planner,
            executor,
            state: ControllerState::Init,
            detection_pending: false,
            emergency_requested: false,
            searched: BTreeSet::new(),
            committed: None,
            current_plan: None,
            status: Vec::new(),
            initialized: false,
            config,
        })
    }

    /// Apply one telemetry observation. Returns `false` if it was rejected.
    pub fn on_telemetry(&mut self, update: &TelemetryUpdate) -> bool {
        let was_emergency = self.telemetry.flight_state() == Some(FlightState::Emergency);
        let accepted = self.telemetry.apply(update);
        if !was_emergency && self.telemetry.flight_state() == Some(FlightState::Emergency) {
            log::warn!("Vehicle reports {}", FlightState::Emergency);
        }
        accepted
    }

    pub fn telemetry_mut(&mut self) -> &mut TelemetrySnapshot {
        &mut self.telemetry
    }

    pub fn startup_faults(&self) -> Vec<StartupFault> {
        self.startup.evaluate(&self.telemetry)
    }

    /// Check startup preconditions and load the initial knowledge.
    pub fn initialize(&mut self) -> Result<(), MissionError> {
        let faults = self.startup_faults();
        if !faults.is_empty() {
            return Err(MissionError::StartupPreconditions(
                faults.iter().map(ToString::to_string).join("; "),
            ));
        }
        log::info!("Preconditions checked!");

        self.load_initial_knowledge();
        self.refresh_functions();
        self.state = ControllerState::Init;
        self.initialized = true;
        self.status.push(StatusUpdate::Text("Starting".to_string()));
        Ok(())
    }

    fn load_initial_knowledge(&mut self) {
        self.knowledge.clear();
        let drone = self.config.drone.name.clone();

        self.knowledge.add_instance(drone.clone(), "drone");
        for name in self.locations.names() {
            self.knowledge.add_instance(name, "location");
        }
        for (from, to) in self.locations.paths() {
            let path = Predicate::new("path", [from.as_str(), to.as_str()]);
            log::info!("Adding path predicate: {}", path);
            self.knowledge.add_predicate(path);
        }

        let start = &self.config.mission_init.start_location;
        let position = Predicate::new("drone_at", [drone.as_str(), start.as_str()]);
        log::info!("Adding position predicate: {}", position);
        self.knowledge.add_predicate(position);

        let landed = if self.telemetry.flight_state() == Some(FlightState::Landed) {
            Predicate::new("landed", [drone.as_str()])
        } else {
            Predicate::new("not_landed", [drone.as_str()])
        };
        log::info!("Adding landed predicate: {}", landed);
        self.knowledge.add_predicate(landed);
    }

    /// Replace the numeric functions with the current counters and battery.
    fn refresh_functions(&mut self) {
        let drone = self.config.drone.name.as_str();
        self.knowledge.clear_functions();
        for kind in [EquipmentKind::Marker, EquipmentKind::Lifevest] {
            self.knowledge
                .set_function(kind.function_name(), [drone], self.equipment.get(kind) as f64);
        }
        self.knowledge
            .set_function("battery_charge", [drone], self.telemetry.battery_percent());
    }

    /// Register a detected person and assert its open obligations.
    ///
    /// Fails only when the detection matches a person already helped.
    pub fn on_person_detected(
        &mut self,
        position: NedPoint,
        severity: Severity,
    ) -> Result<DetectionOutcome, MissionError> {
        if let Some(existing) = self.registry.find_match(&position) {
            if existing.helped() {
                return Err(ConsistencyViolation::HelpedReopened {
                    id: existing.id,
                    north: position.x,
                    east: position.y,
                }
                .into());
            }
            log::debug!(
                "Person at ({:.2}, {:.2}, {:.2}) previously detected as {}",
                position.x,
                position.y,
                position.z,
                existing.symbol()
            );
            return Ok(DetectionOutcome::Duplicate(existing.id));
        }

        let Some(location) = self.locations.resolve(&position).map(str::to_string) else {
            log::error!(
                "Unable to determine location for detection at ({:.2}, {:.2})",
                position.x,
                position.y
            );
            return Ok(DetectionOutcome::Unresolved);
        };

        let id = match self.registry.insert(position, severity)? {
            Insertion::Created(id) => id,
            Insertion::Duplicate(id) => return Ok(DetectionOutcome::Duplicate(id)),
        };
        let symbol = person_symbol(id);

        log::info!("Adding instance: {} ({} severity)", symbol, severity);
        self.knowledge.add_instance(symbol.clone(), "person");
        let person_at = Predicate::new("person_at", [symbol.as_str(), location.as_str()]);
        log::info!("Adding predicate: {}", person_at);
        self.knowledge.add_predicate(person_at);
        for obligation in severity.obligations() {
            let open = Predicate::new(
                obligation.open_predicate(),
                [symbol.as_str(), location.as_str()],
            );
            log::info!("Adding predicate: {}", open);
            self.knowledge.add_predicate(open);
        }

        self.detection_pending = true;
        Ok(DetectionOutcome::Added { id, location })
    }

    pub fn raise_emergency(&mut self) {
        if !self.emergency_requested {
            log::warn!("Emergency raised");
        }
        self.emergency_requested = true;
    }

    pub fn clear_emergency(&mut self) {
        self.emergency_requested = false;
    }

    /// Equipment-count service. Always succeeds.
    pub fn set_equipment(&mut self, kind: EquipmentKind, count: u32) -> bool {
        self.equipment.set(kind, count);
        log::info!(
            "Current equipment: markers {}, lifevests {}",
            self.equipment.get(EquipmentKind::Marker),
            self.equipment.get(EquipmentKind::Lifevest)
        );
        true
    }

    /// Record that the search of `location` finished.
    pub fn on_search_finished(&mut self, location: &str) -> bool {
        if !self.locations.contains(location) {
            log::warn!("Search finished at unknown location '{}'", location);
            return false;
        }
        self.knowledge
            .add_predicate(Predicate::new("searched", [location]));
        self.searched.insert(location.to_string());
        true
    }

    /// Mark a person as helped and close their open obligations.
    ///
    /// Returns `false` if the person was already helped.
    pub fn mark_helped(&mut self, id: PersonId) -> Result<bool, MissionError> {
        if !self.registry.mark_helped(id)? {
            return Ok(false);
        }
        let Some(person) = self.registry.get(id) else {
            return Ok(true);
        };
        let symbol = person.symbol();
        let severity = person.severity;
        if let Some(location) = self.locations.resolve(&person.position) {
            for obligation in severity.obligations() {
                let args = [symbol.as_str(), location];
                self.knowledge
                    .remove_predicate(&Predicate::new(obligation.open_predicate(), args));
                self.knowledge
                    .add_predicate(Predicate::new(obligation.goal_predicate(), args));
            }
        }
        log::info!("{} helped", symbol);
        Ok(true)
    }

    /// Pending events as seen by the replanning policy
    pub fn events(&self) -> MissionEvents {
        MissionEvents {
            detection_pending: self.detection_pending,
            emergency: self.emergency_requested
                || self.telemetry.flight_state() == Some(FlightState::Emergency)
                || self.low_battery(),
        }
    }

    fn low_battery(&self) -> bool {
        self.initialized
            && self.telemetry.battery_percent() < self.config.emergency.low_battery_percent
    }

    /// One supervision step: poll the executor, then replan if the policy
    /// asks for it.
    pub fn tick(&mut self) -> Result<TickOutcome, MissionError> {
        if !self.initialized {
            return Err(MissionError::NotInitialized);
        }

        match self.executor.poll() {
            ExecutionStatus::Idle => {}
            ExecutionStatus::Running { progress } => {
                for p in progress {
                    log::debug!("[{} {:.0}%]", p.action, p.progress * 100.0);
                }
            }
            ExecutionStatus::Succeeded => {
                log::info!("Finished plan");
                self.current_plan = None;
                self.apply_committed_goals()?;
            }
            ExecutionStatus::Failed { failures } => {
                self.current_plan = None;
                for failure in failures {
                    log::error!("[{}] finished with error: {}", failure.action, failure.message);
                }
            }
        }

        let decision = decide(self.state, self.events(), &self.goal_context());
        let Some(decision) = decision else {
            return Ok(TickOutcome::Steady);
        };
        Ok(self.replan(decision))
    }

    fn goal_context(&self) -> GoalContext<'_> {
        GoalContext {
            drone: &self.config.drone.name,
            goals: &self.config.mission_goals,
            locations: &self.locations,
            registry: &self.registry,
            searched: &self.searched,
        }
    }

    fn replan(&mut self, decision: Decision) -> TickOutcome {
        let target = decision.target;
        log::info!("Reason to replan: {}", decision.reason);
        self.log_replanning_state();

        log::warn!("Cancelling plan execution");
        self.executor.cancel();
        self.current_plan = None;

        self.knowledge
            .set_goals(decision.goals.predicates(&self.config.drone.name));
        self.refresh_functions();

        log::warn!("Replanning towards {}", target);
        let plan = match self.planner.solve(&self.knowledge.problem()) {
            Ok(Some(plan)) => plan,
            Ok(None) => {
                log::error!(
                    "Could not find plan to reach goal: {}",
                    self.knowledge.problem().goal_text()
                );
                return TickOutcome::PlanningFailed { target };
            }
            Err(e) => {
                log::error!("Planner failed: {}", e);
                return TickOutcome::PlanningFailed { target };
            }
        };

        if let Err(e) = self.executor.start(&plan) {
            log::error!("Failed to start plan execution: {}", e);
            return TickOutcome::PlanningFailed { target };
        }

        log::info!(
            "New plan found! Detailed plan: [time] [action] [duration]\n{}",
            plan.status_text()
        );
        self.status.push(StatusUpdate::Text(plan.status_text()));
        self.status.push(StatusUpdate::Plan(plan.clone()));
        self.current_plan = Some(plan);

        self.state = target;
        if target == ControllerState::Rescue {
            self.detection_pending = false;
        }
        self.committed = Some(Commitment {
            target,
            goals: decision.goals,
        });
        TickOutcome::Replanned { target }
    }

    /// A finished plan reached its goals: assert them as facts.
    fn apply_committed_goals(&mut self) -> Result<(), MissionError> {
        let Some(commitment) = self.committed.clone() else {
            return Ok(());
        };
        let drone = self.config.drone.name.clone();
        if let Some(location) = &commitment.goals.end_location {
            self.knowledge.remove_predicates_named("drone_at");
            self.knowledge
                .add_predicate(Predicate::new("drone_at", [drone.as_str(), location.as_str()]));
        }
        if commitment.goals.land {
            self.knowledge
                .remove_predicate(&Predicate::new("not_landed", [drone.as_str()]));
            self.knowledge
                .add_predicate(Predicate::new("landed", [drone.as_str()]));
        }
        for location in &commitment.goals.search_locations {
            self.on_search_finished(location);
        }
        for id in &commitment.goals.targets {
            self.mark_helped(*id)?;
        }
        log::debug!("Applied goals of the {} plan", commitment.target);
        Ok(())
    }

    fn log_replanning_state(&self) {
        let position = self.telemetry.position_ned();
        let velocity = &self.telemetry.velocity_body().linear;
        let flight_state = self
            .telemetry
            .flight_state()
            .map_or_else(|| "unknown".to_string(), |s| s.to_string());
        let plan = self
            .current_plan
            .as_ref()
            .map_or_else(String::new, Plan::status_text);
        log::info!(
            "Current system state:\n\
             Person detected: {}\n\
             Emergency occurred: {}\n\
             Low battery: {}\n\
             \n\
             NED-position: {{{} {} {}}}\n\
             BODY-velocity: {{{} {} {}}}\n\
             Flight state: {}\n\
             Battery percentage: {}\n\
             Num markers: {}\n\
             Num lifevests: {}\n\
             \n\
             Current plan:\n{}",
            self.detection_pending,
            self.events().emergency,
            self.low_battery(),
            position.x,
            position.y,
            position.z,
            velocity.x,
            velocity.y,
            velocity.z,
            flight_state,
            self.telemetry.battery_percent(),
            self.equipment.get(EquipmentKind::Marker),
            self.equipment.get(EquipmentKind::Lifevest),
            plan
        );
    }

    /// Status updates published since the last call
    pub fn drain_status(&mut self) -> Vec<StatusUpdate> {
        std::mem::take(&mut self.status)
    }

    /// Current problem in PDDL syntax
    pub fn problem_text(&self) -> String {
        self.knowledge.problem().to_pddl(
            &self.config.planner.problem_name,
            &self.config.planner.domain_name,
        )
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn config(&self) -> &MissionConfig {
        &self.config
    }

    pub fn locations(&self) -> &LocationMap {
        &self.locations
    }

    pub fn registry(&self) -> &DetectionRegistry {
        &self.registry
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn telemetry(&self) -> &TelemetrySnapshot {
        &self.telemetry
    }

    pub fn equipment(&self) -> &EquipmentCounters {
        &self.equipment
    }

    /// Goals of the committed plan, if any
    pub fn committed_goals(&self) -> Option<&MissionGoalSet> {
        self.committed.as_ref().map(|c| &c.goals)
    }

    pub fn current_plan(&self) -> Option<&Plan> {
        self.current_plan.as_ref()
    }

    pub fn planner(&self) -> &P {
        &self.planner
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::sample_config;
    use crate::knowledge::PlanningProblem;
    use crate::planner::{DryRunExecutor, NullPlanner, PlanItem, PlannerError};

    /// Returns a one-step plan and remembers the goals it was asked for
    #[derive(Default)]
    struct EchoPlanner {
        requests: Vec<String>,
    }

    impl PlannerFacade for EchoPlanner {
        fn solve(&mut self, problem: &PlanningProblem<'_>) -> Result<Option<Plan>, PlannerError> {
            self.requests.push(problem.goal_text());
            Ok(Some(Plan::new(vec![PlanItem::new(0.0, "(noop)", 1.0)])))
        }
    }

    fn ready<P: PlannerFacade>(planner: P) -> MissionSupervisor<P, DryRunExecutor> {
        let mut supervisor =
            MissionSupervisor::new(sample_config(), planner, DryRunExecutor::new()).unwrap();
        let telemetry = supervisor.telemetry_mut();
        telemetry.set_flight_state(FlightState::Landed);
        telemetry.set_battery_percent(90.0);
        supervisor.initialize().unwrap();
        supervisor
    }

    #[test]
    fn test_tick_before_initialize() {
        let mut supervisor =
            MissionSupervisor::new(sample_config(), NullPlanner, DryRunExecutor::new()).unwrap();
        assert!(matches!(supervisor.tick(), Err(MissionError::NotInitialized)));
    }

    #[test]
    fn test_initialize_requires_preconditions() {
        let mut supervisor =
            MissionSupervisor::new(sample_config(), NullPlanner, DryRunExecutor::new()).unwrap();
        let err = supervisor.initialize().unwrap_err();
        assert!(matches!(err, MissionError::StartupPreconditions(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_initial_knowledge() {
        let mut supervisor = ready(NullPlanner);
        let kb = supervisor.knowledge();
        assert!(kb.has_predicate(&Predicate::new("drone_at", ["drone1", "h1"])));
        assert!(kb.has_predicate(&Predicate::new("landed", ["drone1"])));
        assert!(kb.has_predicate(&Predicate::new("path", ["a1", "h1"])));
        assert_eq!(kb.function("num_markers", &["drone1"]), Some(2.0));
        assert_eq!(kb.function("battery_charge", &["drone1"]), Some(90.0));
        assert_eq!(
            supervisor.drain_status(),
            vec![StatusUpdate::Text("Starting".to_string())]
        );
    }

    #[test]
    fn test_detection_asserts_open_obligations() {
        let mut supervisor = ready(NullPlanner);
        let outcome = supervisor
            .on_person_detected(NedPoint::new(0.5, 19.0, 0.0), Severity::Moderate)
            .unwrap();
        assert_eq!(
            outcome,
            DetectionOutcome::Added {
                id: 0,
                location: "a2".to_string()
            }
        );
        let kb = supervisor.knowledge();
        assert!(kb.has_instance("p0"));
        assert!(kb.has_predicate(&Predicate::new("person_at", ["p0", "a2"])));
        assert!(kb.has_predicate(&Predicate::new("not_marked", ["p0", "a2"])));
        assert!(kb.has_predicate(&Predicate::new("not_communicated", ["p0", "a2"])));
        assert!(!kb.has_predicate(&Predicate::new("not_rescued", ["p0", "a2"])));
        assert!(supervisor.events().detection_pending);
    }

    #[test]
    fn test_unresolved_detection_discarded() {
        let mut supervisor = ready(NullPlanner);
        let outcome = supervisor
            .on_person_detected(NedPoint::new(10.0, 10.0, 0.0), Severity::High)
            .unwrap();
        assert_eq!(outcome, DetectionOutcome::Unresolved);
        assert!(supervisor.registry().is_empty());
        assert!(!supervisor.events().detection_pending);
    }

    #[test]
    fn test_planning_failure_keeps_state() {
        let mut supervisor = ready(NullPlanner);
        assert_eq!(
            supervisor.tick().unwrap(),
            TickOutcome::PlanningFailed {
                target: ControllerState::Search
            }
        );
        assert_eq!(supervisor.state(), ControllerState::Init);
        assert!(supervisor.committed_goals().is_none());
        // Retried on the next tick
        assert_eq!(
            supervisor.tick().unwrap(),
            TickOutcome::PlanningFailed {
                target: ControllerState::Search
            }
        );
    }

    #[test]
    fn test_successful_rescue_marks_people_helped() {
        let mut supervisor = ready(EchoPlanner::default());
        supervisor
            .on_person_detected(NedPoint::new(20.0, 1.0, 0.0), Severity::High)
            .unwrap();
        assert_eq!(
            supervisor.tick().unwrap(),
            TickOutcome::Replanned {
                target: ControllerState::Rescue
            }
        );
        assert!(!supervisor.events().detection_pending);

        supervisor.executor_mut().succeed();
        assert_eq!(supervisor.tick().unwrap(), TickOutcome::Steady);
        assert!(supervisor.registry().get(0).unwrap().helped());
        let kb = supervisor.knowledge();
        assert!(kb.has_predicate(&Predicate::new("rescued", ["p0", "a1"])));
        assert!(!kb.has_predicate(&Predicate::new("not_rescued", ["p0", "a1"])));

        // Seeing the same person again is a contradiction
        let err = supervisor
            .on_person_detected(NedPoint::new(20.5, 1.0, 0.0), Severity::High)
            .unwrap_err();
        assert!(matches!(err, MissionError::Consistency(_)));
    }

    #[test]
    fn test_low_battery_raises_emergency() {
        let mut supervisor = ready(EchoPlanner::default());
        supervisor.tick().unwrap();
        assert_eq!(supervisor.state(), ControllerState::Search);

        supervisor.on_telemetry(&TelemetryUpdate::Battery { percent: 5.0 });
        assert!(supervisor.events().emergency);
        assert_eq!(
            supervisor.tick().unwrap(),
            TickOutcome::Replanned {
                target: ControllerState::Emergency
            }
        );
        assert_eq!(supervisor.tick().unwrap(), TickOutcome::Steady);
        assert_eq!(supervisor.planner().requests.len(), 2);
    }

    #[test]
    fn test_set_equipment_updates_functions_on_replan() {
        let mut supervisor = ready(EchoPlanner::default());
        assert!(supervisor.set_equipment(EquipmentKind::Marker, 0));
        supervisor.tick().unwrap();
        assert_eq!(
            supervisor.knowledge().function("num_markers", &["drone1"]),
            Some(0.0)
        );
    }
}
