//! End-to-end supervisor scenarios through the public API

use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::io::Write;

use sarmc::detection::Severity;
use sarmc::knowledge::{GoalSet, PlanningProblem, Predicate};
use sarmc::planner::{DryRunExecutor, NullPlanner, Plan, PlanItem, PlannerError, PlannerFacade};
use sarmc::supervisor::TickOutcome;
use sarmc::telemetry::{FlightState, NedPoint};
use sarmc::{ControllerState, MissionConfig, MissionError, MissionSupervisor};

const MISSION: &str = r#"
[drone]
name = "drone1"

[locations]
names = ["h1", "a1", "a2"]
location_radius_m = 3.0

[locations.pos_ne]
h1 = [0.0, 0.0]
a1 = [20.0, 0.0]
a2 = [0.0, 20.0]

[locations.paths]
h1 = ["a1", "a2"]
a1 = ["h1"]
a2 = ["h1"]

[mission_init]
start_location = "h1"

[mission_init.payload]
num_markers = 2
num_lifevests = 1

[mission_goals]
preferred_landing_location = "h1"
locations_to_search = ["a1", "a2"]
include_search_goals = true
"#;

/// Records the goals of every problem and always returns a one-step plan
#[derive(Default)]
struct RecordingPlanner {
    goals: Vec<GoalSet>,
}

impl PlannerFacade for RecordingPlanner {
    fn solve(&mut self, problem: &PlanningProblem<'_>) -> Result<Option<Plan>, PlannerError> {
        self.goals.push(problem.goals().clone());
        Ok(Some(Plan::new(vec![PlanItem::new(
            0.0,
            "(move drone1 h1 a1)",
            10.0,
        )])))
    }
}

fn load_config() -> MissionConfig {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(MISSION.as_bytes()).unwrap();
    MissionConfig::from_file(file.path()).unwrap()
}

fn ready<P: PlannerFacade>(planner: P) -> MissionSupervisor<P, DryRunExecutor> {
    let mut supervisor = MissionSupervisor::new(load_config(), planner, DryRunExecutor::new()).unwrap();
    let telemetry = supervisor.telemetry_mut();
    telemetry.set_flight_state(FlightState::Landed);
    telemetry.set_battery_percent(80.0);
    supervisor.initialize().unwrap();
    supervisor
}

fn predicate(name: &str, args: &[&str]) -> Predicate {
    Predicate::new(name, args.iter().copied())
}

#[test]
fn test_search_plan_goals() {
    let mut supervisor = ready(RecordingPlanner::default());
    assert_eq!(
        supervisor.tick().unwrap(),
        TickOutcome::Replanned {
            target: ControllerState::Search
        }
    );
    let expected: GoalSet = BTreeSet::from([
        predicate("drone_at", &["drone1", "h1"]),
        predicate("searched", &["a1"]),
        predicate("searched", &["a2"]),
    ]);
    assert_eq!(supervisor.planner().goals, vec![expected]);
}

#[test]
fn test_detection_cascade_scenario() {
    let mut supervisor = ready(RecordingPlanner::default());
    supervisor.tick().unwrap();

    supervisor
        .on_person_detected(NedPoint::new(20.0, 1.0, 0.0), Severity::High)
        .unwrap();
    assert_eq!(
        supervisor.tick().unwrap(),
        TickOutcome::Replanned {
            target: ControllerState::Rescue
        }
    );

    let expected: GoalSet = BTreeSet::from([
        predicate("rescued", &["p0", "a1"]),
        predicate("marked", &["p0", "a1"]),
        predicate("communicated", &["p0", "a1"]),
    ]);
    assert_eq!(supervisor.knowledge().goals(), &expected);
    assert!(supervisor
        .knowledge()
        .has_predicate(&predicate("person_at", &["p0", "a1"])));
    assert!(supervisor
        .knowledge()
        .has_predicate(&predicate("not_rescued", &["p0", "a1"])));
}

#[test]
fn test_detection_takes_precedence_over_emergency() {
    let mut supervisor = ready(RecordingPlanner::default());
    supervisor.tick().unwrap();

    supervisor.raise_emergency();
    supervisor
        .on_person_detected(NedPoint::new(0.0, 19.0, 0.0), Severity::Minor)
        .unwrap();
    supervisor.tick().unwrap();
    assert_eq!(supervisor.state(), ControllerState::Rescue);

    // The emergency is still pending and wins on the following tick
    supervisor.tick().unwrap();
    assert_eq!(supervisor.state(), ControllerState::Emergency);
    let goals = supervisor.knowledge().goals();
    assert!(goals.contains(&predicate("drone_at", &["drone1", "h1"])));
    assert!(!goals.iter().any(|goal| goal.name == "searched"));
}

#[test]
fn test_planning_failure_keeps_state() {
    let mut supervisor = ready(NullPlanner);
    for _ in 0..3 {
        assert_eq!(
            supervisor.tick().unwrap(),
            TickOutcome::PlanningFailed {
                target: ControllerState::Search
            }
        );
        assert_eq!(supervisor.state(), ControllerState::Init);
    }
    assert!(supervisor.current_plan().is_none());
}

#[test]
fn test_pending_detection_retried_after_planning_failure() {
    struct FailOnce {
        calls: usize,
    }

    impl PlannerFacade for FailOnce {
        fn solve(&mut self, _problem: &PlanningProblem<'_>) -> Result<Option<Plan>, PlannerError> {
            self.calls += 1;
            if self.calls == 2 {
                return Ok(None);
            }
            Ok(Some(Plan::new(vec![PlanItem::new(0.0, "(noop)", 1.0)])))
        }
    }

    let mut supervisor = ready(FailOnce { calls: 0 });
    supervisor.tick().unwrap();
    supervisor
        .on_person_detected(NedPoint::new(20.0, 0.0, 0.0), Severity::Moderate)
        .unwrap();

    assert_eq!(
        supervisor.tick().unwrap(),
        TickOutcome::PlanningFailed {
            target: ControllerState::Rescue
        }
    );
    assert_eq!(supervisor.state(), ControllerState::Search);
    assert_eq!(
        supervisor.tick().unwrap(),
        TickOutcome::Replanned {
            target: ControllerState::Rescue
        }
    );
}

#[test]
fn test_helped_person_never_reopened() {
    let mut supervisor = ready(RecordingPlanner::default());
    supervisor.tick().unwrap();
    supervisor
        .on_person_detected(NedPoint::new(20.0, 1.0, 0.0), Severity::High)
        .unwrap();
    supervisor.tick().unwrap();

    supervisor.executor_mut().succeed();
    assert_eq!(supervisor.tick().unwrap(), TickOutcome::Steady);

    let person = supervisor.registry().get(0).unwrap();
    assert!(person.helped());
    let knowledge = supervisor.knowledge();
    assert!(knowledge.has_predicate(&predicate("rescued", &["p0", "a1"])));
    assert!(!knowledge.has_predicate(&predicate("not_rescued", &["p0", "a1"])));

    let result = supervisor.on_person_detected(NedPoint::new(21.0, 1.0, 0.0), Severity::High);
    assert!(matches!(result, Err(MissionError::Consistency(_))));
    assert!(result.unwrap_err().is_fatal());
    assert!(supervisor.registry().get(0).unwrap().helped());
}

#[test]
fn test_nearby_detection_is_deduplicated() {
    let mut supervisor = ready(RecordingPlanner::default());
    supervisor
        .on_person_detected(NedPoint::new(20.0, 0.0, 0.0), Severity::Minor)
        .unwrap();
    supervisor
        .on_person_detected(NedPoint::new(22.5, 0.0, 0.0), Severity::High)
        .unwrap();
    supervisor
        .on_person_detected(NedPoint::new(20.0, 2.6, 0.0), Severity::High)
        .unwrap();
    assert_eq!(supervisor.registry().len(), 2);
}

#[test]
fn test_search_finished_is_not_searched_again() {
    let mut supervisor = ready(RecordingPlanner::default());
    assert!(supervisor.on_search_finished("a1"));
    assert!(!supervisor.on_search_finished("nowhere"));
    supervisor.tick().unwrap();

    let goals = &supervisor.planner().goals[0];
    assert!(!goals.contains(&predicate("searched", &["a1"])));
    assert!(goals.contains(&predicate("searched", &["a2"])));
}
