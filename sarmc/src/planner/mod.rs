//! External planning collaborators
//!
//! The supervisor never searches for plans itself. It hands a
//! [`PlanningProblem`] to a [`PlannerFacade`] and gives the resulting [`Plan`]
//! to a [`PlanExecutor`], which dispatches actions and reports back through
//! [`ExecutionStatus`].
//!
//! # Architecture
//!
//! - `command`: runs an external planner binary on a rendered problem file
//! - `dry_run`: plan executor that only records plans and finishes on demand
//! - `parse`: reads `time: (action args) [duration]` plan output

pub mod command;
pub mod dry_run;
pub mod parse;

pub use command::CommandPlanner;
pub use dry_run::DryRunExecutor;
pub use parse::parse_plan_output;

use std::fmt;
use thiserror::Error;

use crate::knowledge::PlanningProblem;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("Planner I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Planner command failed with status {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },

    #[error("Planner not configured: {0}")]
    NotConfigured(String),

    #[error("Failed to parse plan line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Plan execution error: {0}")]
    Execution(String),
}

/// One scheduled action of a plan
#[derive(Debug, Clone, PartialEq)]
pub struct PlanItem {
    pub time: f64,
    /// Action with arguments, e.g. `(move drone1 h1 a1)`
    pub action: String,
    pub duration: f64,
}

impl PlanItem {
    pub fn new(time: f64, action: impl Into<String>, duration: f64) -> Self {
        Self {
            time,
            action: action.into(),
            duration,
        }
    }

    /// Action name without parentheses or arguments
    pub fn action_name(&self) -> &str {
        self.action
            .trim_start_matches('(')
            .split_whitespace()
            .next()
            .unwrap_or("")
            .trim_end_matches(')')
    }

    /// Action arguments without the name
    pub fn arguments(&self) -> Vec<String> {
        self.action
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split_whitespace()
            .skip(1)
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub items: Vec<PlanItem>,
}

impl Plan {
    pub fn new(items: Vec<PlanItem>) -> Self {
        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// One `time\taction\tduration` line per item
    pub fn status_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            writeln!(f, "{}\t{}\t{}", item.time, item.action, item.duration)?;
        }
        Ok(())
    }
}

/// Symbolic planner. `Ok(None)` means no plan exists for the problem.
pub trait PlannerFacade {
    fn solve(&mut self, problem: &PlanningProblem<'_>) -> Result<Option<Plan>, PlannerError>;
}

impl<T: PlannerFacade + ?Sized> PlannerFacade for Box<T> {
    fn solve(&mut self, problem: &PlanningProblem<'_>) -> Result<Option<Plan>, PlannerError> {
        (**self).solve(problem)
    }
}

/// Planner that never finds a plan
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPlanner;

impl PlannerFacade for NullPlanner {
    fn solve(&mut self, _problem: &PlanningProblem<'_>) -> Result<Option<Plan>, PlannerError> {
        Ok(None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionProgress {
    pub action: String,
    /// 0.0 ..= 1.0
    pub progress: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionFailure {
    pub action: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionStatus {
    Idle,
    Running { progress: Vec<ActionProgress> },
    Succeeded,
    Failed { failures: Vec<ActionFailure> },
}

/// Runs a plan by dispatching its actions.
pub trait PlanExecutor {
    fn start(&mut self, plan: &Plan) -> Result<(), PlannerError>;

    /// Stop the running plan. Calling it with nothing running is a no-op.
    fn cancel(&mut self);

    /// Report the current status. A terminal status (`Succeeded`/`Failed`) is
    /// reported once; the executor is `Idle` afterwards.
    fn poll(&mut self) -> ExecutionStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_lines() {
        let plan = Plan::new(vec![
            PlanItem::new(0.0, "(move drone1 h1 a1)", 10.0),
            PlanItem::new(10.001, "(search drone1 a1)", 30.5),
        ]);
        assert_eq!(
            plan.status_text(),
            "0\t(move drone1 h1 a1)\t10\n10.001\t(search drone1 a1)\t30.5\n"
        );
    }

    #[test]
    fn test_item_name_and_arguments() {
        let item = PlanItem::new(0.0, "(drop_marker drone1 p0 a1)", 1.0);
        assert_eq!(item.action_name(), "drop_marker");
        assert_eq!(item.arguments(), vec!["drone1", "p0", "a1"]);
    }
}
