use itertools::Itertools;
use std::fmt::Write;

use super::{GoalSet, KnowledgeBase, NumericFact, Predicate};

/// Read-only view of the knowledge base handed to a planner
#[derive(Debug, Clone, Copy)]
pub struct PlanningProblem<'a> {
    kb: &'a KnowledgeBase,
}

impl<'a> PlanningProblem<'a> {
    pub(super) fn new(kb: &'a KnowledgeBase) -> Self {
        Self { kb }
    }

    pub fn goals(&self) -> &'a GoalSet {
        self.kb.goals()
    }

    pub fn facts(&self) -> impl Iterator<Item = &'a Predicate> {
        self.kb.predicates()
    }

    pub fn functions(&self) -> impl Iterator<Item = NumericFact> + 'a {
        self.kb.functions()
    }

    /// Goal conjunction as one line, e.g. `(and (rescued p0 a1) (marked p0 a1))`
    pub fn goal_text(&self) -> String {
        format!("(and {})", self.goals().iter().join(" "))
    }

    /// Render the problem in PDDL syntax.
    pub fn to_pddl(&self, problem_name: &str, domain_name: &str) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = writeln!(out, "(define (problem {})", problem_name);
        let _ = writeln!(out, "  (:domain {})", domain_name);

        let objects = self
            .kb
            .instances()
            .map(|i| (i.kind.as_str(), i.name.as_str()))
            .into_group_map();
        let _ = writeln!(out, "  (:objects");
        for (kind, names) in objects.into_iter().sorted_by(|a, b| a.0.cmp(b.0)) {
            let _ = writeln!(out, "    {} - {}", names.iter().join(" "), kind);
        }
        let _ = writeln!(out, "  )");

        let _ = writeln!(out, "  (:init");
        for fact in self.facts() {
            let _ = writeln!(out, "    {}", fact);
        }
        for function in self.functions() {
            let _ = writeln!(out, "    {}", function);
        }
        let _ = writeln!(out, "  )");

        let _ = writeln!(out, "  (:goal {})", self.goal_text());
        out.push_str(")\n");
        out
    }
}
