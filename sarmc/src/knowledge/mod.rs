//! Symbolic knowledge base
//!
//! Holds the instances, ground predicates, numeric functions and goals that
//! make up a planning problem. The supervisor is the only writer.
//!
//! # Architecture
//!
//! Facts and goals are kept in ordered sets so that the same mission state
//! always renders to the same problem text, and so that re-adding a fact or a
//! goal is a no-op.

mod problem;

pub use problem::PlanningProblem;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Ground predicate such as `(drone_at drone1 h1)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Predicate {
    pub name: String,
    pub args: Vec<String>,
}

impl Predicate {
    pub fn new<I, T>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.name)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        f.write_str(")")
    }
}

/// Typed object of the planning problem
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instance {
    pub name: String,
    pub kind: String,
}

impl Instance {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }
}

/// Numeric fluent, e.g. `(= (battery_charge drone1) 87)`
#[derive(Debug, Clone, PartialEq)]
pub struct NumericFact {
    pub name: String,
    pub args: Vec<String>,
    pub value: f64,
}

impl fmt::Display for NumericFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(= ({}", self.name)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        write!(f, ") {})", self.value)
    }
}

pub type GoalSet = BTreeSet<Predicate>;

#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    instances: BTreeSet<Instance>,
    predicates: BTreeSet<Predicate>,
    functions: BTreeMap<(String, Vec<String>), f64>,
    goals: GoalSet,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.instances.clear();
        self.predicates.clear();
        self.functions.clear();
        self.goals.clear();
    }

    /// Returns `false` if the instance already existed.
    pub fn add_instance(&mut self, name: impl Into<String>, kind: impl Into<String>) -> bool {
        self.instances.insert(Instance::new(name, kind))
    }

    pub fn has_instance(&self, name: &str) -> bool {
        self.instances.iter().any(|i| i.name == name)
    }

    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances.iter()
    }

    pub fn add_predicate(&mut self, predicate: Predicate) -> bool {
        self.predicates.insert(predicate)
    }

    pub fn remove_predicate(&mut self, predicate: &Predicate) -> bool {
        self.predicates.remove(predicate)
    }

    /// Remove every predicate with the given name. Returns how many went.
    pub fn remove_predicates_named(&mut self, name: &str) -> usize {
        let before = self.predicates.len();
        self.predicates.retain(|p| p.name != name);
        before - self.predicates.len()
    }

    pub fn has_predicate(&self, predicate: &Predicate) -> bool {
        self.predicates.contains(predicate)
    }

    pub fn predicates(&self) -> impl Iterator<Item = &Predicate> {
        self.predicates.iter()
    }

    pub fn set_function<I, T>(&mut self, name: impl Into<String>, args: I, value: f64)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let args = args.into_iter().map(Into::into).collect();
        self.functions.insert((name.into(), args), value);
    }

    pub fn function(&self, name: &str, args: &[&str]) -> Option<f64> {
        self.functions
            .iter()
            .find(|((n, a), _)| n == name && a.iter().map(String::as_str).eq(args.iter().copied()))
            .map(|(_, value)| *value)
    }

    pub fn clear_functions(&mut self) {
        self.functions.clear();
    }

    pub fn functions(&self) -> impl Iterator<Item = NumericFact> + '_ {
        self.functions.iter().map(|((name, args), value)| NumericFact {
            name: name.clone(),
            args: args.clone(),
            value: *value,
        })
    }

    pub fn set_goals(&mut self, goals: GoalSet) {
        self.goals = goals;
    }

    pub fn goals(&self) -> &GoalSet {
        &self.goals
    }

    pub fn problem(&self) -> PlanningProblem<'_> {
        PlanningProblem::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicate_display() {
        let p = Predicate::new("drone_at", ["drone1", "h1"]);
        assert_eq!(p.to_string(), "(drone_at drone1 h1)");
        let bare = Predicate::new("searched", Vec::<String>::new());
        assert_eq!(bare.to_string(), "(searched)");
    }

    #[test]
    fn test_facts_form_a_set() {
        let mut kb = KnowledgeBase::new();
        assert!(kb.add_predicate(Predicate::new("landed", ["drone1"])));
        assert!(!kb.add_predicate(Predicate::new("landed", ["drone1"])));
        assert_eq!(kb.predicates().count(), 1);
        assert!(kb.remove_predicate(&Predicate::new("landed", ["drone1"])));
        assert!(!kb.has_predicate(&Predicate::new("landed", ["drone1"])));
    }

    #[test]
    fn test_remove_predicates_named() {
        let mut kb = KnowledgeBase::new();
        kb.add_predicate(Predicate::new("drone_at", ["d", "h1"]));
        kb.add_predicate(Predicate::new("drone_at", ["d", "a1"]));
        kb.add_predicate(Predicate::new("landed", ["d"]));
        assert_eq!(kb.remove_predicates_named("drone_at"), 2);
        assert_eq!(kb.predicates().count(), 1);
    }

    #[test]
    fn test_functions_are_replaced() {
        let mut kb = KnowledgeBase::new();
        kb.set_function("num_markers", ["d"], 2.0);
        kb.set_function("num_markers", ["d"], 1.0);
        assert_eq!(kb.function("num_markers", &["d"]), Some(1.0));
        assert_eq!(
            kb.functions().next().map(|f| f.to_string()),
            Some("(= (num_markers d) 1)".to_string())
        );
        kb.clear_functions();
        assert_eq!(kb.function("num_markers", &["d"]), None);
    }
}
