use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordinal classification of a detected person
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Minor,
    Moderate,
    High,
}

impl Severity {
    /// Numeric level used by the detection feed (0 = minor).
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Severity::Minor),
            1 => Some(Severity::Moderate),
            2 => Some(Severity::High),
            _ => None,
        }
    }

    /// Obligations this severity creates, most demanding first.
    pub fn obligations(self) -> &'static [Obligation] {
        SEVERITY_RULES
            .iter()
            .find(|(severity, _)| *severity == self)
            .map(|(_, obligations)| *obligations)
            .unwrap_or(&[])
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Minor => "MINOR",
            Severity::Moderate => "MODERATE",
            Severity::High => "HIGH",
        };
        f.write_str(name)
    }
}

/// Something the mission owes a detected person
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Obligation {
    Rescued,
    Marked,
    Communicated,
}

impl Obligation {
    /// Goal predicate name, e.g. `(rescued p0 a1)`
    pub fn goal_predicate(self) -> &'static str {
        match self {
            Obligation::Rescued => "rescued",
            Obligation::Marked => "marked",
            Obligation::Communicated => "communicated",
        }
    }

    /// Fact asserted while the obligation is open, e.g. `(not_rescued p0 a1)`
    pub fn open_predicate(self) -> &'static str {
        match self {
            Obligation::Rescued => "not_rescued",
            Obligation::Marked => "not_marked",
            Obligation::Communicated => "not_communicated",
        }
    }
}

/// Higher severity implies every obligation of the lower ones.
pub const SEVERITY_RULES: &[(Severity, &[Obligation])] = &[
    (
        Severity::High,
        &[Obligation::Rescued, Obligation::Marked, Obligation::Communicated],
    ),
    (
        Severity::Moderate,
        &[Obligation::Marked, Obligation::Communicated],
    ),
    (Severity::Minor, &[Obligation::Communicated]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cascade_sizes() {
        assert_eq!(Severity::High.obligations().len(), 3);
        assert_eq!(Severity::Moderate.obligations().len(), 2);
        assert_eq!(Severity::Minor.obligations().len(), 1);
    }

    #[test]
    fn test_cascade_is_nested() {
        let high = Severity::High.obligations();
        let moderate = Severity::Moderate.obligations();
        let minor = Severity::Minor.obligations();
        assert!(moderate.iter().all(|o| high.contains(o)));
        assert!(minor.iter().all(|o| moderate.contains(o)));
    }

    #[test]
    fn test_ordering_and_levels() {
        assert!(Severity::Minor < Severity::Moderate);
        assert!(Severity::Moderate < Severity::High);
        assert_eq!(Severity::from_level(2), Some(Severity::High));
        assert_eq!(Severity::from_level(3), None);
    }

    #[test]
    fn test_serde_uses_uppercase_names() {
        let severity: Severity = serde_json::from_str("\"MODERATE\"").unwrap();
        assert_eq!(severity, Severity::Moderate);
    }
}
