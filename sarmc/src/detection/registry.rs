use thiserror::Error;

use super::Severity;
use crate::telemetry::{horizontal_distance, NedPoint};

/// Detections within this horizontal distance are the same person.
pub const DEFAULT_DEDUP_RADIUS: f64 = 2.5;

/// Dense identifier, assigned in insertion order starting at 0
pub type PersonId = u32;

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedPerson {
    pub id: PersonId,
    pub position: NedPoint,
    pub severity: Severity,
    helped: bool,
}

impl DetectedPerson {
    /// Symbol used for this person in planning problems
    pub fn symbol(&self) -> String {
        person_symbol(self.id)
    }

    pub fn helped(&self) -> bool {
        self.helped
    }
}

pub fn person_symbol(id: PersonId) -> String {
    format!("p{}", id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Created(PersonId),
    Duplicate(PersonId),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConsistencyViolation {
    #[error("Detection at ({north:.2}, {east:.2}) matches p{id}, which is already helped")]
    HelpedReopened { id: PersonId, north: f64, east: f64 },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown person: p{0}")]
    UnknownPerson(PersonId),
}

/// Every person detected during the mission. Entries are never removed.
#[derive(Debug, Clone)]
pub struct DetectionRegistry {
    people: Vec<DetectedPerson>,
    dedup_radius: f64,
}

impl Default for DetectionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_RADIUS)
    }
}

impl DetectionRegistry {
    pub fn new(dedup_radius: f64) -> Self {
        Self {
            people: Vec::new(),
            dedup_radius,
        }
    }

    /// First registered person within the dedup radius of `position`
    pub fn find_match(&self, position: &NedPoint) -> Option<&DetectedPerson> {
        self.people
            .iter()
            .find(|p| horizontal_distance(&p.position, position) <= self.dedup_radius)
    }

    /// Register a detection unless it duplicates an existing person.
    ///
    /// A duplicate of an unhelped person leaves the registry unchanged. A
    /// duplicate of a helped person is rejected: help state never goes back.
    pub fn insert(
        &mut self,
        position: NedPoint,
        severity: Severity,
    ) -> Result<Insertion, ConsistencyViolation> {
        if let Some(existing) = self.find_match(&position) {
            if existing.helped {
                return Err(ConsistencyViolation::HelpedReopened {
                    id: existing.id,
                    north: position.x,
                    east: position.y,
                });
            }
            return Ok(Insertion::Duplicate(existing.id));
        }

        let id = self.people.len() as PersonId;
        self.people.push(DetectedPerson {
            id,
            position,
            severity,
            helped: false,
        });
        Ok(Insertion::Created(id))
    }

    /// Returns `true` if the person was not helped before.
    pub fn mark_helped(&mut self, id: PersonId) -> Result<bool, RegistryError> {
        let person = self
            .people
            .get_mut(id as usize)
            .ok_or(RegistryError::UnknownPerson(id))?;
        let changed = !person.helped;
        person.helped = true;
        Ok(changed)
    }

    pub fn get(&self, id: PersonId) -> Option<&DetectedPerson> {
        self.people.get(id as usize)
    }

    pub fn unhelped(&self) -> impl Iterator<Item = &DetectedPerson> {
        self.people.iter().filter(|p| !p.helped)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DetectedPerson> {
        self.people.iter()
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }
}
