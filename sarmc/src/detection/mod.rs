//! Rescue-target detections
//!
//! The registry deduplicates detections by proximity and keeps every person
//! ever seen for the duration of the mission. Severity decides which symbolic
//! obligations (communicate, mark, rescue) a person creates; that mapping is
//! the explicit rule table [`SEVERITY_RULES`].

mod registry;
mod severity;

pub use registry::{
    person_symbol, ConsistencyViolation, DetectedPerson, DetectionRegistry, Insertion, PersonId,
    RegistryError, DEFAULT_DEDUP_RADIUS,
};
pub use severity::{Obligation, Severity, SEVERITY_RULES};
