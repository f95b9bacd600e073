//! Onboard payload counters

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::PayloadConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentKind {
    Marker,
    Lifevest,
}

impl EquipmentKind {
    /// Numeric function name used in planning problems
    pub fn function_name(&self) -> &'static str {
        match self {
            EquipmentKind::Marker => "num_markers",
            EquipmentKind::Lifevest => "num_lifevests",
        }
    }
}

impl fmt::Display for EquipmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EquipmentKind::Marker => f.write_str("marker"),
            EquipmentKind::Lifevest => f.write_str("lifevest"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EquipmentError {
    #[error("No {0} left on board")]
    Exhausted(EquipmentKind),
}

/// Remaining markers and life vests. Counts never go below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EquipmentCounters {
    markers: u32,
    lifevests: u32,
}

impl EquipmentCounters {
    pub fn new(markers: u32, lifevests: u32) -> Self {
        Self { markers, lifevests }
    }

    pub fn from_payload(payload: &PayloadConfig) -> Self {
        Self::new(payload.num_markers, payload.num_lifevests)
    }

    pub fn get(&self, kind: EquipmentKind) -> u32 {
        match kind {
            EquipmentKind::Marker => self.markers,
            EquipmentKind::Lifevest => self.lifevests,
        }
    }

    pub fn set(&mut self, kind: EquipmentKind, count: u32) {
        match kind {
            EquipmentKind::Marker => self.markers = count,
            EquipmentKind::Lifevest => self.lifevests = count,
        }
    }

    /// Take one item, returning how many remain.
    pub fn try_take(&mut self, kind: EquipmentKind) -> Result<u32, EquipmentError> {
        let remaining = self
            .get(kind)
            .checked_sub(1)
            .ok_or(EquipmentError::Exhausted(kind))?;
        self.set(kind, remaining);
        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_until_exhausted() {
        let mut counters = EquipmentCounters::new(1, 0);
        assert_eq!(counters.try_take(EquipmentKind::Marker), Ok(0));
        assert_eq!(
            counters.try_take(EquipmentKind::Marker),
            Err(EquipmentError::Exhausted(EquipmentKind::Marker))
        );
        assert_eq!(counters.get(EquipmentKind::Marker), 0);
        assert!(counters.try_take(EquipmentKind::Lifevest).is_err());
    }

    #[test]
    fn test_function_names() {
        assert_eq!(EquipmentKind::Marker.function_name(), "num_markers");
        assert_eq!(EquipmentKind::Lifevest.function_name(), "num_lifevests");
    }
}
