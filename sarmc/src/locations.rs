//! Named mission locations
//!
//! Every symbolic location used by the planner has a fixed NED point. The map
//! also resolves a continuous position back to a location name, which is how
//! detections become symbolic facts.

use std::collections::BTreeMap;

use crate::config::{ConfigError, LocationsConfig};
use crate::telemetry::{horizontal_distance, NedPoint};

#[derive(Debug, Clone)]
pub struct LocationMap {
    /// Names in configuration order
    names: Vec<String>,
    points: BTreeMap<String, NedPoint>,
    paths: Vec<(String, String)>,
    acceptance_radius: f64,
}

impl LocationMap {
    pub fn from_config(config: &LocationsConfig) -> Result<Self, ConfigError> {
        let mut points = BTreeMap::new();
        for name in &config.names {
            let [north, east] = config
                .pos_ne
                .get(name)
                .ok_or_else(|| ConfigError::Missing(format!("locations.pos_ne.{}", name)))?;
            points.insert(name.clone(), NedPoint::new(*north, *east, -config.altitude_m));
        }

        let mut paths = Vec::new();
        for name in &config.names {
            if let Some(targets) = config.paths.get(name) {
                for to in targets {
                    paths.push((name.clone(), to.clone()));
                }
            }
        }

        Ok(Self {
            names: config.names.clone(),
            points,
            paths,
            acceptance_radius: config.location_radius_m,
        })
    }

    pub fn get(&self, name: &str) -> Option<&NedPoint> {
        self.points.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.points.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Directed connectivity pairs in configuration order
    pub fn paths(&self) -> &[(String, String)] {
        &self.paths
    }

    pub fn acceptance_radius(&self) -> f64 {
        self.acceptance_radius
    }

    /// Nearest location whose horizontal distance to `position` is within the
    /// acceptance radius. Ties go to the location configured first.
    pub fn resolve(&self, position: &NedPoint) -> Option<&str> {
        let mut best: Option<(&str, f64)> = None;
        for name in &self.names {
            let Some(point) = self.points.get(name) else {
                continue;
            };
            let distance = horizontal_distance(point, position);
            if distance > self.acceptance_radius {
                continue;
            }
            match best {
                Some((_, best_distance)) if best_distance <= distance => {}
                _ => best = Some((name.as_str(), distance)),
            }
        }
        best.map(|(name, _)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::sample_config;

    fn map() -> LocationMap {
        LocationMap::from_config(&sample_config().locations).unwrap()
    }

    #[test]
    fn test_points_use_holding_altitude() {
        let map = map();
        assert_eq!(map.get("a1"), Some(&NedPoint::new(20.0, 0.0, -5.0)));
        assert!(map.get("zz").is_none());
    }

    #[test]
    fn test_resolve_within_radius() {
        let map = map();
        assert_eq!(map.resolve(&NedPoint::new(19.0, 1.0, 0.0)), Some("a1"));
        assert_eq!(map.resolve(&NedPoint::new(10.0, 10.0, 0.0)), None);
    }

    #[test]
    fn test_resolve_prefers_nearest() {
        let mut config = sample_config().locations;
        config.location_radius_m = 30.0;
        let map = LocationMap::from_config(&config).unwrap();
        assert_eq!(map.resolve(&NedPoint::new(14.0, 0.0, 0.0)), Some("a1"));
        assert_eq!(map.resolve(&NedPoint::new(6.0, 0.0, 0.0)), Some("h1"));
    }

    #[test]
    fn test_paths_in_config_order() {
        let map = map();
        assert_eq!(
            map.paths()[0],
            ("h1".to_string(), "a1".to_string())
        );
        assert_eq!(map.paths().len(), 4);
    }
}
