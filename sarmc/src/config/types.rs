use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use validator::Validate;

use crate::detection::Severity;

/// Errors raised while loading or checking a [`MissionConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid value for {var}: {value}")]
    Override { var: String, value: String },

    #[error("Missing required parameter: {0}")]
    Missing(String),

    #[error("Unknown location '{location}' referenced by {field}")]
    UnknownLocation { field: String, location: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Complete configuration for a mission run
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MissionConfig {
    #[validate(nested)]
    pub drone: DroneConfig,
    #[validate(nested)]
    pub locations: LocationsConfig,
    #[validate(nested)]
    pub mission_init: MissionInitConfig,
    #[validate(nested)]
    pub mission_goals: MissionGoalsConfig,
    #[serde(default)]
    #[validate(nested)]
    pub startup: StartupConfig,
    #[serde(default)]
    #[validate(nested)]
    pub emergency: EmergencyConfig,
    #[serde(default)]
    #[validate(nested)]
    pub actions: ActionsConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    #[validate(nested)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DroneConfig {
    /// Symbolic instance name of the vehicle
    #[validate(length(min = 1))]
    pub name: String,
}

/// Named locations and their connectivity
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LocationsConfig {
    #[validate(length(min = 1))]
    pub names: Vec<String>,
    /// North/east coordinates per location name
    pub pos_ne: BTreeMap<String, [f64; 2]>,
    /// Directed paths: `from -> [to, ...]`
    #[serde(default)]
    pub paths: BTreeMap<String, Vec<String>>,
    /// Radius within which a position resolves to a named location
    #[validate(range(min = 0.0))]
    pub location_radius_m: f64,
    /// Holding altitude above the NED origin for every location
    #[serde(default = "default_altitude_m")]
    #[validate(range(min = 0.0))]
    pub altitude_m: f64,
}

fn default_altitude_m() -> f64 {
    5.0
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MissionInitConfig {
    #[validate(length(min = 1))]
    pub start_location: String,
    #[serde(default)]
    pub payload: PayloadConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayloadConfig {
    pub num_markers: u32,
    pub num_lifevests: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MissionGoalsConfig {
    /// Require the drone to be landed at the end of a search or emergency plan
    #[serde(default)]
    pub drone_landed: bool,
    #[validate(length(min = 1))]
    pub preferred_landing_location: String,
    #[serde(default)]
    pub possible_landing_locations: Vec<String>,
    #[serde(default)]
    pub locations_to_search: Vec<String>,
    /// Add `(searched <loc>)` goals to the SEARCH goal set
    #[serde(default)]
    pub include_search_goals: bool,
}

/// Startup precondition polling
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StartupConfig {
    #[validate(range(min = 1))]
    pub poll_period_ms: u64,
    /// `None` waits forever.
    pub timeout_ms: Option<u64>,
    #[validate(range(min = 0.0))]
    pub max_initial_ned_norm: f64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            poll_period_ms: 1000,
            timeout_ms: None,
            max_initial_ned_norm: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EmergencyConfig {
    /// Battery charge below which the emergency flag is raised
    #[validate(range(min = 0.0, max = 100.0))]
    pub low_battery_percent: f64,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            low_battery_percent: 10.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ActionsConfig {
    #[serde(rename = "move")]
    #[validate(nested)]
    pub movement: MoveConfig,
    #[validate(nested)]
    pub search: SearchConfig,
    #[validate(nested)]
    pub drop: DropConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MoveConfig {
    #[validate(range(min = 0.0))]
    pub acceptance_radius_m: f64,
    #[validate(range(min = 1))]
    pub max_precondition_attempts: u32,
    /// Only every Nth tick in MOVE issues a displacement command
    #[validate(range(min = 1))]
    pub command_period_ticks: u32,
    /// Error norms above this are treated as a sensor fault
    #[validate(range(min = 0.0))]
    pub max_position_error_m: f64,
}

impl Default for MoveConfig {
    fn default() -> Self {
        Self {
            acceptance_radius_m: 1.0,
            max_precondition_attempts: 5,
            command_period_ticks: 10,
            max_position_error_m: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SearchConfig {
    #[validate(range(min = 0.0))]
    pub acceptance_radius_m: f64,
    /// Radius handed to the waypoint generator
    #[validate(range(min = 0.0))]
    pub search_radius_m: f64,
    #[validate(range(min = 1))]
    pub max_precondition_attempts: u32,
    /// A detection older than this no longer pauses the sweep
    #[validate(range(min = 1))]
    pub detection_window_ms: u64,
    /// Finish the search early once a detection has been tracked long enough
    pub finish_on_detection: bool,
    #[validate(range(min = 1))]
    pub detection_confirm_ticks: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            acceptance_radius_m: 1.0,
            search_radius_m: 10.0,
            max_precondition_attempts: 5,
            detection_window_ms: 1000,
            finish_on_detection: true,
            detection_confirm_ticks: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DropConfig {
    #[validate(range(min = 0.0))]
    pub max_horizontal_offset_m: f64,
    #[validate(range(min = 0.0))]
    pub max_altitude_m: f64,
    /// Detections closer than this to a known target are the same target
    #[validate(range(min = 0.0))]
    pub same_target_radius_m: f64,
    pub marker_min_severity: Severity,
    pub lifevest_min_severity: Severity,
}

impl Default for DropConfig {
    fn default() -> Self {
        Self {
            max_horizontal_offset_m: 2.0,
            max_altitude_m: 4.0,
            same_target_radius_m: 2.0,
            marker_min_severity: Severity::Moderate,
            lifevest_min_severity: Severity::High,
        }
    }
}

/// External planner command. Arguments may contain `{domain}` and `{problem}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub domain_name: String,
    pub problem_name: String,
    pub domain_file: Option<PathBuf>,
    pub command: Vec<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            domain_name: "sar".to_string(),
            problem_name: "sar_mission".to_string(),
            domain_file: None,
            command: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RuntimeConfig {
    #[validate(range(min = 1))]
    pub tick_period_ms: u64,
    #[validate(range(min = 1))]
    pub feed_buffer: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 100,
            feed_buffer: 256,
        }
    }
}

impl MissionConfig {
    /// Load and check a configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and check a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: MissionConfig = toml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    /// Apply `SARMC_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary lookup, then re-check.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("SARMC_DRONE_NAME") {
            self.drone.name = name;
        }
        if let Some(location) = lookup("SARMC_START_LOCATION") {
            self.mission_init.start_location = location;
        }
        if let Some(location) = lookup("SARMC_PREFERRED_LANDING_LOCATION") {
            self.mission_goals.preferred_landing_location = location;
        }
        if let Some(value) = lookup("SARMC_TICK_PERIOD_MS") {
            self.runtime.tick_period_ms = parse_override("SARMC_TICK_PERIOD_MS", &value)?;
        }
        if let Some(value) = lookup("SARMC_STARTUP_TIMEOUT_MS") {
            self.startup.timeout_ms = Some(parse_override("SARMC_STARTUP_TIMEOUT_MS", &value)?);
        }
        if let Some(value) = lookup("SARMC_NUM_MARKERS") {
            self.mission_init.payload.num_markers = parse_override("SARMC_NUM_MARKERS", &value)?;
        }
        if let Some(value) = lookup("SARMC_NUM_LIFEVESTS") {
            self.mission_init.payload.num_lifevests =
                parse_override("SARMC_NUM_LIFEVESTS", &value)?;
        }
        self.check()
    }

    /// Field-level validation plus cross references between sections.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;

        let locations = &self.locations;
        if locations.location_radius_m <= 0.0 {
            return Err(ConfigError::Invalid(
                "locations.location_radius_m must be positive".to_string(),
            ));
        }
        for name in &locations.names {
            if !locations.pos_ne.contains_key(name) {
                return Err(ConfigError::Missing(format!("locations.pos_ne.{}", name)));
            }
        }
        for (from, targets) in &locations.paths {
            self.require_location("locations.paths", from)?;
            for to in targets {
                self.require_location(&format!("locations.paths.{}", from), to)?;
            }
        }

        self.require_location("mission_init.start_location", &self.mission_init.start_location)?;
        self.require_location(
            "mission_goals.preferred_landing_location",
            &self.mission_goals.preferred_landing_location,
        )?;
        for location in &self.mission_goals.possible_landing_locations {
            self.require_location("mission_goals.possible_landing_locations", location)?;
        }
        for location in &self.mission_goals.locations_to_search {
            self.require_location("mission_goals.locations_to_search", location)?;
        }
        Ok(())
    }

    fn require_location(&self, field: &str, location: &str) -> Result<(), ConfigError> {
        if self.locations.names.iter().any(|name| name == location) {
            Ok(())
        } else {
            Err(ConfigError::UnknownLocation {
                field: field.to_string(),
                location: location.to_string(),
            })
        }
    }
}

fn parse_override<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Override {
        var: var.to_string(),
        value: value.to_string(),
    })
}
