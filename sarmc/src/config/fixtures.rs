//! Shared configuration fixture for unit tests.

use super::MissionConfig;

pub(crate) const SAMPLE: &str = r#"
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
"#;

pub(crate) fn sample_config() -> MissionConfig {
    MissionConfig::from_toml_str(SAMPLE).expect("sample config parses")
}
