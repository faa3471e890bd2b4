// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the ManipulatorConfig type which bundles every configuration of the control core.
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::exception::{ManipulatorException, ManipulatorResult};
use crate::robot::motion_config::MotionConfig;
use crate::simulation::SimulationConfig;
use crate::skills::SkillConfig;

/// Configuration of the primitives, the skills and the simulation driver.
///
/// Every field has a default, so a configuration file only needs to name what it changes:
/// ```
/// # use manipulator::ManipulatorConfig;
/// let config = ManipulatorConfig::from_json_str(r#"{"motion": {"max_velocity": 0.1}}"#).unwrap();
/// assert_eq!(config.motion.max_velocity, 0.1);
/// assert_eq!(config.motion.min_velocity, 0.02);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ManipulatorConfig {
    pub motion: MotionConfig,
    pub skills: SkillConfig,
    pub simulation: SimulationConfig,
}

impl ManipulatorConfig {
    /// # Errors
    /// * ConfigException if the string is not a valid configuration.
    pub fn from_json_str(json: &str) -> ManipulatorResult<Self> {
        serde_json::from_str(json).map_err(|e| ManipulatorException::ConfigException {
            message: format!("invalid configuration: {}", e),
        })
    }

    /// # Errors
    /// * ConfigException if the file cannot be read or is not a valid configuration.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ManipulatorResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| ManipulatorException::ConfigException {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        ManipulatorConfig::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ManipulatorConfig;
    use crate::ManipulatorException;
    use std::time::Duration;

    #[test]
    fn partial_configuration() {
        let config = ManipulatorConfig::from_json_str(
            r#"{
                "skills": {"hover_height": 0.15, "appliance": {"open_threshold": 70.0}},
                "simulation": {
                    "stop_on_success": false,
                    "tick_period": {"secs": 0, "nanos": 50000000}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.skills.hover_height, 0.15);
        assert_eq!(config.skills.appliance.open_threshold, 70.);
        assert_eq!(config.skills.appliance.fixture, "microwave");
        assert!(!config.simulation.stop_on_success);
        assert_eq!(config.simulation.tick_period, Some(Duration::from_millis(50)));
        assert_eq!(config.motion, Default::default());
    }

    #[test]
    fn invalid_configuration() {
        assert!(matches!(
            ManipulatorConfig::from_json_str(r#"{"motion": {"max_velocity": "fast"}}"#),
            Err(ManipulatorException::ConfigException { .. })
        ));
        assert!(matches!(
            ManipulatorConfig::from_json_file("/nonexistent/manipulator.json"),
            Err(ManipulatorException::ConfigException { .. })
        ));
    }
}
