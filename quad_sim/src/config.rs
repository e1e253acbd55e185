//! Simulator configuration.
//!
//! ```toml
//! robot_type = "mini_cheetah"
//! turn_timeout_ms = 1000
//! parameter_retries = 5
//! controller_period_us = 2000
//! iterations = 5000
//! robot_parameters_file = "config/mini-cheetah-defaults.toml"
//! user_parameters_file = "config/stand-controller.toml"
//!
//! [shared]
//! service_name = "quad_sim"
//!
//! [channel]
//! region = "/development-simulator"
//! ```

use quad::config::{ChannelNames, ConfigError, ConfigLoader, SharedConfig};
use quad::consts::{CONTROLLER_PERIOD_US, DEFAULT_PARAMETER_RETRIES, DEFAULT_TURN_TIMEOUT_MS};
use quad::robot::RobotType;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default service name when no configuration file is given.
pub const DEFAULT_SERVICE_NAME: &str = "quad_sim";

fn default_turn_timeout_ms() -> u64 {
    DEFAULT_TURN_TIMEOUT_MS
}

fn default_parameter_retries() -> u32 {
    DEFAULT_PARAMETER_RETRIES
}

fn default_controller_period_us() -> u64 {
    CONTROLLER_PERIOD_US
}

/// Complete simulator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    /// Common fields.
    pub shared: SharedConfig,

    /// Channel object names.
    #[serde(default)]
    pub channel: ChannelNames,

    /// Robot the simulator declares to the robot program.
    pub robot_type: RobotType,

    /// Bound on a single wait for the robot [ms].
    #[serde(default = "default_turn_timeout_ms")]
    pub turn_timeout_ms: u64,

    /// Extra waits granted to a parameter request before giving up.
    #[serde(default = "default_parameter_retries")]
    pub parameter_retries: u32,

    /// Controller turn period [µs].
    #[serde(default = "default_controller_period_us")]
    pub controller_period_us: u64,

    /// Stop after this many controller turns; run until interrupted if unset.
    #[serde(default)]
    pub iterations: Option<u64>,

    /// Robot parameters streamed to the robot before the controller starts.
    #[serde(default)]
    pub robot_parameters_file: Option<PathBuf>,

    /// User parameters streamed after the robot parameters.
    #[serde(default)]
    pub user_parameters_file: Option<PathBuf>,
}

impl SimulatorConfig {
    /// Defaults for `robot_type` with no parameter files.
    pub fn new(robot_type: RobotType) -> Self {
        Self {
            shared: SharedConfig::named(DEFAULT_SERVICE_NAME),
            channel: ChannelNames::default(),
            robot_type,
            turn_timeout_ms: DEFAULT_TURN_TIMEOUT_MS,
            parameter_retries: DEFAULT_PARAMETER_RETRIES,
            controller_period_us: CONTROLLER_PERIOD_US,
            iterations: None,
            robot_parameters_file: None,
            user_parameters_file: None,
        }
    }

    /// Load and validate a configuration file.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Check names and timing bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.channel.validate()?;
        if self.turn_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "turn_timeout_ms must be positive".to_string(),
            ));
        }
        if self.controller_period_us == 0 {
            return Err(ConfigError::ValidationError(
                "controller_period_us must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Bound on a single wait for the robot.
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_millis(self.turn_timeout_ms)
    }

    /// Controller turn period.
    pub fn controller_period(&self) -> Duration {
        Duration::from_micros(self.controller_period_us)
    }
}
