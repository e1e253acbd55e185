//! Robot program configuration.
//!
//! ```toml
//! robot_parameters_file = "config/mini-cheetah-defaults.toml"
//! user_parameters_file = "config/stand-controller.toml"
//!
//! [shared]
//! service_name = "quad_robot"
//! log_level = "info"
//!
//! [channel]
//! region = "/development-simulator"
//! ```

use quad::config::{ChannelNames, ConfigError, ConfigLoader, SharedConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default service name when no configuration file is given.
pub const DEFAULT_SERVICE_NAME: &str = "quad_robot";

/// Complete robot program configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RobotProgramConfig {
    pub shared: SharedConfig,

    #[serde(default)]
    pub channel: ChannelNames,

    /// Robot parameters loaded before connecting, instead of waiting for
    /// the simulator to send them.
    #[serde(default)]
    pub robot_parameters_file: Option<PathBuf>,

    /// Controller parameters loaded before connecting.
    #[serde(default)]
    pub user_parameters_file: Option<PathBuf>,
}

impl Default for RobotProgramConfig {
    fn default() -> Self {
        Self {
            shared: SharedConfig::named(DEFAULT_SERVICE_NAME),
            channel: ChannelNames::default(),
            robot_parameters_file: None,
            user_parameters_file: None,
        }
    }
}

impl RobotProgramConfig {
    /// Load and validate a configuration file.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.channel.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quad::config::LogLevel;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn minimal_file_uses_default_channel() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[shared]\nservice_name = \"robot-a\"").unwrap();

        let config = RobotProgramConfig::load_validated(file.path()).unwrap();
        assert_eq!(config.shared.service_name, "robot-a");
        assert_eq!(config.shared.log_level, LogLevel::Info);
        assert_eq!(config.channel, ChannelNames::default());
        assert!(config.robot_parameters_file.is_none());
    }

    #[test]
    fn full_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
robot_parameters_file = "robot.toml"
user_parameters_file = "user.toml"

[shared]
service_name = "robot-b"
log_level = "debug"

[channel]
region = "/sim-b"
robot_semaphore = "/robot-b"
simulator_semaphore = "/sim-sem-b"
"#
        )
        .unwrap();

        let config = RobotProgramConfig::load_validated(file.path()).unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.channel.region, "/sim-b");
        assert_eq!(config.robot_parameters_file, Some(PathBuf::from("robot.toml")));
        assert_eq!(config.user_parameters_file, Some(PathBuf::from("user.toml")));
    }

    #[test]
    fn invalid_channel_name_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[shared]\nservice_name = \"x\"\n[channel]\nregion = \"no-slash\""
        )
        .unwrap();
        assert!(matches!(
            RobotProgramConfig::load_validated(file.path()),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn missing_file() {
        assert_eq!(
            RobotProgramConfig::load_validated(Path::new("/nonexistent/robot.toml")).unwrap_err(),
            ConfigError::FileNotFound
        );
    }
}
