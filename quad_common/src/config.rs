//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! for both peers of the simulation channel.
//!
//! # Usage
//!
//! ```rust,no_run
//! use quad_common::config::{ChannelNames, ConfigError, ConfigLoader, SharedConfig};
//! use serde::Deserialize;
//! use std::path::Path;
//!
//! #[derive(Debug, Deserialize)]
//! struct MyAppConfig {
//!     shared: SharedConfig,
//!     #[serde(default)]
//!     channel: ChannelNames,
//! }
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = MyAppConfig::load(Path::new("robot.toml"))?;
//!     config.channel.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use crate::consts::{ROBOT_SEMAPHORE_NAME, SHARED_MEMORY_NAME, SIMULATOR_SEMAPHORE_NAME};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Longest POSIX object name accepted for the region and semaphores.
///
/// Semaphore names get a `sem.` prefix under `/dev/shm`, which must still
/// fit in `NAME_MAX` (255).
pub const MAX_CHANNEL_NAME_LEN: usize = 200;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared by the robot and simulator programs.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "mini-cheetah-sim"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Build a config with the default log level.
    pub fn named(service_name: impl Into<String>) -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: service_name.into(),
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Names of the three POSIX objects that make up the simulation channel.
///
/// Both peers must agree on every name. The defaults are the well-known
/// names from [`crate::consts`]; overriding them is meant for running several
/// independent channels side by side (tests, multiple simulators).
///
/// # TOML Example
///
/// ```toml
/// [channel]
/// region = "/development-simulator"
/// robot_semaphore = "/robot-semaphore"
/// simulator_semaphore = "/simulator-semaphore"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelNames {
    /// Shared region name.
    pub region: String,
    /// Semaphore posted by the robot at the end of its turn.
    pub robot_semaphore: String,
    /// Semaphore posted by the simulator at the end of its turn.
    pub simulator_semaphore: String,
}

impl Default for ChannelNames {
    fn default() -> Self {
        Self {
            region: SHARED_MEMORY_NAME.to_string(),
            robot_semaphore: ROBOT_SEMAPHORE_NAME.to_string(),
            simulator_semaphore: SIMULATOR_SEMAPHORE_NAME.to_string(),
        }
    }
}

impl ChannelNames {
    /// Default names with `-{suffix}` appended to each of them.
    pub fn with_suffix(suffix: &str) -> Self {
        Self {
            region: format!("{SHARED_MEMORY_NAME}-{suffix}"),
            robot_semaphore: format!("{ROBOT_SEMAPHORE_NAME}-{suffix}"),
            simulator_semaphore: format!("{SIMULATOR_SEMAPHORE_NAME}-{suffix}"),
        }
    }

    /// Validate all three names.
    ///
    /// # Validation Rules
    /// 1. Each name starts with `/` and contains no other `/`.
    /// 2. Each name is 2..=`MAX_CHANNEL_NAME_LEN` bytes and has no NUL.
    /// 3. The two semaphore names differ.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, name) in [
            ("region", &self.region),
            ("robot_semaphore", &self.robot_semaphore),
            ("simulator_semaphore", &self.simulator_semaphore),
        ] {
            validate_posix_name(name)
                .map_err(|reason| ConfigError::ValidationError(format!("{field}: {reason}")))?;
        }
        if self.robot_semaphore == self.simulator_semaphore {
            return Err(ConfigError::ValidationError(
                "robot_semaphore and simulator_semaphore must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Check a POSIX IPC object name, returning the reason it is rejected.
pub fn validate_posix_name(name: &str) -> Result<(), String> {
    if name.len() < 2 || !name.starts_with('/') {
        return Err(format!("'{name}' must start with '/' followed by a name"));
    }
    if name[1..].contains('/') {
        return Err(format!("'{name}' may not contain '/' after the first character"));
    }
    if name.len() > MAX_CHANNEL_NAME_LEN {
        return Err(format!(
            "'{name}' is {} bytes (max {MAX_CHANNEL_NAME_LEN})",
            name.len()
        ));
    }
    if name.contains('\0') {
        return Err(format!("'{name}' contains a NUL byte"));
    }
    Ok(())
}

/// Trait for loading configuration from TOML files.
///
/// Default implementation works with any type implementing
/// `serde::de::DeserializeOwned`.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation: any serde-deserializable struct can be loaded.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        for (text, level) in [
            ("trace", LogLevel::Trace),
            ("debug", LogLevel::Debug),
            ("info", LogLevel::Info),
            ("warn", LogLevel::Warn),
            ("error", LogLevel::Error),
        ] {
            let parsed: TestWrapper = toml::from_str(&format!("level = \"{text}\"")).unwrap();
            assert_eq!(parsed.level, level);
            assert_eq!(level.as_str(), text);
        }
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig::named("");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(SharedConfig::named("robot").validate().is_ok());
    }

    #[test]
    fn test_default_channel_names_are_valid() {
        let names = ChannelNames::default();
        assert!(names.validate().is_ok());
        assert_eq!(names.region, SHARED_MEMORY_NAME);
    }

    #[test]
    fn test_channel_names_with_suffix() {
        let names = ChannelNames::with_suffix("t42");
        assert_eq!(names.region, "/development-simulator-t42");
        assert_eq!(names.robot_semaphore, "/robot-semaphore-t42");
        assert!(names.validate().is_ok());
    }

    #[test]
    fn test_channel_names_rejects_bad_names() {
        let mut names = ChannelNames::default();
        names.region = "no-slash".to_string();
        assert!(names.validate().is_err());

        let mut names = ChannelNames::default();
        names.robot_semaphore = "/a/b".to_string();
        assert!(names.validate().is_err());

        let mut names = ChannelNames::default();
        names.simulator_semaphore = names.robot_semaphore.clone();
        assert!(names.validate().is_err());

        let mut names = ChannelNames::default();
        names.region = format!("/{}", "x".repeat(MAX_CHANNEL_NAME_LEN));
        assert!(names.validate().is_err());
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = ChannelNames::load(Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_config_loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = ChannelNames::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_config_loader_partial_channel_section() {
        #[derive(Debug, Deserialize)]
        struct TestConfig {
            shared: SharedConfig,
            #[serde(default)]
            channel: ChannelNames,
        }

        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[shared]
log_level = "debug"
service_name = "test-service"

[channel]
region = "/custom-region"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = TestConfig::load(file.path()).unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.channel.region, "/custom-region");
        assert_eq!(config.channel.robot_semaphore, ROBOT_SEMAPHORE_NAME);
    }
}
