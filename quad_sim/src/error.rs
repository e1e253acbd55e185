//! Simulator-side error type.

use quad::config::ConfigError;
use quad::params::ParameterError;
use quad_shared_memory::ShmError;
use thiserror::Error;

/// Errors raised while driving the robot through the channel.
#[derive(Debug, Error)]
pub enum SimError {
    /// Channel mechanics failed.
    #[error(transparent)]
    Shm(#[from] ShmError),

    /// A parameter name, value or file could not be encoded or decoded.
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    /// Configuration could not be loaded.
    #[error("Configuration: {0}")]
    Config(#[from] ConfigError),

    /// The robot did not hand the turn back in time.
    #[error("robot stopped responding{}", suffix(.published_error))]
    RobotStalled {
        /// Text the robot left in the error buffer, if any.
        published_error: Option<String>,
    },

    /// A parameter request was not answered within the retry budget.
    #[error(
        "robot did not acknowledge parameter '{name}' (request {request_number}){}",
        suffix(.published_error)
    )]
    ParameterNotAcknowledged {
        /// Parameter name.
        name: String,
        /// Number of the unanswered request.
        request_number: u64,
        /// Text the robot left in the error buffer, if any.
        published_error: Option<String>,
    },

    /// The robot answered with something that does not match the request.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

fn suffix(published_error: &Option<String>) -> String {
    published_error
        .as_ref()
        .map(|text| format!(": {text}"))
        .unwrap_or_default()
}

impl SimError {
    /// Error text published by the robot, if this error carries one.
    pub fn published_error(&self) -> Option<&str> {
        match self {
            Self::RobotStalled { published_error }
            | Self::ParameterNotAcknowledged {
                published_error, ..
            } => published_error.as_deref(),
            _ => None,
        }
    }
}
