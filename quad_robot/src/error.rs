//! Robot-side error type.
//!
//! Every variant is fatal for the bridge: the text is published into the
//! shared error buffer and the process exits.

use crate::controller::ControllerError;
use quad::config::ConfigError;
use quad::params::{ParameterError, ParameterKind};
use quad::robot::RobotType;
use quad_shared_memory::ShmError;
use thiserror::Error;

/// Errors raised while bridging the robot program to the simulator.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Shm(#[from] ShmError),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error("Configuration: {0}")]
    Config(#[from] ConfigError),

    /// The simulator declared a different robot than the one we were launched as.
    #[error("robot mismatch: launched as {expected}, simulator declared {found}")]
    RobotMismatch { expected: RobotType, found: String },

    #[error("unknown simulator mode {0}")]
    UnknownMode(u32),

    #[error(
        "not all parameters initialized when going into RunController: {table} table is missing {}",
        .missing.join(", ")
    )]
    ParametersNotInitialized { table: String, missing: Vec<String> },

    #[error("unknown parameter '{name}' in {table} table")]
    UnknownParameter { name: String, table: String },

    #[error("parameter '{name}' is {stored}, request used {requested}")]
    TypeMismatch {
        name: String,
        stored: ParameterKind,
        requested: ParameterKind,
    },

    /// More than one request arrived since the last response.
    #[error("too many control parameter requests pending: request {request}, last response {response}")]
    TooManyPendingRequests { request: u64, response: u64 },

    #[error("controller: {0}")]
    Controller(#[from] ControllerError),

    #[error("failed to install crash handler: {0}")]
    CrashHandler(#[source] nix::Error),
}
