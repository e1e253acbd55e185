//! Prelude module for common re-exports.
//!
//! This module provides convenient re-exports of commonly used types
//! so that consumers can do `use quad_common::prelude::*;` and get
//! the most important types without listing individual paths.
//!
//! # Usage
//!
//! ```rust
//! use quad_common::prelude::*;
//! ```

use std::time::Duration;

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ChannelNames, ConfigError, ConfigLoader, SharedConfig};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{
    CONTROLLER_PERIOD_US, DEFAULT_PARAMETER_RETRIES, DEFAULT_TURN_TIMEOUT_MS, NUM_LEGS,
};

// ─── Robot & Parameters ─────────────────────────────────────────────
pub use crate::params::{
    ParameterError, ParameterKind, ParameterName, ParameterValue, RequestKind,
};
pub use crate::robot::RobotType;

// ─── Shared Memory ──────────────────────────────────────────────────
pub use crate::shm::message::{
    Mode, RobotToSimulatorMessage, SimulatorMessage, SimulatorToRobotMessage,
};
pub use crate::shm::plain::PlainData;

/// Default controller period as Duration.
pub const DEFAULT_CONTROLLER_PERIOD: Duration = Duration::from_micros(CONTROLLER_PERIOD_US);

/// Default bound on a single turn wait as Duration.
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_millis(DEFAULT_TURN_TIMEOUT_MS);
