//! # Quadruped Robot Program Library
//!
//! Robot side of the development simulator. The robot attaches to the
//! simulator's shared channel and, turn by turn, does what the simulator's
//! mode asks for:
//!
//! - **ApplyControlParameters**: answer one control-parameter request
//!   ([`rpc`]) against the robot table or the controller's user table.
//! - **RunController**: run one controller iteration ([`controller`])
//!   directly on the mapped sensor data and commands.
//! - **Idle**: nothing; a liveness probe.
//! - **Exit**: finish the turn and detach.
//!
//! Any failure is written into the shared error buffer ([`fault`]) so the
//! simulator can report it after the robot stops answering.

pub mod bridge;
pub mod config;
pub mod controller;
pub mod error;
pub mod fault;
pub mod params;
pub mod rpc;

pub use bridge::{BridgeStats, SimulationBridge};
pub use controller::{ControllerError, ControllerIo, JointPdController, RobotController};
pub use error::BridgeError;
pub use params::{ControlParameters, robot_parameters};
