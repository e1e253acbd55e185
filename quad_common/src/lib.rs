//! Quadruped simulation common library
//!
//! This crate provides the wire schema, constants and configuration loading
//! utilities shared by the robot program and the simulator.
//!
//! # Module Structure
//!
//! - [`consts`] - Channel names, capacities and defaults
//! - [`config`] - Configuration loading traits and types
//! - [`robot`] - Robot variants
//! - [`params`] - Control parameter values, names and files
//! - [`shm`] - Shared memory message layout
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! Add to your `Cargo.toml` with alias for shorter imports:
//! ```toml
//! [dependencies]
//! quad = { package = "quad_common", path = "../quad_common" }
//! ```
//!
//! Then import:
//! ```rust
//! use quad_common::shm::message::SimulatorMessage;
//! use quad_common::config::{ConfigLoader, SharedConfig};
//! ```

pub mod config;
pub mod consts;
pub mod params;
pub mod prelude;
pub mod robot;
pub mod shm;
