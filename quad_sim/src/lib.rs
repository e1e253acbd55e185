//! # Quadruped Development Simulator Library
//!
//! Simulator side of the shared channel. The simulator owns the region and
//! the turn semaphores, declares which robot it simulates, and drives the
//! robot program one turn at a time.
//!
//! # Module Structure
//!
//! - [`connection`] - `SimulatorConnection`: turns, parameter RPC, teardown
//! - [`headless`] - `HeadlessSimulator`: the timed controller loop
//! - [`plant`] - `JointPlant`: joint dynamics closing the loop
//! - [`config`] - `SimulatorConfig`
//! - [`error`] - `SimError`
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         quad_sim                                 │
//! │  ┌─────────────┐    ┌──────────────────┐    ┌────────────────┐   │
//! │  │ JointPlant  │◄──►│ HeadlessSimulator│◄──►│ Simulator-     │   │
//! │  │             │    │  (timed loop)    │    │ Connection     │   │
//! │  └─────────────┘    └──────────────────┘    └───────┬────────┘   │
//! └─────────────────────────────────────────────────────┼────────────┘
//!                                                       ▼
//!                                          shared region + semaphores
//!                                                       ▼
//!                                                  quad_robot
//! ```

#![deny(missing_docs)]

pub mod config;
pub mod connection;
pub mod error;
pub mod headless;
pub mod plant;

// Re-export key types for convenience
pub use crate::config::SimulatorConfig;
pub use crate::connection::{ConnectionOptions, SimulatorConnection};
pub use crate::error::SimError;
pub use crate::headless::{HeadlessSimulator, RunSummary, TimingStats};
pub use crate::plant::JointPlant;
