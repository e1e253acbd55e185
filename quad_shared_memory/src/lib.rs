//! # Quadruped Simulation Shared Memory Channel
//!
//! Two processes, a simulator and a robot program, share one fixed-size
//! region holding the simulator message and take strict turns accessing it.
//! This crate provides the mechanics:
//!
//! - [`SharedRegion`]: a name-addressed POSIX shared memory object mapped as
//!   one typed value, sized to the next 64 KiB boundary.
//! - [`NamedSemaphore`]: named POSIX counting semaphores.
//! - [`SimulatorEndpoint`] / [`RobotEndpoint`]: the alternating-turn
//!   protocol on top of a region and two semaphores.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────────┐    ┌─────────────────┐
//! │   Simulator     │    │  Shared Region      │    │   Robot         │
//! │                 │    │                     │    │                 │
//! │ SimulatorEndpoint├──►│ [RobotToSimulator]  │◄───┤ RobotEndpoint   │
//! │   (owner)       │    │ [SimulatorToRobot]  │    │  (attached)     │
//! └────────┬────────┘    └─────────────────────┘    └────────┬────────┘
//!          │  post(simulator-semaphore)                      │
//!          └──────────────────────────────────────────────►──┘
//!          ┌──◄──────────────────────────────────────────────┐
//!             post(robot-semaphore)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use quad_shared_memory::{RobotEndpoint, SimulatorEndpoint, ShmResult};
//! use quad::config::ChannelNames;
//!
//! # fn main() -> ShmResult<()> {
//! let names = ChannelNames::default();
//!
//! // Simulator process
//! let mut sim = SimulatorEndpoint::<u64>::create(&names)?;
//! *sim.message_mut()? = 1;
//! sim.signal_simulator_done()?;
//!
//! // Robot process
//! let mut robot = RobotEndpoint::<u64>::attach(&names)?;
//! robot.wait_for_simulator()?;
//! *robot.message_mut()? += 1;
//! robot.signal_robot_done()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, ShmError>`:
//!
//! ```rust,no_run
//! use quad_shared_memory::{RobotEndpoint, ShmError};
//! use quad::config::ChannelNames;
//!
//! match RobotEndpoint::<u64>::attach(&ChannelNames::default()) {
//!     Ok(_robot) => { /* run the bridge */ }
//!     Err(ShmError::NotFound { name }) => {
//!         eprintln!("Region '{}' not found - start the simulator first", name);
//!     }
//!     Err(ShmError::SizeMismatch { expected, actual, .. }) => {
//!         eprintln!("Layout skew: expected {} bytes, found {}", expected, actual);
//!     }
//!     Err(e) => eprintln!("Unexpected error: {}", e),
//! }
//! ```
//!
//! ## Thread Safety
//!
//! - **Endpoints**: single-threaded with respect to the channel; one per
//!   process side.
//! - **NamedSemaphore**: `Send + Sync`.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod platform;
pub mod region;
pub mod semaphore;
pub mod sync;

pub use error::{ShmError, ShmResult};
pub use platform::region_size;
pub use region::SharedRegion;
pub use semaphore::NamedSemaphore;
pub use sync::{RobotEndpoint, SimulatorEndpoint, TurnPhase, TurnSemaphores};

/// Initialize tracing for tools and tests
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
