//! System-wide constants for the quadruped simulation workspace.
//!
//! Single source of truth for channel names, fixed capacities and layout
//! alignment. Both peers must be built against the same values: the wire
//! layout depends on every capacity in this file.

/// Well-known name of the shared region holding the simulator message.
pub const SHARED_MEMORY_NAME: &str = "/development-simulator";

/// Well-known name of the semaphore the robot posts when its turn is done.
pub const ROBOT_SEMAPHORE_NAME: &str = "/robot-semaphore";

/// Well-known name of the semaphore the simulator posts when its turn is done.
pub const SIMULATOR_SEMAPHORE_NAME: &str = "/simulator-semaphore";

/// Shared region size granularity (64 KiB).
pub const REGION_ALIGNMENT: usize = 64 * 1024;

/// Number of legs on every supported robot.
pub const NUM_LEGS: usize = 4;

/// Joints per leg (ab/ad, hip, knee).
pub const JOINTS_PER_LEG: usize = 3;

/// Capacity of the robot → simulator error message buffer, including the
/// terminating NUL.
pub const ERROR_MESSAGE_CAPACITY: usize = 2056;

/// Capacity of a control parameter name on the wire, including the
/// terminating NUL.
pub const PARAMETER_NAME_CAPACITY: usize = 64;

/// Maximum number of debug spheres in one visualization payload.
pub const MAX_VIS_SPHERES: usize = 32;

/// Maximum number of debug arrows in one visualization payload.
pub const MAX_VIS_ARROWS: usize = 32;

/// Maximum number of points in the visualized path.
pub const MAX_VIS_PATH_POINTS: usize = 256;

/// Default controller period in microseconds (500 Hz).
pub const CONTROLLER_PERIOD_US: u64 = 2000;

/// Default bound on a single turn wait used by the simulator, in milliseconds.
pub const DEFAULT_TURN_TIMEOUT_MS: u64 = 1000;

/// Default number of attempts the simulator makes for one parameter request.
pub const DEFAULT_PARAMETER_RETRIES: u32 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_buffer_is_at_least_two_kib() {
        assert!(ERROR_MESSAGE_CAPACITY >= 2048);
    }

    #[test]
    fn channel_names_are_posix_style() {
        for name in [SHARED_MEMORY_NAME, ROBOT_SEMAPHORE_NAME, SIMULATOR_SEMAPHORE_NAME] {
            assert!(name.starts_with('/'));
            assert!(!name[1..].contains('/'));
        }
    }

    #[test]
    fn semaphore_names_differ() {
        assert_ne!(ROBOT_SEMAPHORE_NAME, SIMULATOR_SEMAPHORE_NAME);
    }

    #[test]
    fn region_alignment_is_page_multiple() {
        assert_eq!(REGION_ALIGNMENT % 4096, 0);
    }
}
