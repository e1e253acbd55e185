//! Error types for shared memory operations

use thiserror::Error;

/// Errors that can occur during shared memory operations
#[derive(Error, Debug)]
pub enum ShmError {
    /// Region already exists and the caller asked not to replace it
    #[error("Region already exists: {name}")]
    AlreadyExists {
        /// Region name
        name: String,
    },

    /// Region not found
    #[error("Region not found: {name}")]
    NotFound {
        /// Region name
        name: String,
    },

    /// Mapped size differs from the size this build expects
    #[error("Region {name} is {actual} bytes, expected {expected} (peers built from different layouts?)")]
    SizeMismatch {
        /// Region name
        name: String,
        /// Size computed from the local message layout
        expected: usize,
        /// Size of the existing object
        actual: usize,
    },

    /// Named semaphore does not exist
    #[error("Semaphore not found: {name}")]
    SemaphoreNotFound {
        /// Semaphore name
        name: String,
    },

    /// Semaphore already exists and the caller asked not to replace it
    #[error("Semaphore already exists: {name}")]
    SemaphoreExists {
        /// Semaphore name
        name: String,
    },

    /// Semaphore system call failed
    #[error("Semaphore {name}: {operation} failed: {source}")]
    Semaphore {
        /// Semaphore name
        name: String,
        /// Failing call
        operation: &'static str,
        /// Underlying errno
        source: nix::Error,
    },

    /// Turn protocol misuse by the local peer
    #[error("Turn violation: {operation} while {phase}")]
    TurnViolation {
        /// Attempted operation
        operation: &'static str,
        /// Phase the endpoint was in
        phase: crate::sync::TurnPhase,
    },

    /// Region or semaphore name rejected
    #[error("Invalid name {name:?}: {reason}")]
    InvalidName {
        /// Offending name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// Nix system call error
    #[error("System call error: {source}")]
    Nix {
        /// Source nix error
        #[from]
        source: nix::Error,
    },
}

/// Result type for shared memory operations
pub type ShmResult<T> = Result<T, ShmError>;
