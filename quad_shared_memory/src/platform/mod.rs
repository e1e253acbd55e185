//! Platform layer: POSIX shared memory objects and region sizing.

pub mod linux;

pub use linux::{
    ObjectId, create_shm, map_shared, open_shm, region_size, region_size_for, shm_identity,
    unlink_shm, unlink_shm_if, validate_name,
};
