//! Shared memory wire types.
//!
//! This module contains:
//! - `message`: The simulator message aggregate and every struct inside it.
//! - `plain`: The `PlainData` marker bounding what may live in a region.

pub mod message;
pub mod plain;
