//! Robot variant identifiers.
//!
//! The variant crosses the wire as a raw `u32` in both directions of the
//! simulator message; [`RobotType::from_raw`] is the only way back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported quadruped variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum RobotType {
    /// Cheetah 3 (TI-board legs).
    Cheetah3 = 0,
    /// Mini Cheetah (SPI legs).
    MiniCheetah = 1,
    /// Cyberdog (SPI legs, Mini Cheetah wire format).
    Cyberdog = 2,
}

impl RobotType {
    /// All variants, in wire order.
    pub const ALL: [Self; 3] = [Self::Cheetah3, Self::MiniCheetah, Self::Cyberdog];

    /// Convert from raw `u32` value. Returns `None` for invalid values.
    #[inline]
    pub const fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Cheetah3),
            1 => Some(Self::MiniCheetah),
            2 => Some(Self::Cyberdog),
            _ => None,
        }
    }

    /// Raw wire value.
    #[inline]
    pub const fn as_raw(self) -> u32 {
        self as u32
    }

    /// Single-character command line id (`3`, `m`, `c`).
    pub const fn cli_id(self) -> char {
        match self {
            Self::Cheetah3 => '3',
            Self::MiniCheetah => 'm',
            Self::Cyberdog => 'c',
        }
    }

    /// Whether the legs are driven through the SPI data/command blocks.
    ///
    /// Cheetah 3 uses the per-leg TI-board arrays instead.
    pub const fn uses_spi(self) -> bool {
        !matches!(self, Self::Cheetah3)
    }
}

impl fmt::Display for RobotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cheetah3 => "Cheetah 3",
            Self::MiniCheetah => "Mini Cheetah",
            Self::Cyberdog => "Cyberdog",
        };
        f.write_str(name)
    }
}

/// Error returned when a robot id string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown robot type '{0}' (expected 3, m or c)")]
pub struct UnknownRobotType(pub String);

impl FromStr for RobotType {
    type Err = UnknownRobotType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "3" | "cheetah3" => Ok(Self::Cheetah3),
            "m" | "mini_cheetah" => Ok(Self::MiniCheetah),
            "c" | "cyberdog" => Ok(Self::Cyberdog),
            other => Err(UnknownRobotType(other.to_string())),
        }
    }
}
