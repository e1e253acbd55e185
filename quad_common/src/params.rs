//! Control parameter values, names and request kinds.
//!
//! A control parameter is a named, typed value owned by the robot process.
//! The simulator reads and writes parameters through the request/response
//! fields of the simulator message. This module holds everything both peers
//! need to agree on:
//!
//! - [`ParameterKind`] and [`RequestKind`]: the wire tags.
//! - [`ParameterValue`]: the closed set of value types, and its fixed-size
//!   wire form [`RawParameterValue`].
//! - Name encoding into the fixed NUL-terminated wire buffer.
//! - [`ParameterFile`]: TOML parameter files used to seed or stream tables.

use crate::config::{ConfigError, ConfigLoader};
use crate::consts::PARAMETER_NAME_CAPACITY;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Longest parameter name in bytes (one byte is reserved for the NUL).
pub const MAX_PARAMETER_NAME_LEN: usize = PARAMETER_NAME_CAPACITY - 1;

/// In-process parameter name, bounded to what fits on the wire.
pub type ParameterName = heapless::String<MAX_PARAMETER_NAME_LEN>;

/// Parameter name as stored on the wire.
pub type WireName = [u8; PARAMETER_NAME_CAPACITY];

/// Errors from decoding parameter tags, names, values and files.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("Unknown parameter kind tag {0}")]
    UnknownKind(u32),

    #[error("Unknown request kind tag {0}")]
    UnknownRequestKind(u32),

    #[error("Parameter name '{name}' is {len} bytes (max {MAX_PARAMETER_NAME_LEN})")]
    NameTooLong { name: String, len: usize },

    #[error("Invalid parameter name: {0}")]
    InvalidName(String),

    #[error("Parameter '{name}': value does not match kind {kind}")]
    ValueMismatch { name: String, kind: ParameterKind },

    #[error("Parameter file: {0}")]
    File(#[from] ConfigError),
}

// ─── Tags ───────────────────────────────────────────────────────────

/// Type tag of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum ParameterKind {
    Float = 0,
    Double = 1,
    S64 = 2,
    Vec3Double = 3,
    Vec3Float = 4,
}

impl ParameterKind {
    /// Convert from raw `u32` value. Returns `None` for invalid values.
    #[inline]
    pub const fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Float),
            1 => Some(Self::Double),
            2 => Some(Self::S64),
            3 => Some(Self::Vec3Double),
            4 => Some(Self::Vec3Float),
            _ => None,
        }
    }

    /// Raw wire value.
    #[inline]
    pub const fn as_raw(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Float => "float",
            Self::Double => "double",
            Self::S64 => "s64",
            Self::Vec3Double => "vec3_double",
            Self::Vec3Float => "vec3_float",
        })
    }
}

/// What a parameter request asks the robot to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RequestKind {
    GetRobotParamByName = 0,
    SetRobotParamByName = 1,
    GetUserParamByName = 2,
    SetUserParamByName = 3,
}

impl RequestKind {
    /// Convert from raw `u32` value. Returns `None` for invalid values.
    #[inline]
    pub const fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::GetRobotParamByName),
            1 => Some(Self::SetRobotParamByName),
            2 => Some(Self::GetUserParamByName),
            3 => Some(Self::SetUserParamByName),
            _ => None,
        }
    }

    /// Raw wire value.
    #[inline]
    pub const fn as_raw(self) -> u32 {
        self as u32
    }

    /// Request targets the controller's user table.
    pub const fn is_user(self) -> bool {
        matches!(self, Self::GetUserParamByName | Self::SetUserParamByName)
    }

    /// Request writes the value instead of reading it.
    pub const fn is_set(self) -> bool {
        matches!(self, Self::SetRobotParamByName | Self::SetUserParamByName)
    }

    /// Set request for the robot or user table.
    pub const fn set(user: bool) -> Self {
        if user {
            Self::SetUserParamByName
        } else {
            Self::SetRobotParamByName
        }
    }

    /// Get request for the robot or user table.
    pub const fn get(user: bool) -> Self {
        if user {
            Self::GetUserParamByName
        } else {
            Self::GetRobotParamByName
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::GetRobotParamByName => "get robot parameter",
            Self::SetRobotParamByName => "set robot parameter",
            Self::GetUserParamByName => "get user parameter",
            Self::SetUserParamByName => "set user parameter",
        })
    }
}

// ─── Values ─────────────────────────────────────────────────────────

/// A typed parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    Float(f32),
    Double(f64),
    S64(i64),
    Vec3Float([f32; 3]),
    Vec3Double([f64; 3]),
}

/// Fixed-size wire form of a [`ParameterValue`].
///
/// Large enough for the widest variant (three `f64`). The kind tag travels
/// next to it in the request/response; the bytes alone are not
/// self-describing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct RawParameterValue {
    pub bytes: [u8; 24],
}

const _: () = assert!(core::mem::size_of::<RawParameterValue>() == 24);

impl ParameterValue {
    /// Kind tag of this value.
    pub const fn kind(&self) -> ParameterKind {
        match self {
            Self::Float(_) => ParameterKind::Float,
            Self::Double(_) => ParameterKind::Double,
            Self::S64(_) => ParameterKind::S64,
            Self::Vec3Float(_) => ParameterKind::Vec3Float,
            Self::Vec3Double(_) => ParameterKind::Vec3Double,
        }
    }

    /// Zero value of the given kind.
    pub const fn zero(kind: ParameterKind) -> Self {
        match kind {
            ParameterKind::Float => Self::Float(0.0),
            ParameterKind::Double => Self::Double(0.0),
            ParameterKind::S64 => Self::S64(0),
            ParameterKind::Vec3Float => Self::Vec3Float([0.0; 3]),
            ParameterKind::Vec3Double => Self::Vec3Double([0.0; 3]),
        }
    }

    /// Encode into the wire form. Unused trailing bytes are zero.
    pub fn to_raw(&self) -> RawParameterValue {
        let mut raw = RawParameterValue::default();
        let b = &mut raw.bytes;
        match *self {
            Self::Float(v) => b[..4].copy_from_slice(&v.to_ne_bytes()),
            Self::Double(v) => b[..8].copy_from_slice(&v.to_ne_bytes()),
            Self::S64(v) => b[..8].copy_from_slice(&v.to_ne_bytes()),
            Self::Vec3Float(v) => {
                for (i, x) in v.iter().enumerate() {
                    b[i * 4..i * 4 + 4].copy_from_slice(&x.to_ne_bytes());
                }
            }
            Self::Vec3Double(v) => {
                for (i, x) in v.iter().enumerate() {
                    b[i * 8..i * 8 + 8].copy_from_slice(&x.to_ne_bytes());
                }
            }
        }
        raw
    }

    /// Decode the wire form according to `kind`.
    pub fn from_raw(kind: ParameterKind, raw: &RawParameterValue) -> Self {
        let b = &raw.bytes;
        let f32_at = |i: usize| f32::from_ne_bytes([b[i], b[i + 1], b[i + 2], b[i + 3]]);
        let word_at = |i: usize| {
            let mut w = [0u8; 8];
            w.copy_from_slice(&b[i..i + 8]);
            w
        };
        match kind {
            ParameterKind::Float => Self::Float(f32_at(0)),
            ParameterKind::Double => Self::Double(f64::from_ne_bytes(word_at(0))),
            ParameterKind::S64 => Self::S64(i64::from_ne_bytes(word_at(0))),
            ParameterKind::Vec3Float => Self::Vec3Float([f32_at(0), f32_at(4), f32_at(8)]),
            ParameterKind::Vec3Double => Self::Vec3Double([
                f64::from_ne_bytes(word_at(0)),
                f64::from_ne_bytes(word_at(8)),
                f64::from_ne_bytes(word_at(16)),
            ]),
        }
    }

    /// Decode a raw kind tag and value.
    pub fn from_wire(kind: u32, raw: &RawParameterValue) -> Result<Self, ParameterError> {
        let kind = ParameterKind::from_raw(kind).ok_or(ParameterError::UnknownKind(kind))?;
        Ok(Self::from_raw(kind, raw))
    }

    /// Read a value of `kind` from a TOML value.
    ///
    /// Integers are accepted where floats are expected.
    pub fn from_toml(kind: ParameterKind, value: &toml::Value) -> Option<Self> {
        fn number(v: &toml::Value) -> Option<f64> {
            match v {
                toml::Value::Float(f) => Some(*f),
                toml::Value::Integer(i) => Some(*i as f64),
                _ => None,
            }
        }
        fn triple(v: &toml::Value) -> Option<[f64; 3]> {
            match v.as_array()?.as_slice() {
                [x, y, z] => Some([number(x)?, number(y)?, number(z)?]),
                _ => None,
            }
        }

        Some(match kind {
            ParameterKind::Float => Self::Float(number(value)? as f32),
            ParameterKind::Double => Self::Double(number(value)?),
            ParameterKind::S64 => Self::S64(value.as_integer()?),
            ParameterKind::Vec3Float => {
                let [x, y, z] = triple(value)?;
                Self::Vec3Float([x as f32, y as f32, z as f32])
            }
            ParameterKind::Vec3Double => Self::Vec3Double(triple(value)?),
        })
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::S64(v) => write!(f, "{v}"),
            Self::Vec3Float([x, y, z]) => write!(f, "[{x}, {y}, {z}]"),
            Self::Vec3Double([x, y, z]) => write!(f, "[{x}, {y}, {z}]"),
        }
    }
}

// ─── Names ──────────────────────────────────────────────────────────

/// Build a bounded parameter name, rejecting empty, oversized or NUL names.
pub fn parameter_name(name: &str) -> Result<ParameterName, ParameterError> {
    if name.is_empty() {
        return Err(ParameterError::InvalidName("empty name".to_string()));
    }
    if name.contains('\0') {
        return Err(ParameterError::InvalidName(format!(
            "'{}' contains a NUL byte",
            name.escape_debug()
        )));
    }
    let mut out = ParameterName::new();
    out.push_str(name).map_err(|_| ParameterError::NameTooLong {
        name: name.to_string(),
        len: name.len(),
    })?;
    Ok(out)
}

/// Encode a name into the NUL-terminated wire buffer.
pub fn encode_name(name: &str) -> Result<WireName, ParameterError> {
    let name = parameter_name(name)?;
    let mut wire = [0u8; PARAMETER_NAME_CAPACITY];
    wire[..name.len()].copy_from_slice(name.as_bytes());
    Ok(wire)
}

/// Decode a wire name up to its first NUL.
pub fn decode_name(wire: &WireName) -> Result<ParameterName, ParameterError> {
    let end = wire
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ParameterError::InvalidName("name is not NUL-terminated".to_string()))?;
    let text = std::str::from_utf8(&wire[..end])
        .map_err(|e| ParameterError::InvalidName(format!("name is not UTF-8: {e}")))?;
    parameter_name(text)
}

// ─── Parameter files ────────────────────────────────────────────────

/// One `[parameters.<name>]` table of a parameter file.
#[derive(Debug, Clone, Deserialize)]
pub struct ParameterEntry {
    pub kind: ParameterKind,
    pub value: toml::Value,
}

/// TOML parameter file.
///
/// ```toml
/// [parameters.kp]
/// kind = "double"
/// value = 5.0
///
/// [parameters.home_pose]
/// kind = "vec3_double"
/// value = [0.0, -0.8, 1.6]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParameterFile {
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterEntry>,
}

impl ParameterFile {
    /// Load and decode a parameter file, sorted by name.
    pub fn load_values(path: &Path) -> Result<Vec<(ParameterName, ParameterValue)>, ParameterError> {
        Self::load(path)?.values()
    }

    /// Decode every entry, sorted by name.
    pub fn values(&self) -> Result<Vec<(ParameterName, ParameterValue)>, ParameterError> {
        self.parameters
            .iter()
            .map(|(name, entry)| {
                let value = ParameterValue::from_toml(entry.kind, &entry.value).ok_or_else(|| {
                    ParameterError::ValueMismatch {
                        name: name.clone(),
                        kind: entry.kind,
                    }
                })?;
                Ok((parameter_name(name)?, value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn kind_tags_match_wire_values() {
        assert_eq!(ParameterKind::Float.as_raw(), 0);
        assert_eq!(ParameterKind::Double.as_raw(), 1);
        assert_eq!(ParameterKind::S64.as_raw(), 2);
        assert_eq!(ParameterKind::Vec3Double.as_raw(), 3);
        assert_eq!(ParameterKind::Vec3Float.as_raw(), 4);
        assert!(ParameterKind::from_raw(5).is_none());
    }

    #[test]
    fn request_kind_helpers() {
        assert_eq!(RequestKind::set(false), RequestKind::SetRobotParamByName);
        assert_eq!(RequestKind::get(true), RequestKind::GetUserParamByName);
        assert!(RequestKind::SetUserParamByName.is_user());
        assert!(RequestKind::SetUserParamByName.is_set());
        assert!(!RequestKind::GetRobotParamByName.is_set());
        assert_eq!(RequestKind::from_raw(2), Some(RequestKind::GetUserParamByName));
        assert!(RequestKind::from_raw(4).is_none());
    }

    #[test]
    fn double_encoding_uses_first_word() {
        let raw = ParameterValue::Double(5.0).to_raw();
        assert_eq!(raw.bytes[..8], 5.0f64.to_ne_bytes());
        assert!(raw.bytes[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn from_wire_rejects_unknown_kind() {
        let raw = RawParameterValue::default();
        assert_eq!(
            ParameterValue::from_wire(9, &raw),
            Err(ParameterError::UnknownKind(9))
        );
    }

    #[test]
    fn display_formats() {
        assert_eq!(ParameterValue::Double(5.0).to_string(), "5");
        assert_eq!(ParameterValue::S64(-3).to_string(), "-3");
        assert_eq!(
            ParameterValue::Vec3Float([1.0, 2.5, 3.0]).to_string(),
            "[1, 2.5, 3]"
        );
    }

    #[test]
    fn name_limits() {
        let longest = "n".repeat(MAX_PARAMETER_NAME_LEN);
        assert!(encode_name(&longest).is_ok());
        let too_long = "n".repeat(PARAMETER_NAME_CAPACITY);
        assert!(matches!(
            encode_name(&too_long),
            Err(ParameterError::NameTooLong { len: 64, .. })
        ));
        assert!(encode_name("").is_err());
        assert!(encode_name("a\0b").is_err());
    }

    #[test]
    fn decode_name_requires_terminator() {
        let wire = [b'a'; PARAMETER_NAME_CAPACITY];
        assert!(decode_name(&wire).is_err());

        let mut wire = [0u8; PARAMETER_NAME_CAPACITY];
        wire[..2].copy_from_slice(b"kp");
        wire[3] = b'x';
        assert_eq!(decode_name(&wire).unwrap().as_str(), "kp");
    }

    #[test]
    fn toml_values_by_kind() {
        let float = toml::Value::Float(0.5);
        let int = toml::Value::Integer(7);
        let triple = toml::Value::Array(vec![int.clone(), float.clone(), int.clone()]);

        assert_eq!(
            ParameterValue::from_toml(ParameterKind::Double, &int),
            Some(ParameterValue::Double(7.0))
        );
        assert_eq!(ParameterValue::from_toml(ParameterKind::S64, &float), None);
        assert_eq!(
            ParameterValue::from_toml(ParameterKind::Vec3Double, &triple),
            Some(ParameterValue::Vec3Double([7.0, 0.5, 7.0]))
        );
        assert_eq!(ParameterValue::from_toml(ParameterKind::Vec3Float, &float), None);
    }

    #[test]
    fn load_parameter_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[parameters.kp]
kind = "double"
value = 5.0

[parameters.cheater_mode]
kind = "s64"
value = 1

[parameters.home]
kind = "vec3_float"
value = [0.0, -0.8, 1.6]
"#
        )
        .unwrap();
        file.flush().unwrap();

        let values = ParameterFile::load_values(file.path()).unwrap();
        let names: Vec<&str> = values.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["cheater_mode", "home", "kp"]);
        assert_eq!(values[2].1, ParameterValue::Double(5.0));
        assert_eq!(
            values[1].1,
            ParameterValue::Vec3Float([0.0, -0.8f64 as f32, 1.6f64 as f32])
        );
    }

    #[test]
    fn load_parameter_file_kind_mismatch() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[parameters.kp]\nkind = \"s64\"\nvalue = 1.5\n").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            ParameterFile::load_values(file.path()),
            Err(ParameterError::ValueMismatch { .. })
        ));
    }

    #[test]
    fn load_parameter_file_missing() {
        assert!(matches!(
            ParameterFile::load_values(Path::new("/nonexistent/params.toml")),
            Err(ParameterError::File(ConfigError::FileNotFound))
        ));
    }

    fn any_value() -> impl Strategy<Value = ParameterValue> {
        prop_oneof![
            any::<f32>().prop_filter("finite", |v| v.is_finite()).prop_map(ParameterValue::Float),
            any::<f64>().prop_filter("finite", |v| v.is_finite()).prop_map(ParameterValue::Double),
            any::<i64>().prop_map(ParameterValue::S64),
            prop::array::uniform3(-1.0e6f32..1.0e6).prop_map(ParameterValue::Vec3Float),
            prop::array::uniform3(-1.0e12f64..1.0e12).prop_map(ParameterValue::Vec3Double),
        ]
    }

    proptest! {
        #[test]
        fn wire_value_preserves_value(value in any_value()) {
            let raw = value.to_raw();
            prop_assert_eq!(ParameterValue::from_wire(value.kind().as_raw(), &raw), Ok(value));
        }

        #[test]
        fn wire_name_preserves_short_names(name in "[a-z_][a-z0-9_]{0,62}") {
            let wire = encode_name(&name).unwrap();
            prop_assert_eq!(wire[name.len()], 0);
            let decoded = decode_name(&wire).unwrap();
            prop_assert_eq!(decoded.as_str(), name.as_str());
        }
    }
}
