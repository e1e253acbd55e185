//! Named, typed control-parameter tables owned by the robot process.
//!
//! A table is declared up front with each parameter's kind. Values arrive
//! later, either from a parameter file or one at a time through the
//! simulator's parameter requests, and the controller may only start once
//! every declared entry has been written.

use crate::error::BridgeError;
use quad::params::{ParameterError, ParameterFile, ParameterKind, ParameterName, ParameterValue, parameter_name};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlParameter {
    name: ParameterName,
    value: ParameterValue,
    initialized: bool,
}

impl ControlParameter {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared kind. Fixed for the table's lifetime.
    pub fn kind(&self) -> ParameterKind {
        self.value.kind()
    }

    /// Current value; the zero value of the kind until first written.
    pub fn value(&self) -> ParameterValue {
        self.value
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// A table of control parameters, looked up by name.
#[derive(Debug, Clone)]
pub struct ControlParameters {
    table: String,
    entries: BTreeMap<String, ControlParameter>,
}

impl ControlParameters {
    /// Empty table. `table` names it in logs and errors ("robot", "user").
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Declare a parameter. Redeclaring a name resets it to uninitialised.
    pub fn declare(&mut self, name: &str, kind: ParameterKind) -> Result<(), ParameterError> {
        let name = parameter_name(name)?;
        self.entries.insert(
            name.to_string(),
            ControlParameter {
                name,
                value: ParameterValue::zero(kind),
                initialized: false,
            },
        );
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&ControlParameter> {
        self.entries.get(name)
    }

    /// Current value of `name`.
    pub fn get(&self, name: &str) -> Result<ParameterValue, BridgeError> {
        self.lookup(name)
            .map(ControlParameter::value)
            .ok_or_else(|| self.unknown(name))
    }

    /// Overwrite `name` in place and mark it initialised.
    ///
    /// The value's kind must equal the declared kind.
    pub fn set(&mut self, name: &str, value: ParameterValue) -> Result<(), BridgeError> {
        let unknown = self.unknown(name);
        let entry = self.entries.get_mut(name).ok_or(unknown)?;
        if entry.kind() != value.kind() {
            return Err(BridgeError::TypeMismatch {
                name: name.to_string(),
                stored: entry.kind(),
                requested: value.kind(),
            });
        }
        entry.value = value;
        entry.initialized = true;
        debug!(table = %self.table, name, %value, "Control parameter set");
        Ok(())
    }

    /// Names of the entries that were never written, sorted.
    pub fn uninitialized(&self) -> Vec<String> {
        self.entries
            .values()
            .filter(|p| !p.initialized)
            .map(|p| p.name.to_string())
            .collect()
    }

    pub fn is_fully_initialized(&self) -> bool {
        self.entries.values().all(|p| p.initialized)
    }

    /// Fail with [`BridgeError::ParametersNotInitialized`] unless every
    /// entry has been written.
    pub fn ensure_initialized(&self) -> Result<(), BridgeError> {
        let missing = self.uninitialized();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::ParametersNotInitialized {
                table: self.table.clone(),
                missing,
            })
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ControlParameter> {
        self.entries.values()
    }

    /// Apply decoded `(name, value)` pairs. Every name must be declared.
    pub fn apply(&mut self, values: &[(ParameterName, ParameterValue)]) -> Result<(), BridgeError> {
        for (name, value) in values {
            self.set(name, *value)?;
        }
        Ok(())
    }

    /// Load values from a TOML parameter file.
    pub fn load_file(&mut self, path: &Path) -> Result<(), BridgeError> {
        let values = ParameterFile::load_values(path)?;
        self.apply(&values)?;
        info!(
            table = %self.table,
            path = %path.display(),
            loaded = values.len(),
            missing = self.uninitialized().len(),
            "Control parameters loaded from file"
        );
        Ok(())
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        match self.lookup(name)?.value {
            ParameterValue::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn double(&self, name: &str) -> Option<f64> {
        match self.lookup(name)?.value {
            ParameterValue::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn s64(&self, name: &str) -> Option<i64> {
        match self.lookup(name)?.value {
            ParameterValue::S64(v) => Some(v),
            _ => None,
        }
    }

    pub fn vec3_float(&self, name: &str) -> Option<[f32; 3]> {
        match self.lookup(name)?.value {
            ParameterValue::Vec3Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn vec3_double(&self, name: &str) -> Option<[f64; 3]> {
        match self.lookup(name)?.value {
            ParameterValue::Vec3Double(v) => Some(v),
            _ => None,
        }
    }

    fn unknown(&self, name: &str) -> BridgeError {
        BridgeError::UnknownParameter {
            name: name.to_string(),
            table: self.table.clone(),
        }
    }
}

// ─── Robot parameter set ────────────────────────────────────────────

/// Control period the robot expects, in seconds.
pub const CONTROLLER_DT: &str = "controller_dt";
/// Selected control mode.
pub const CONTROL_MODE: &str = "control_mode";
/// Non-zero to feed simulator ground truth to the state estimator.
pub const CHEATER_MODE: &str = "cheater_mode";
/// Joint stiffness used while standing, abad/hip/knee.
pub const STAND_KP_JOINT: &str = "stand_kp_joint";
/// Joint damping used while standing, abad/hip/knee.
pub const STAND_KD_JOINT: &str = "stand_kd_joint";
pub const IMU_PROCESS_NOISE_POSITION: &str = "imu_process_noise_position";
pub const FOOT_SENSOR_NOISE_POSITION: &str = "foot_sensor_noise_position";
/// Non-zero to take commands from the radio controller instead of the gamepad.
pub const USE_RC: &str = "use_rc";

/// Declare the parameters every robot program needs, all uninitialised.
pub fn robot_parameters() -> Result<ControlParameters, ParameterError> {
    let mut table = ControlParameters::new("robot");
    for (name, kind) in [
        (CONTROLLER_DT, ParameterKind::Double),
        (CONTROL_MODE, ParameterKind::S64),
        (CHEATER_MODE, ParameterKind::S64),
        (STAND_KP_JOINT, ParameterKind::Vec3Double),
        (STAND_KD_JOINT, ParameterKind::Vec3Double),
        (IMU_PROCESS_NOISE_POSITION, ParameterKind::Double),
        (FOOT_SENSOR_NOISE_POSITION, ParameterKind::Double),
        (USE_RC, ParameterKind::S64),
    ] {
        table.declare(name, kind)?;
    }
    Ok(table)
}
