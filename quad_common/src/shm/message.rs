//! Wire structs of the simulator message.
//!
//! The whole [`SimulatorMessage`] lives in one shared region and is accessed
//! by exactly one peer at a time (see `quad_shared_memory::sync`). Its byte
//! layout is the protocol: both peers must be built from this file, and the
//! region size check at attach time is the only runtime defence against
//! skew.
//!
//! All structs are `#[repr(C)]`, fixed-size and pointer-free. Enumerations
//! cross the boundary as raw `u32` and are decoded with `from_raw`, so an
//! unexpected value is observed as `None` instead of undefined behaviour.
//!
//! ## Layout
//!
//! | Half                       | Direction        | Notable fields                      |
//! |----------------------------|------------------|-------------------------------------|
//! | [`RobotToSimulatorMessage`]| robot → sim      | leg commands, visualization, RPC response, error text |
//! | [`SimulatorToRobotMessage`]| sim → robot      | gamepad, IMU, cheater state, leg data, RPC request, mode |

use crate::consts::{
    ERROR_MESSAGE_CAPACITY, JOINTS_PER_LEG, MAX_VIS_ARROWS, MAX_VIS_PATH_POINTS, MAX_VIS_SPHERES,
    NUM_LEGS, PARAMETER_NAME_CAPACITY,
};
use crate::params::{
    ParameterError, ParameterKind, ParameterName, ParameterValue, RawParameterValue, RequestKind,
    WireName, decode_name, encode_name,
};
use crate::robot::RobotType;
use crate::shm::plain::PlainData;
use bitflags::bitflags;
use static_assertions::const_assert_eq;
use std::borrow::Cow;
use std::fmt;

// ─── Mode ───────────────────────────────────────────────────────────

/// What the robot should do during its next turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Mode {
    /// Process one control parameter request; do not run the controller.
    ApplyControlParameters = 0,
    /// Run one controller iteration.
    RunController = 1,
    /// Connection check only.
    Idle = 2,
    /// Finish the turn and shut down.
    Exit = 3,
}

impl Mode {
    /// Convert from raw `u32` value. Returns `None` for invalid values.
    #[inline]
    pub const fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::ApplyControlParameters),
            1 => Some(Self::RunController),
            2 => Some(Self::Idle),
            3 => Some(Self::Exit),
            _ => None,
        }
    }

    /// Raw wire value.
    #[inline]
    pub const fn as_raw(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ApplyControlParameters => "apply-control-parameters",
            Self::RunController => "run-controller",
            Self::Idle => "idle",
            Self::Exit => "exit",
        })
    }
}

// ─── Gamepad ────────────────────────────────────────────────────────

bitflags! {
    /// Digital gamepad buttons, packed into [`GamepadCommand::buttons`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GamepadButtons: u32 {
        const LEFT_BUMPER = 1 << 0;
        const RIGHT_BUMPER = 1 << 1;
        const LEFT_TRIGGER_BUTTON = 1 << 2;
        const RIGHT_TRIGGER_BUTTON = 1 << 3;
        const BACK = 1 << 4;
        const START = 1 << 5;
        const A = 1 << 6;
        const B = 1 << 7;
        const X = 1 << 8;
        const Y = 1 << 9;
        const LEFT_STICK_BUTTON = 1 << 10;
        const RIGHT_STICK_BUTTON = 1 << 11;
        const LOGITECH = 1 << 12;
    }
}

/// Gamepad snapshot written by the simulator's input collaborator.
///
/// Size: 28 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct GamepadCommand {
    /// Raw [`GamepadButtons`] bits.
    pub buttons: u32,
    /// Left stick (x, y) in [-1, 1].
    pub left_stick_analog: [f32; 2],
    /// Right stick (x, y) in [-1, 1].
    pub right_stick_analog: [f32; 2],
    /// Left trigger in [0, 1].
    pub left_trigger_analog: f32,
    /// Right trigger in [0, 1].
    pub right_trigger_analog: f32,
}

impl GamepadCommand {
    /// Pressed buttons; unknown bits are dropped.
    pub fn buttons(&self) -> GamepadButtons {
        GamepadButtons::from_bits_truncate(self.buttons)
    }

    pub fn set_buttons(&mut self, buttons: GamepadButtons) {
        self.buttons = buttons.bits();
    }
}

// ─── Sensors ────────────────────────────────────────────────────────

/// IMU snapshot.
///
/// Size: 40 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct VectorNavData {
    pub accelerometer: [f32; 3],
    pub gyro: [f32; 3],
    /// Orientation quaternion (w, x, y, z).
    pub quat: [f32; 4],
}

/// Simulation-only ground-truth body state.
///
/// Size: 128 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct CheaterState {
    /// Orientation quaternion (w, x, y, z).
    pub orientation: [f64; 4],
    pub position: [f64; 3],
    pub omega_body: [f64; 3],
    pub v_body: [f64; 3],
    pub acceleration: [f64; 3],
}

/// Per-leg joint feedback over SPI (Mini Cheetah, Cyberdog).
///
/// Size: 116 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct SpiData {
    pub q_abad: [f32; NUM_LEGS],
    pub q_hip: [f32; NUM_LEGS],
    pub q_knee: [f32; NUM_LEGS],
    pub qd_abad: [f32; NUM_LEGS],
    pub qd_hip: [f32; NUM_LEGS],
    pub qd_knee: [f32; NUM_LEGS],
    pub flags: [i32; NUM_LEGS],
    pub spi_driver_status: i32,
}

impl SpiData {
    /// Joint positions of one leg (abad, hip, knee).
    pub fn leg_q(&self, leg: usize) -> [f32; JOINTS_PER_LEG] {
        [self.q_abad[leg], self.q_hip[leg], self.q_knee[leg]]
    }

    /// Joint velocities of one leg (abad, hip, knee).
    pub fn leg_qd(&self, leg: usize) -> [f32; JOINTS_PER_LEG] {
        [self.qd_abad[leg], self.qd_hip[leg], self.qd_knee[leg]]
    }
}

/// Per-leg joint command over SPI.
///
/// Size: 256 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct SpiCommand {
    pub q_des_abad: [f32; NUM_LEGS],
    pub q_des_hip: [f32; NUM_LEGS],
    pub q_des_knee: [f32; NUM_LEGS],
    pub qd_des_abad: [f32; NUM_LEGS],
    pub qd_des_hip: [f32; NUM_LEGS],
    pub qd_des_knee: [f32; NUM_LEGS],
    pub kp_abad: [f32; NUM_LEGS],
    pub kp_hip: [f32; NUM_LEGS],
    pub kp_knee: [f32; NUM_LEGS],
    pub kd_abad: [f32; NUM_LEGS],
    pub kd_hip: [f32; NUM_LEGS],
    pub kd_knee: [f32; NUM_LEGS],
    pub tau_abad_ff: [f32; NUM_LEGS],
    pub tau_hip_ff: [f32; NUM_LEGS],
    pub tau_knee_ff: [f32; NUM_LEGS],
    pub flags: [i32; NUM_LEGS],
}

/// One leg joint target: position, velocity, gains and feed-forward torque.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JointTarget {
    pub q_des: f32,
    pub qd_des: f32,
    pub kp: f32,
    pub kd: f32,
    pub tau_ff: f32,
}

impl SpiCommand {
    /// Write the (abad, hip, knee) targets of one leg and enable it.
    pub fn set_leg(&mut self, leg: usize, joints: [JointTarget; JOINTS_PER_LEG]) {
        let [abad, hip, knee] = joints;
        self.q_des_abad[leg] = abad.q_des;
        self.q_des_hip[leg] = hip.q_des;
        self.q_des_knee[leg] = knee.q_des;
        self.qd_des_abad[leg] = abad.qd_des;
        self.qd_des_hip[leg] = hip.qd_des;
        self.qd_des_knee[leg] = knee.qd_des;
        self.kp_abad[leg] = abad.kp;
        self.kp_hip[leg] = hip.kp;
        self.kp_knee[leg] = knee.kp;
        self.kd_abad[leg] = abad.kd;
        self.kd_hip[leg] = hip.kd;
        self.kd_knee[leg] = knee.kd;
        self.tau_abad_ff[leg] = abad.tau_ff;
        self.tau_hip_ff[leg] = hip.tau_ff;
        self.tau_knee_ff[leg] = knee.tau_ff;
        self.flags[leg] = 1;
    }
}

/// Per-leg feedback from a TI board (Cheetah 3).
///
/// Size: 96 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct TiBoardData {
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub force: [f32; 3],
    pub q: [f32; JOINTS_PER_LEG],
    pub dq: [f32; JOINTS_PER_LEG],
    pub tau: [f32; JOINTS_PER_LEG],
    pub tau_des: [f32; JOINTS_PER_LEG],
    pub loop_count_ti: u32,
    pub ethercat_count_ti: u32,
    pub microtime_ti: u32,
}

/// Per-leg command to a TI board (Cheetah 3).
///
/// Size: 128 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct TiBoardCommand {
    pub position_des: [f32; 3],
    pub velocity_des: [f32; 3],
    pub kp: [f32; 3],
    pub kd: [f32; 3],
    pub force_ff: [f32; 3],
    pub tau_ff: [f32; JOINTS_PER_LEG],
    pub q_des: [f32; JOINTS_PER_LEG],
    pub qd_des: [f32; JOINTS_PER_LEG],
    pub kp_joint: [f32; JOINTS_PER_LEG],
    pub kd_joint: [f32; JOINTS_PER_LEG],
    /// 0 = disabled, 1 = enabled.
    pub enable: u32,
    pub max_torque: f32,
}

// ─── Visualization ──────────────────────────────────────────────────

/// Debug sphere.
///
/// Size: 32 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct SphereVisualization {
    pub position: [f32; 3],
    pub radius: f32,
    /// RGBA.
    pub color: [f32; 4],
}

/// Debug arrow.
///
/// Size: 52 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct ArrowVisualization {
    pub base_position: [f32; 3],
    pub direction: [f32; 3],
    pub head_width: f32,
    pub head_length: f32,
    pub shaft_width: f32,
    /// RGBA.
    pub color: [f32; 4],
}

/// Bounded debug drawing payload. Counts beyond capacity are never written.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct VisualizationData {
    pub num_spheres: u32,
    pub num_arrows: u32,
    pub num_path_points: u32,
    pub reserved: u32,
    pub spheres: [SphereVisualization; MAX_VIS_SPHERES],
    pub arrows: [ArrowVisualization; MAX_VIS_ARROWS],
    pub path: [[f32; 3]; MAX_VIS_PATH_POINTS],
    /// RGBA colour of the path.
    pub path_color: [f32; 4],
}

impl VisualizationData {
    /// Drop every drawing.
    pub fn clear(&mut self) {
        self.num_spheres = 0;
        self.num_arrows = 0;
        self.num_path_points = 0;
    }

    /// Add a sphere. Returns `false` when full.
    pub fn push_sphere(&mut self, sphere: SphereVisualization) -> bool {
        push_bounded(&mut self.spheres, &mut self.num_spheres, sphere)
    }

    /// Add an arrow. Returns `false` when full.
    pub fn push_arrow(&mut self, arrow: ArrowVisualization) -> bool {
        push_bounded(&mut self.arrows, &mut self.num_arrows, arrow)
    }

    /// Append a path point. Returns `false` when full.
    pub fn push_path_point(&mut self, point: [f32; 3]) -> bool {
        push_bounded(&mut self.path, &mut self.num_path_points, point)
    }

    /// Spheres currently in use.
    pub fn spheres(&self) -> &[SphereVisualization] {
        &self.spheres[..(self.num_spheres as usize).min(MAX_VIS_SPHERES)]
    }

    /// Arrows currently in use.
    pub fn arrows(&self) -> &[ArrowVisualization] {
        &self.arrows[..(self.num_arrows as usize).min(MAX_VIS_ARROWS)]
    }

    /// Path points currently in use.
    pub fn path(&self) -> &[[f32; 3]] {
        &self.path[..(self.num_path_points as usize).min(MAX_VIS_PATH_POINTS)]
    }
}

fn push_bounded<T, const N: usize>(slots: &mut [T; N], count: &mut u32, item: T) -> bool {
    let n = *count as usize;
    if n >= N {
        return false;
    }
    slots[n] = item;
    *count += 1;
    true
}

/// Pose of the main robot body for the 3D view.
///
/// Size: 168 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct MainVisualization {
    pub position: [f64; 3],
    /// Orientation quaternion (w, x, y, z).
    pub quat: [f64; 4],
    /// Joint angles, leg-major (abad, hip, knee per leg).
    pub q: [f64; NUM_LEGS * JOINTS_PER_LEG],
    /// RGBA.
    pub color: [f32; 4],
}

// ─── Control parameter RPC ──────────────────────────────────────────

/// Control parameter request written by the simulator.
///
/// Size: 104 bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct ControlParameterRequest {
    /// Monotonic request counter. Only a value one above the last response
    /// number is a new request.
    pub request_number: u64,
    pub value: RawParameterValue,
    pub name: WireName,
    /// Raw [`RequestKind`].
    pub request_kind: u32,
    /// Raw [`ParameterKind`].
    pub value_kind: u32,
}

impl ControlParameterRequest {
    /// Write a complete request.
    ///
    /// The value's kind becomes the request's value kind. For get requests
    /// the value is ignored by the robot; only its kind matters.
    pub fn publish(
        &mut self,
        request_number: u64,
        kind: RequestKind,
        name: &str,
        value: ParameterValue,
    ) -> Result<(), ParameterError> {
        self.name = encode_name(name)?;
        self.request_number = request_number;
        self.request_kind = kind.as_raw();
        self.value_kind = value.kind().as_raw();
        self.value = value.to_raw();
        Ok(())
    }

    pub fn request_kind(&self) -> Result<RequestKind, ParameterError> {
        RequestKind::from_raw(self.request_kind)
            .ok_or(ParameterError::UnknownRequestKind(self.request_kind))
    }

    pub fn value_kind(&self) -> Result<ParameterKind, ParameterError> {
        ParameterKind::from_raw(self.value_kind).ok_or(ParameterError::UnknownKind(self.value_kind))
    }

    pub fn name(&self) -> Result<ParameterName, ParameterError> {
        decode_name(&self.name)
    }

    pub fn value(&self) -> Result<ParameterValue, ParameterError> {
        ParameterValue::from_wire(self.value_kind, &self.value)
    }
}

/// Control parameter response written by the robot.
///
/// Size: 112 bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct ControlParameterResponse {
    /// Number of the last request processed.
    pub request_number: u64,
    /// Size of the robot parameter table.
    pub n_parameters: u64,
    /// Current value after the request was applied.
    pub value: RawParameterValue,
    pub name: WireName,
    pub request_kind: u32,
    pub value_kind: u32,
}

impl ControlParameterResponse {
    /// Echo a processed request back with the now-current value.
    pub fn acknowledge(
        &mut self,
        request: &ControlParameterRequest,
        value: ParameterValue,
        n_parameters: usize,
    ) {
        self.request_number = request.request_number;
        self.n_parameters = n_parameters as u64;
        self.request_kind = request.request_kind;
        self.name = request.name;
        self.value_kind = value.kind().as_raw();
        self.value = value.to_raw();
    }

    pub fn request_kind(&self) -> Result<RequestKind, ParameterError> {
        RequestKind::from_raw(self.request_kind)
            .ok_or(ParameterError::UnknownRequestKind(self.request_kind))
    }

    pub fn name(&self) -> Result<ParameterName, ParameterError> {
        decode_name(&self.name)
    }

    pub fn value(&self) -> Result<ParameterValue, ParameterError> {
        ParameterValue::from_wire(self.value_kind, &self.value)
    }
}

// ─── Directional halves ─────────────────────────────────────────────

/// Everything the simulator hands to the robot for one turn.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C, align(64))]
pub struct SimulatorToRobotMessage {
    pub gamepad_command: GamepadCommand,
    /// Raw [`RobotType`] the simulator is simulating.
    pub robot_type: u32,
    pub vector_nav: VectorNavData,
    pub cheater_state: CheaterState,
    pub spi_data: SpiData,
    pub ti_board_data: [TiBoardData; NUM_LEGS],
    pub control_parameter_request: ControlParameterRequest,
    /// Raw [`Mode`].
    pub mode: u32,
}

impl SimulatorToRobotMessage {
    pub fn mode(&self) -> Option<Mode> {
        Mode::from_raw(self.mode)
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode.as_raw();
    }

    pub fn robot_type(&self) -> Option<RobotType> {
        RobotType::from_raw(self.robot_type)
    }
}

/// Everything the robot hands back to the simulator after its turn.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C, align(64))]
pub struct RobotToSimulatorMessage {
    /// Raw [`RobotType`] echo of the launch variant.
    pub robot_type: u32,
    pub spi_command: SpiCommand,
    pub ti_board_command: [TiBoardCommand; NUM_LEGS],
    pub visualization_data: VisualizationData,
    pub main_visualization: MainVisualization,
    pub control_parameter_response: ControlParameterResponse,
    /// NUL-terminated description of a fatal robot fault. Empty while the
    /// robot is healthy.
    pub error_message: [u8; ERROR_MESSAGE_CAPACITY],
}

impl RobotToSimulatorMessage {
    pub fn robot_type(&self) -> Option<RobotType> {
        RobotType::from_raw(self.robot_type)
    }

    /// Published fault text up to the first NUL, or `None` when empty.
    pub fn error_message(&self) -> Option<Cow<'_, str>> {
        let text = c_str_bytes(&self.error_message);
        (!text.is_empty()).then(|| String::from_utf8_lossy(text))
    }

    /// Replace the fault text. Truncates to capacity; always NUL-terminated.
    pub fn set_error_message(&mut self, message: &str) -> usize {
        write_c_str(&mut self.error_message, message)
    }
}

/// Bytes of a C string buffer up to (not including) the first NUL.
pub fn c_str_bytes(buf: &[u8]) -> &[u8] {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    &buf[..end]
}

/// Copy `message` into `buf` as a C string.
///
/// The copy is cut at a UTF-8 character boundary so that at least one NUL
/// fits; the rest of the buffer is zeroed. Returns the number of text bytes
/// written. An empty buffer is left untouched.
pub fn write_c_str(buf: &mut [u8], message: &str) -> usize {
    let Some(max) = buf.len().checked_sub(1) else {
        return 0;
    };
    let mut len = message.len().min(max);
    while !message.is_char_boundary(len) {
        len -= 1;
    }
    buf[..len].copy_from_slice(&message.as_bytes()[..len]);
    buf[len..].fill(0);
    len
}

// ─── Aggregate ──────────────────────────────────────────────────────

/// The single structure stored in the shared region.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct SimulatorMessage {
    pub robot_to_sim: RobotToSimulatorMessage,
    pub sim_to_robot: SimulatorToRobotMessage,
}

// ─── Default via zeroed() ───────────────────────────────────────────
//
// Large wire structs use mem::zeroed() for Default to avoid deep stack
// usage and the array-size limits of derived Default.

macro_rules! impl_default_zeroed {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Default for $ty {
                fn default() -> Self {
                    // SAFETY: All fields are numeric primitives or fixed-size arrays
                    // of numeric primitives. Zero is a valid value for every field.
                    unsafe { core::mem::zeroed() }
                }
            }
        )*
    };
}

impl_default_zeroed!(
    VisualizationData,
    ControlParameterRequest,
    ControlParameterResponse,
    SimulatorToRobotMessage,
    RobotToSimulatorMessage,
    SimulatorMessage,
);

macro_rules! impl_plain_data {
    ($($ty:ty),* $(,)?) => {
        $(
            // SAFETY: #[repr(C)], pointer-free, zero is valid (see Default).
            unsafe impl PlainData for $ty {}
        )*
    };
}

impl_plain_data!(
    GamepadCommand,
    VectorNavData,
    CheaterState,
    SpiData,
    SpiCommand,
    TiBoardData,
    TiBoardCommand,
    SphereVisualization,
    ArrowVisualization,
    VisualizationData,
    MainVisualization,
    ControlParameterRequest,
    ControlParameterResponse,
    SimulatorToRobotMessage,
    RobotToSimulatorMessage,
    SimulatorMessage,
);

// ─── Compile-time layout assertions ─────────────────────────────────

const_assert_eq!(core::mem::size_of::<GamepadCommand>(), 28);
const_assert_eq!(core::mem::size_of::<VectorNavData>(), 40);
const_assert_eq!(core::mem::size_of::<CheaterState>(), 128);
const_assert_eq!(core::mem::size_of::<SpiData>(), 116);
const_assert_eq!(core::mem::size_of::<SpiCommand>(), 256);
const_assert_eq!(core::mem::size_of::<TiBoardData>(), 96);
const_assert_eq!(core::mem::size_of::<TiBoardCommand>(), 128);
const_assert_eq!(core::mem::size_of::<SphereVisualization>(), 32);
const_assert_eq!(core::mem::size_of::<ArrowVisualization>(), 52);
const_assert_eq!(core::mem::size_of::<MainVisualization>(), 168);
const_assert_eq!(core::mem::size_of::<ControlParameterRequest>(), 104);
const_assert_eq!(core::mem::size_of::<ControlParameterResponse>(), 112);

const _: () = assert!(PARAMETER_NAME_CAPACITY == 64);
const _: () = assert!(ERROR_MESSAGE_CAPACITY >= 2048);
const _: () = assert!(core::mem::align_of::<SimulatorToRobotMessage>() == 64);
const _: () = assert!(core::mem::align_of::<RobotToSimulatorMessage>() == 64);
const _: () = assert!(core::mem::size_of::<SimulatorToRobotMessage>() % 64 == 0);
const _: () = assert!(core::mem::size_of::<RobotToSimulatorMessage>() % 64 == 0);
const _: () = assert!(
    core::mem::size_of::<SimulatorMessage>()
        == core::mem::size_of::<SimulatorToRobotMessage>()
            + core::mem::size_of::<RobotToSimulatorMessage>()
);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn mode_raw_values() {
        assert_eq!(Mode::from_raw(0), Some(Mode::ApplyControlParameters));
        assert_eq!(Mode::from_raw(3), Some(Mode::Exit));
        assert_eq!(Mode::from_raw(4), None);
        assert_eq!(Mode::RunController.as_raw(), 1);
    }

    #[test]
    fn default_message_is_zeroed() {
        let msg = SimulatorMessage::default();
        assert_eq!(msg.sim_to_robot.mode(), Some(Mode::ApplyControlParameters));
        assert_eq!(msg.sim_to_robot.control_parameter_request.request_number, 0);
        assert_eq!(msg.robot_to_sim.control_parameter_response.request_number, 0);
        assert!(msg.robot_to_sim.error_message().is_none());
    }

    #[test]
    fn gamepad_buttons_ignore_unknown_bits() {
        let mut pad = GamepadCommand::default();
        pad.set_buttons(GamepadButtons::A | GamepadButtons::START);
        assert!(pad.buttons().contains(GamepadButtons::A));
        pad.buttons |= 1 << 31;
        assert_eq!(pad.buttons(), GamepadButtons::A | GamepadButtons::START);
    }

    #[test]
    fn spi_command_set_leg() {
        let mut cmd = SpiCommand::default();
        let target = |q| JointTarget {
            q_des: q,
            kp: 10.0,
            kd: 0.5,
            ..JointTarget::default()
        };
        cmd.set_leg(2, [target(0.1), target(-0.8), target(1.6)]);
        assert_eq!(cmd.q_des_knee[2], 1.6);
        assert_eq!(cmd.kp_hip[2], 10.0);
        assert_eq!(cmd.flags, [0, 0, 1, 0]);
    }

    #[test]
    fn visualization_is_bounded() {
        let mut vis = VisualizationData::default();
        for _ in 0..MAX_VIS_SPHERES {
            assert!(vis.push_sphere(SphereVisualization::default()));
        }
        assert!(!vis.push_sphere(SphereVisualization::default()));
        assert_eq!(vis.spheres().len(), MAX_VIS_SPHERES);

        vis.num_arrows = u32::MAX;
        assert_eq!(vis.arrows().len(), MAX_VIS_ARROWS);
        vis.clear();
        assert!(vis.spheres().is_empty());
        assert!(vis.push_path_point([1.0, 2.0, 3.0]));
        assert_eq!(vis.path(), &[[1.0, 2.0, 3.0]]);
    }

    #[test]
    fn request_publish_and_acknowledge() {
        let mut msg = SimulatorMessage::default();
        msg.sim_to_robot
            .control_parameter_request
            .publish(1, RequestKind::SetRobotParamByName, "kp", ParameterValue::Double(5.0))
            .unwrap();

        let request = msg.sim_to_robot.control_parameter_request;
        assert_eq!(request.request_kind().unwrap(), RequestKind::SetRobotParamByName);
        assert_eq!(request.name().unwrap().as_str(), "kp");
        assert_eq!(request.value().unwrap(), ParameterValue::Double(5.0));

        let response = &mut msg.robot_to_sim.control_parameter_response;
        response.acknowledge(&request, ParameterValue::Double(5.0), 7);
        assert_eq!(response.request_number, 1);
        assert_eq!(response.n_parameters, 7);
        assert_eq!(response.name().unwrap().as_str(), "kp");
        assert_eq!(response.value().unwrap(), ParameterValue::Double(5.0));
    }

    #[test]
    fn request_rejects_bad_tags() {
        let mut request = ControlParameterRequest::default();
        request.request_kind = 17;
        request.value_kind = 9;
        assert_eq!(request.request_kind(), Err(ParameterError::UnknownRequestKind(17)));
        assert_eq!(request.value_kind(), Err(ParameterError::UnknownKind(9)));
    }

    #[test]
    fn error_message_truncates_and_terminates() {
        let mut msg = RobotToSimulatorMessage::default();
        let long = "e".repeat(ERROR_MESSAGE_CAPACITY * 2);
        let written = msg.set_error_message(&long);
        assert_eq!(written, ERROR_MESSAGE_CAPACITY - 1);
        assert_eq!(msg.error_message[ERROR_MESSAGE_CAPACITY - 1], 0);

        msg.set_error_message("short");
        assert_eq!(msg.error_message().unwrap(), "short");
        assert!(msg.error_message[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn write_c_str_respects_char_boundaries() {
        let mut buf = [0xAAu8; 4];
        // "é" is two bytes; only one fits after "ab" with the NUL.
        assert_eq!(write_c_str(&mut buf, "abé"), 2);
        assert_eq!(buf, [b'a', b'b', 0, 0]);
        assert_eq!(write_c_str(&mut [], "x"), 0);
    }

    proptest! {
        #[test]
        fn write_c_str_always_terminates(msg in "[a-zA-Z0-9 éü]{0,64}", cap in 1usize..48) {
            let mut buf = vec![0xFFu8; cap];
            let written = write_c_str(&mut buf, &msg);
            prop_assert!(written < cap);
            prop_assert_eq!(buf[written], 0);
            prop_assert!(msg.as_bytes().starts_with(&buf[..written]));
            prop_assert_eq!(c_str_bytes(&buf).len(), written);
        }
    }
}
