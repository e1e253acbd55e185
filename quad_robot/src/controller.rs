//! Controller interface and the built-in joint PD stand controller.
//!
//! The bridge hands a controller a [`ControllerIo`] each turn: shared views
//! of what the simulator wrote and exclusive views of what the robot
//! answers, all pointing straight into the mapped message.

use crate::params::{ControlParameters, STAND_KD_JOINT, STAND_KP_JOINT};
use quad::consts::{JOINTS_PER_LEG, NUM_LEGS};
use quad::params::{ParameterError, ParameterKind};
use quad::robot::RobotType;
use quad::shm::message::{
    CheaterState, GamepadCommand, JointTarget, MainVisualization, SimulatorMessage,
    SphereVisualization, SpiCommand, SpiData, TiBoardCommand, TiBoardData, VectorNavData,
    VisualizationData,
};
use thiserror::Error;
use tracing::info;

/// Errors raised by a controller iteration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControllerError {
    #[error("parameter '{name}' is missing or not a {expected}")]
    Parameter {
        name: &'static str,
        expected: ParameterKind,
    },

    #[error("non-finite {what} on leg {leg}")]
    NonFinite { what: &'static str, leg: usize },

    #[error(transparent)]
    Declaration(#[from] ParameterError),
}

/// One control iteration's inputs and outputs.
pub struct ControllerIo<'a> {
    pub robot_type: RobotType,
    pub gamepad: &'a GamepadCommand,
    pub vector_nav: &'a VectorNavData,
    pub cheater_state: &'a CheaterState,
    pub spi_data: &'a SpiData,
    pub ti_board_data: &'a [TiBoardData; NUM_LEGS],
    pub spi_command: &'a mut SpiCommand,
    pub ti_board_command: &'a mut [TiBoardCommand; NUM_LEGS],
    pub visualization: &'a mut VisualizationData,
    pub main_visualization: &'a mut MainVisualization,
    pub robot_parameters: &'a ControlParameters,
}

impl<'a> ControllerIo<'a> {
    /// Borrow the controller fields of `message` for one iteration.
    pub fn bind(
        robot_type: RobotType,
        message: &'a mut SimulatorMessage,
        robot_parameters: &'a ControlParameters,
    ) -> Self {
        let SimulatorMessage {
            robot_to_sim,
            sim_to_robot,
        } = message;
        Self {
            robot_type,
            gamepad: &sim_to_robot.gamepad_command,
            vector_nav: &sim_to_robot.vector_nav,
            cheater_state: &sim_to_robot.cheater_state,
            spi_data: &sim_to_robot.spi_data,
            ti_board_data: &sim_to_robot.ti_board_data,
            spi_command: &mut robot_to_sim.spi_command,
            ti_board_command: &mut robot_to_sim.ti_board_command,
            visualization: &mut robot_to_sim.visualization_data,
            main_visualization: &mut robot_to_sim.main_visualization,
            robot_parameters,
        }
    }

    /// Measured joint positions of `leg`, from whichever leg interface the
    /// robot uses.
    pub fn joint_positions(&self, leg: usize) -> [f32; JOINTS_PER_LEG] {
        if self.robot_type.uses_spi() {
            self.spi_data.leg_q(leg)
        } else {
            self.ti_board_data[leg].q
        }
    }

    /// Measured joint velocities of `leg`.
    pub fn joint_velocities(&self, leg: usize) -> [f32; JOINTS_PER_LEG] {
        if self.robot_type.uses_spi() {
            self.spi_data.leg_qd(leg)
        } else {
            self.ti_board_data[leg].dq
        }
    }

    /// Write a joint-space command for `leg`.
    pub fn command_leg(&mut self, leg: usize, joints: [JointTarget; JOINTS_PER_LEG], max_torque: f32) {
        if self.robot_type.uses_spi() {
            self.spi_command.set_leg(leg, joints);
            return;
        }
        let cmd = &mut self.ti_board_command[leg];
        for (j, target) in joints.iter().enumerate() {
            cmd.q_des[j] = target.q_des;
            cmd.qd_des[j] = target.qd_des;
            cmd.kp_joint[j] = target.kp;
            cmd.kd_joint[j] = target.kd;
            cmd.tau_ff[j] = target.tau_ff;
        }
        cmd.max_torque = max_torque;
        cmd.enable = 1;
    }
}

/// A controller driven one iteration per `RunController` turn.
pub trait RobotController {
    /// Called once, on the first `RunController` turn, after every
    /// parameter has been checked.
    fn initialize(&mut self, io: &mut ControllerIo<'_>) -> Result<(), ControllerError>;

    /// One control iteration.
    fn run(&mut self, io: &mut ControllerIo<'_>) -> Result<(), ControllerError>;

    /// Controller-specific parameters, if the controller has any.
    fn user_parameters(&self) -> Option<&ControlParameters> {
        None
    }

    fn user_parameters_mut(&mut self) -> Option<&mut ControlParameters> {
        None
    }
}

// ─── Joint PD stand controller ──────────────────────────────────────

/// Target joint angles (abad, hip, knee) held by every leg.
pub const HOME_POSE: &str = "home_pose";
/// Torque limit passed to the leg boards.
pub const MAX_TORQUE: &str = "max_torque";
/// Iterations spent blending from the initial pose to the home pose.
pub const BLEND_ITERATIONS: &str = "blend_iterations";

const BODY_MARKER_RADIUS: f32 = 0.05;
const BODY_MARKER_COLOR: [f32; 4] = [0.2, 0.6, 1.0, 0.7];

/// Holds every leg at a fixed pose with joint PD control.
///
/// Gains come from the robot table (`stand_kp_joint`, `stand_kd_joint`);
/// the pose, torque limit and blend length from the controller's own
/// user table.
#[derive(Debug)]
pub struct JointPdController {
    user: ControlParameters,
    initial_pose: [[f32; JOINTS_PER_LEG]; NUM_LEGS],
    iteration: u64,
}

impl JointPdController {
    pub fn new() -> Result<Self, ControllerError> {
        let mut user = ControlParameters::new("user");
        user.declare(HOME_POSE, ParameterKind::Vec3Double)?;
        user.declare(MAX_TORQUE, ParameterKind::Float)?;
        user.declare(BLEND_ITERATIONS, ParameterKind::S64)?;
        Ok(Self {
            user,
            initial_pose: [[0.0; JOINTS_PER_LEG]; NUM_LEGS],
            iteration: 0,
        })
    }

    /// Iterations run since [`RobotController::initialize`].
    pub fn iterations(&self) -> u64 {
        self.iteration
    }

    fn blend_fraction(&self) -> Result<f32, ControllerError> {
        let steps = self.user.s64(BLEND_ITERATIONS).ok_or(ControllerError::Parameter {
            name: BLEND_ITERATIONS,
            expected: ParameterKind::S64,
        })?;
        if steps <= 0 {
            return Ok(1.0);
        }
        Ok((self.iteration as f32 / steps as f32).min(1.0))
    }
}

fn vec3_double(
    table: &ControlParameters,
    name: &'static str,
) -> Result<[f32; 3], ControllerError> {
    let [x, y, z] = table.vec3_double(name).ok_or(ControllerError::Parameter {
        name,
        expected: ParameterKind::Vec3Double,
    })?;
    Ok([x as f32, y as f32, z as f32])
}

impl RobotController for JointPdController {
    fn initialize(&mut self, io: &mut ControllerIo<'_>) -> Result<(), ControllerError> {
        for leg in 0..NUM_LEGS {
            let q = io.joint_positions(leg);
            if q.iter().any(|v| !v.is_finite()) {
                return Err(ControllerError::NonFinite {
                    what: "joint position",
                    leg,
                });
            }
            self.initial_pose[leg] = q;
        }
        self.iteration = 0;
        info!(robot = %io.robot_type, "Joint PD stand controller initialized");
        Ok(())
    }

    fn run(&mut self, io: &mut ControllerIo<'_>) -> Result<(), ControllerError> {
        let kp = vec3_double(io.robot_parameters, STAND_KP_JOINT)?;
        let kd = vec3_double(io.robot_parameters, STAND_KD_JOINT)?;
        let home = vec3_double(&self.user, HOME_POSE)?;
        let max_torque = self.user.float(MAX_TORQUE).ok_or(ControllerError::Parameter {
            name: MAX_TORQUE,
            expected: ParameterKind::Float,
        })?;
        let alpha = self.blend_fraction()?;

        for leg in 0..NUM_LEGS {
            if io.joint_velocities(leg).iter().any(|v| !v.is_finite()) {
                return Err(ControllerError::NonFinite {
                    what: "joint velocity",
                    leg,
                });
            }
            let start = self.initial_pose[leg];
            let joints: [JointTarget; JOINTS_PER_LEG] = std::array::from_fn(|j| JointTarget {
                q_des: start[j] + alpha * (home[j] - start[j]),
                qd_des: 0.0,
                kp: kp[j],
                kd: kd[j],
                tau_ff: 0.0,
            });
            io.command_leg(leg, joints, max_torque);
        }

        let body = io.cheater_state;
        io.main_visualization.position = body.position;
        io.main_visualization.quat = body.orientation;
        for leg in 0..NUM_LEGS {
            let q = io.joint_positions(leg);
            for j in 0..JOINTS_PER_LEG {
                io.main_visualization.q[leg * JOINTS_PER_LEG + j] = f64::from(q[j]);
            }
        }

        io.visualization.clear();
        io.visualization.push_sphere(SphereVisualization {
            position: body.position.map(|v| v as f32),
            radius: BODY_MARKER_RADIUS,
            color: BODY_MARKER_COLOR,
        });

        self.iteration += 1;
        Ok(())
    }

    fn user_parameters(&self) -> Option<&ControlParameters> {
        Some(&self.user)
    }

    fn user_parameters_mut(&mut self) -> Option<&mut ControlParameters> {
        Some(&mut self.user)
    }
}
