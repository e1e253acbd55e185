//! Joint-level plant model.
//!
//! Each of the twelve joints is a damped rotational inertia driven by the
//! PD law the robot commands. There is no body dynamics and no contact: the
//! trunk is pinned at a fixed stance height. This is enough to close the
//! loop around a joint controller without a physics engine.

use quad::consts::{JOINTS_PER_LEG, NUM_LEGS};
use quad::robot::RobotType;
use quad::shm::message::{RobotToSimulatorMessage, SimulatorToRobotMessage};
use std::time::Duration;
use tracing::trace;

/// Rotor-reflected inertia of one joint [kg·m²].
pub const JOINT_INERTIA: f64 = 0.02;

/// Viscous friction of one joint [N·m·s/rad].
pub const JOINT_DAMPING: f64 = 0.1;

/// Torque limit applied when the command carries none [N·m].
pub const DEFAULT_TORQUE_LIMIT: f64 = 18.0;

/// Trunk height while standing [m].
pub const STANCE_HEIGHT: f64 = 0.3;

const GRAVITY: f32 = 9.81;

/// Folded pose the legs start in (abad, hip, knee) [rad].
pub const FOLDED_POSE: [f64; JOINTS_PER_LEG] = [0.0, -1.2, 2.6];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct JointDrive {
    q_des: f64,
    qd_des: f64,
    kp: f64,
    kd: f64,
    tau_ff: f64,
    limit: f64,
    enabled: bool,
}

impl JointDrive {
    fn torque(&self, q: f64, qd: f64) -> f64 {
        if !self.enabled {
            return 0.0;
        }
        let tau = self.kp * (self.q_des - q) + self.kd * (self.qd_des - qd) + self.tau_ff;
        tau.clamp(-self.limit, self.limit)
    }
}

/// Joint state of all four legs.
#[derive(Debug, Clone)]
pub struct JointPlant {
    robot_type: RobotType,
    q: [[f64; JOINTS_PER_LEG]; NUM_LEGS],
    qd: [[f64; JOINTS_PER_LEG]; NUM_LEGS],
    tau: [[f64; JOINTS_PER_LEG]; NUM_LEGS],
    steps: u32,
}

impl JointPlant {
    /// Plant with every leg in [`FOLDED_POSE`] and at rest.
    pub fn new(robot_type: RobotType) -> Self {
        Self {
            robot_type,
            q: [FOLDED_POSE; NUM_LEGS],
            qd: [[0.0; JOINTS_PER_LEG]; NUM_LEGS],
            tau: [[0.0; JOINTS_PER_LEG]; NUM_LEGS],
            steps: 0,
        }
    }

    /// Joint angles of one leg.
    pub fn leg_q(&self, leg: usize) -> [f64; JOINTS_PER_LEG] {
        self.q[leg]
    }

    /// Joint velocities of one leg.
    pub fn leg_qd(&self, leg: usize) -> [f64; JOINTS_PER_LEG] {
        self.qd[leg]
    }

    /// Integration steps taken.
    pub fn steps(&self) -> u32 {
        self.steps
    }

    fn drives(&self, command: &RobotToSimulatorMessage, leg: usize) -> [JointDrive; JOINTS_PER_LEG] {
        if self.robot_type.uses_spi() {
            let c = &command.spi_command;
            let enabled = c.flags[leg] != 0;
            let drive = |q_des: f32, qd_des: f32, kp: f32, kd: f32, tau_ff: f32| JointDrive {
                q_des: q_des.into(),
                qd_des: qd_des.into(),
                kp: kp.into(),
                kd: kd.into(),
                tau_ff: tau_ff.into(),
                limit: DEFAULT_TORQUE_LIMIT,
                enabled,
            };
            [
                drive(c.q_des_abad[leg], c.qd_des_abad[leg], c.kp_abad[leg], c.kd_abad[leg], c.tau_abad_ff[leg]),
                drive(c.q_des_hip[leg], c.qd_des_hip[leg], c.kp_hip[leg], c.kd_hip[leg], c.tau_hip_ff[leg]),
                drive(c.q_des_knee[leg], c.qd_des_knee[leg], c.kp_knee[leg], c.kd_knee[leg], c.tau_knee_ff[leg]),
            ]
        } else {
            let c = &command.ti_board_command[leg];
            let limit = if c.max_torque > 0.0 {
                f64::from(c.max_torque)
            } else {
                DEFAULT_TORQUE_LIMIT
            };
            std::array::from_fn(|j| JointDrive {
                q_des: c.q_des[j].into(),
                qd_des: c.qd_des[j].into(),
                kp: c.kp_joint[j].into(),
                kd: c.kd_joint[j].into(),
                tau_ff: c.tau_ff[j].into(),
                limit,
                enabled: c.enable != 0,
            })
        }
    }

    /// Advance every joint by `dt` under the robot's last command.
    pub fn step(&mut self, command: &RobotToSimulatorMessage, dt: Duration) {
        let dt = dt.as_secs_f64();
        for leg in 0..NUM_LEGS {
            let drives = self.drives(command, leg);
            for (j, drive) in drives.iter().enumerate() {
                let (q, qd) = (self.q[leg][j], self.qd[leg][j]);
                let tau = drive.torque(q, qd);
                // Semi-implicit Euler
                let qdd = (tau - JOINT_DAMPING * qd) / JOINT_INERTIA;
                self.qd[leg][j] = qd + qdd * dt;
                self.q[leg][j] = q + self.qd[leg][j] * dt;
                self.tau[leg][j] = tau;
            }
        }
        self.steps = self.steps.wrapping_add(1);
        trace!(steps = self.steps, q_fr = ?self.q[0], "Plant step");
    }

    /// Write joint feedback, IMU and ground-truth state for the next turn.
    pub fn write_feedback(&self, out: &mut SimulatorToRobotMessage) {
        if self.robot_type.uses_spi() {
            let spi = &mut out.spi_data;
            for leg in 0..NUM_LEGS {
                let [q_abad, q_hip, q_knee] = self.q[leg];
                let [qd_abad, qd_hip, qd_knee] = self.qd[leg];
                spi.q_abad[leg] = q_abad as f32;
                spi.q_hip[leg] = q_hip as f32;
                spi.q_knee[leg] = q_knee as f32;
                spi.qd_abad[leg] = qd_abad as f32;
                spi.qd_hip[leg] = qd_hip as f32;
                spi.qd_knee[leg] = qd_knee as f32;
                spi.flags[leg] = 1;
            }
            spi.spi_driver_status = 0;
        } else {
            for (leg, board) in out.ti_board_data.iter_mut().enumerate() {
                for j in 0..JOINTS_PER_LEG {
                    board.q[j] = self.q[leg][j] as f32;
                    board.dq[j] = self.qd[leg][j] as f32;
                    board.tau[j] = self.tau[leg][j] as f32;
                }
                board.loop_count_ti = self.steps;
            }
        }

        out.vector_nav.accelerometer = [0.0, 0.0, GRAVITY];
        out.vector_nav.gyro = [0.0; 3];
        out.vector_nav.quat = [1.0, 0.0, 0.0, 0.0];

        let cheater = &mut out.cheater_state;
        cheater.orientation = [1.0, 0.0, 0.0, 0.0];
        cheater.position = [0.0, 0.0, STANCE_HEIGHT];
        cheater.omega_body = [0.0; 3];
        cheater.v_body = [0.0; 3];
        cheater.acceleration = [0.0, 0.0, f64::from(GRAVITY)];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quad::shm::message::JointTarget;

    const DT: Duration = Duration::from_micros(2000);

    fn hold(target: [f32; JOINTS_PER_LEG]) -> [JointTarget; JOINTS_PER_LEG] {
        target.map(|q_des| JointTarget {
            q_des,
            kp: 40.0,
            kd: 1.0,
            ..JointTarget::default()
        })
    }

    #[test]
    fn pd_command_pulls_joints_to_target() {
        let mut plant = JointPlant::new(RobotType::MiniCheetah);
        let mut command = RobotToSimulatorMessage::default();
        for leg in 0..NUM_LEGS {
            command.spi_command.set_leg(leg, hold([0.0, -0.8, 1.6]));
        }

        for _ in 0..2000 {
            plant.step(&command, DT);
        }

        for leg in 0..NUM_LEGS {
            let q = plant.leg_q(leg);
            assert!((q[1] + 0.8).abs() < 1e-2, "hip {q:?}");
            assert!((q[2] - 1.6).abs() < 1e-2, "knee {q:?}");
            assert!(plant.leg_qd(leg).iter().all(|v| v.abs() < 1e-2));
        }

        let mut feedback = SimulatorToRobotMessage::default();
        plant.write_feedback(&mut feedback);
        assert!((feedback.spi_data.q_knee[3] - 1.6).abs() < 1e-2);
        assert_eq!(feedback.cheater_state.position[2], STANCE_HEIGHT);
    }

    #[test]
    fn disabled_joints_stay_put() {
        let mut plant = JointPlant::new(RobotType::Cyberdog);
        let idle = RobotToSimulatorMessage::default();
        for _ in 0..100 {
            plant.step(&idle, DT);
        }
        assert_eq!(plant.leg_q(2), FOLDED_POSE);
        assert_eq!(plant.steps(), 100);
    }

    #[test]
    fn ti_boards_respect_max_torque() {
        let mut plant = JointPlant::new(RobotType::Cheetah3);
        let mut command = RobotToSimulatorMessage::default();
        let board = &mut command.ti_board_command[0];
        board.enable = 1;
        board.max_torque = 0.5;
        board.kp_joint = [1000.0; JOINTS_PER_LEG];
        board.q_des = [1.0, 1.0, 1.0];

        plant.step(&command, DT);

        let mut feedback = SimulatorToRobotMessage::default();
        plant.write_feedback(&mut feedback);
        assert!(feedback.ti_board_data[0].tau.iter().all(|&t| t <= 0.5));
        assert_eq!(feedback.ti_board_data[1].tau, [0.0; JOINTS_PER_LEG]);
        assert_eq!(feedback.ti_board_data[0].loop_count_ti, 1);
    }
}
