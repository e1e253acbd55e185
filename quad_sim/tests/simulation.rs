//! Simulator connection against a real robot bridge.
//!
//! The robot runs on its own thread (or, for exit-status checks, in a
//! forked child) and attaches to the channel the simulator created.

use quad::config::ChannelNames;
use quad::params::{ParameterKind, ParameterValue};
use quad::robot::RobotType;
use quad::shm::message::{Mode, SimulatorMessage};
use quad_robot::params::{CONTROLLER_DT, STAND_KP_JOINT};
use quad_robot::{BridgeError, BridgeStats, JointPdController, SimulationBridge, robot_parameters};
use quad_shared_memory::{RobotEndpoint, ShmError};
use quad_sim::{
    ConnectionOptions, HeadlessSimulator, SimError, SimulatorConfig, SimulatorConnection,
};
use std::io::Write;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::NamedTempFile;

type Robot = JoinHandle<Result<BridgeStats, BridgeError>>;

fn names(tag: &str) -> ChannelNames {
    ChannelNames::with_suffix(&format!("sim-{tag}-{}", std::process::id()))
}

fn options() -> ConnectionOptions {
    ConnectionOptions {
        turn_timeout: Duration::from_millis(300),
        parameter_retries: 2,
    }
}

fn spawn_robot(names: &ChannelNames, robot_type: RobotType) -> Robot {
    let names = names.clone();
    thread::spawn(move || {
        SimulationBridge::connect(
            &names,
            robot_type,
            JointPdController::new()?,
            robot_parameters()?,
        )?
        .run()
    })
}

fn connect(names: &ChannelNames, robot_type: RobotType) -> Result<(SimulatorConnection, Robot), SimError> {
    let mut conn = SimulatorConnection::create(names, robot_type, options())?;
    let robot = spawn_robot(names, robot_type);
    assert!(conn.handshake(|| true)?);
    Ok((conn, robot))
}

fn parameter_file(body: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file
}

const ROBOT_PARAMETERS: &str = r#"
[parameters.controller_dt]
kind = "double"
value = 0.002

[parameters.control_mode]
kind = "s64"
value = 1

[parameters.cheater_mode]
kind = "s64"
value = 1

[parameters.stand_kp_joint]
kind = "vec3_double"
value = [40.0, 40.0, 40.0]

[parameters.stand_kd_joint]
kind = "vec3_double"
value = [1.0, 1.0, 1.0]

[parameters.imu_process_noise_position]
kind = "double"
value = 0.02

[parameters.foot_sensor_noise_position]
kind = "double"
value = 0.001

[parameters.use_rc]
kind = "s64"
value = 0
"#;

const USER_PARAMETERS: &str = r#"
[parameters.home_pose]
kind = "vec3_double"
value = [0.0, -0.8, 1.6]

[parameters.max_torque]
kind = "float"
value = 18.0

[parameters.blend_iterations]
kind = "s64"
value = 0
"#;

#[test]
fn set_then_get_returns_value() -> Result<(), SimError> {
    let (mut conn, robot) = connect(&names("setget"), RobotType::MiniCheetah)?;

    let five = ParameterValue::Double(5.0);
    assert_eq!(conn.send_control_parameter(CONTROLLER_DT, five, false)?, five);
    assert_eq!(conn.request_number(), 1);
    assert_eq!(
        conn.get_control_parameter(CONTROLLER_DT, ParameterKind::Double, false)?,
        five
    );
    assert_eq!(conn.request_number(), 2);

    conn.exit()?;
    let stats = robot.join().unwrap().unwrap();
    assert_eq!(stats.parameter_turns, 2);
    Ok(())
}

#[test]
fn parameter_turn_without_new_request_changes_nothing() -> Result<(), SimError> {
    let (mut conn, robot) = connect(&names("replay"), RobotType::Cyberdog)?;

    let gains = ParameterValue::Vec3Double([30.0, 30.0, 30.0]);
    conn.send_control_parameter(STAND_KP_JOINT, gains, false)?;
    let before = conn.message()?.robot_to_sim.control_parameter_response;

    conn.exchange(Mode::ApplyControlParameters)?;
    assert_eq!(conn.message()?.robot_to_sim.control_parameter_response, before);
    assert_eq!(
        conn.get_control_parameter(STAND_KP_JOINT, ParameterKind::Vec3Double, false)?,
        gains
    );

    conn.exit()?;
    let stats = robot.join().unwrap().unwrap();
    assert_eq!(stats.redundant_parameter_turns, 1);
    Ok(())
}

#[test]
fn controller_before_parameters_surfaces_robot_error() -> Result<(), SimError> {
    let (mut conn, robot) = connect(&names("uninit"), RobotType::MiniCheetah)?;

    let err = conn.run_controller().unwrap_err();
    let text = err.published_error().unwrap_or_default().to_string();
    assert!(matches!(err, SimError::RobotStalled { .. }));
    assert!(text.contains("not all parameters initialized"), "{text}");
    assert!(err.to_string().contains("not all parameters initialized"));

    assert!(matches!(
        robot.join().unwrap(),
        Err(BridgeError::ParametersNotInitialized { .. })
    ));
    conn.destroy()
}

#[test]
fn kind_mismatch_is_reported_through_rpc() -> Result<(), SimError> {
    let (mut conn, robot) = connect(&names("mismatch"), RobotType::MiniCheetah)?;

    let err = conn
        .send_control_parameter(CONTROLLER_DT, ParameterValue::Float(0.5), false)
        .unwrap_err();
    assert!(matches!(err, SimError::ParameterNotAcknowledged { request_number: 1, .. }));
    assert!(err.published_error().unwrap_or_default().contains(CONTROLLER_DT));

    assert!(matches!(robot.join().unwrap(), Err(BridgeError::TypeMismatch { .. })));
    conn.destroy()
}

#[test]
fn exit_tears_down_channel() -> Result<(), SimError> {
    let names = names("exit");
    let (mut conn, robot) = connect(&names, RobotType::Cheetah3)?;
    conn.probe()?;
    assert_eq!(conn.exchanges(), 2);

    conn.exit()?;
    assert_eq!(robot.join().unwrap().unwrap().turns, 3);
    assert!(matches!(
        RobotEndpoint::<SimulatorMessage>::attach(&names),
        Err(ShmError::NotFound { .. })
    ));
    Ok(())
}

#[test]
fn headless_run_streams_files_and_drives_controller() -> Result<(), SimError> {
    let robot_file = parameter_file(ROBOT_PARAMETERS);
    let user_file = parameter_file(USER_PARAMETERS);
    let names = names("headless");

    let mut config = SimulatorConfig::new(RobotType::MiniCheetah);
    config.channel = names.clone();
    config.turn_timeout_ms = 2000;
    config.controller_period_us = 500;
    config.iterations = Some(1000);
    config.robot_parameters_file = Some(robot_file.path().to_path_buf());
    config.user_parameters_file = Some(user_file.path().to_path_buf());

    let mut simulator = HeadlessSimulator::new(config)?;
    // The robot keeps retrying until the simulator has created the channel.
    let robot_names = names.clone();
    let robot = thread::spawn(move || loop {
        match SimulationBridge::connect(
            &robot_names,
            RobotType::MiniCheetah,
            JointPdController::new()?,
            robot_parameters()?,
        ) {
            Ok(bridge) => return bridge.run(),
            Err(BridgeError::Shm(
                ShmError::NotFound { .. }
                | ShmError::SemaphoreNotFound { .. }
                | ShmError::SizeMismatch { .. },
            )) => {
                thread::sleep(Duration::from_millis(5));
            }
            Err(e) => return Err(e),
        }
    });

    let summary = simulator.run()?;
    assert!(summary.robot_attached);
    assert_eq!(summary.parameters_sent, 11);
    assert_eq!(summary.stats.cycle_count, 1000);

    let stats = robot.join().unwrap().unwrap();
    assert_eq!(stats.controller_turns, 1000);
    assert_eq!(stats.parameter_turns, 11);

    let knee = simulator.plant().leg_q(0)[2];
    assert!((knee - 1.6).abs() < 0.05, "knee at {knee}");
    Ok(())
}

#[test]
fn robot_process_exit_status() -> Result<(), SimError> {
    fn run_child(names: &ChannelNames, robot_type: RobotType) -> ! {
        let result = JointPdController::new()
            .map_err(BridgeError::from)
            .and_then(|controller| {
                SimulationBridge::connect(names, robot_type, controller, robot_parameters()?)
            })
            .and_then(SimulationBridge::run);
        std::process::exit(if result.is_ok() { 0 } else { 1 });
    }

    fn wait_status(pid: libc::pid_t) -> i32 {
        let mut status = 0;
        // Safety: pid is our own child.
        let waited = unsafe { libc::waitpid(pid, &mut status, 0) };
        assert_eq!(waited, pid);
        assert!(libc::WIFEXITED(status), "child did not exit normally");
        libc::WEXITSTATUS(status)
    }

    // Orderly exit: status 0.
    let names_ok = names("fork-ok");
    let mut conn = SimulatorConnection::create(&names_ok, RobotType::MiniCheetah, options())?;
    // Safety: the child only runs the bridge and exits.
    let pid = unsafe { libc::fork() };
    if pid == 0 {
        run_child(&names_ok, RobotType::MiniCheetah);
    }
    assert!(pid > 0, "fork failed");
    assert!(conn.handshake(|| true)?);
    conn.exit()?;
    assert_eq!(wait_status(pid), 0);

    // Robot launched as the wrong variant: error published, status 1.
    let names_bad = names("fork-bad");
    let mut conn = SimulatorConnection::create(&names_bad, RobotType::Cyberdog, options())?;
    let pid = unsafe { libc::fork() };
    if pid == 0 {
        run_child(&names_bad, RobotType::MiniCheetah);
    }
    assert!(pid > 0, "fork failed");
    let err = conn.handshake(|| true).unwrap_err();
    assert!(
        err.published_error().unwrap_or_default().starts_with("robot mismatch"),
        "{err}"
    );
    assert_eq!(wait_status(pid), 1);
    conn.destroy()
}
