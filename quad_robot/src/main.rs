//! # Quadruped Robot Program
//!
//! ```text
//! quad_robot <robot-id> <sim-or-robot> [--params FILE] [--user-params FILE]
//!   robot-id:      3 (Cheetah 3), m (Mini Cheetah), c (Cyberdog)
//!   sim-or-robot:  s (development simulator), r (hardware)
//! ```
//!
//! Attaches to a running simulator and serves turns until the simulator
//! sends `Exit`. Exits with status 1 on any fatal error.

use clap::{Parser, ValueEnum};
use quad::config::LogLevel;
use quad::robot::RobotType;
use quad_robot::config::RobotProgramConfig;
use quad_robot::controller::{JointPdController, RobotController};
use quad_robot::params::robot_parameters;
use quad_robot::bridge::SimulationBridge;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Which bridge to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Target {
    /// Development simulator over shared memory.
    #[value(name = "s")]
    Simulator,
    /// Robot hardware.
    #[value(name = "r")]
    Hardware,
}

/// Quadruped robot program
#[derive(Parser, Debug)]
#[command(name = "quad_robot")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Robot program for the quadruped development simulator")]
struct Args {
    /// Robot variant: 3 (Cheetah 3), m (Mini Cheetah) or c (Cyberdog).
    robot: RobotType,

    /// s for the development simulator, r for hardware.
    target: Target,

    /// Load robot parameters from this file instead of waiting for the simulator.
    #[arg(long, value_name = "FILE")]
    params: Option<PathBuf>,

    /// Load controller (user) parameters from this file.
    #[arg(long, value_name = "FILE")]
    user_params: Option<PathBuf>,

    /// Robot program configuration TOML.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => RobotProgramConfig::load_validated(path),
        None => Ok(RobotProgramConfig::default()),
    };
    let level = match &config {
        _ if args.verbose => LogLevel::Debug,
        Ok(config) => config.shared.log_level,
        Err(_) => LogLevel::Info,
    };
    setup_tracing(level, args.json);

    info!("Quadruped robot program v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = config
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
        .and_then(|config| run(&args, config));
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Quadruped robot program shutdown complete");
}

fn run(args: &Args, config: RobotProgramConfig) -> Result<(), Box<dyn std::error::Error>> {
    let driver = match args.target {
        Target::Simulator => "development simulation",
        Target::Hardware => "hardware",
    };
    info!(
        robot = %args.robot,
        driver,
        service = %config.shared.service_name,
        "Robot program configured"
    );
    if args.target == Target::Hardware {
        return Err("the hardware bridge is not available in this build; use 's'".into());
    }

    let mut parameters = robot_parameters()?;
    if let Some(path) = args.params.as_ref().or(config.robot_parameters_file.as_ref()) {
        parameters.load_file(path)?;
    } else {
        info!("Robot parameters will be sent by the simulator");
    }

    let mut controller = JointPdController::new()?;
    if let Some(path) = args.user_params.as_ref().or(config.user_parameters_file.as_ref()) {
        if let Some(user) = controller.user_parameters_mut() {
            user.load_file(path)?;
        }
    }

    let bridge = SimulationBridge::connect(&config.channel, args.robot, controller, parameters)?;
    let stats = bridge.run()?;
    info!(turns = stats.turns, "Simulator requested exit");
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(level: LogLevel, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
