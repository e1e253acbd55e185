//! # Quadruped Headless Simulator
//!
//! Owns the shared channel and drives a robot program without a viewer.
//!
//! # Usage
//!
//! ```bash
//! # Start the simulator, then the robot program in another shell
//! quad_sim --robot m --params config/mini-cheetah-defaults.toml
//! quad_robot m s
//!
//! # Everything from a configuration file, 5000 controller turns
//! quad_sim --config config/sim.toml --iterations 5000
//! ```
//!
//! Ctrl-C stops the controller loop; the robot is sent `Exit` before the
//! channel is destroyed.

use clap::Parser;
use quad::config::LogLevel;
use quad::robot::RobotType;
use quad_sim::config::SimulatorConfig;
use quad_sim::headless::HeadlessSimulator;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::Ordering;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Quadruped headless simulator
#[derive(Parser, Debug)]
#[command(name = "quad_sim")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Headless development simulator for the quadruped robot program")]
struct Args {
    /// Simulator configuration TOML.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Robot to simulate: 3 (Cheetah 3), m (Mini Cheetah) or c (Cyberdog).
    /// Overrides the configuration file.
    #[arg(short, long)]
    robot: Option<RobotType>,

    /// Robot parameter file streamed to the robot before the controller starts.
    #[arg(long, value_name = "FILE")]
    params: Option<PathBuf>,

    /// User parameter file streamed after the robot parameters.
    #[arg(long, value_name = "FILE")]
    user_params: Option<PathBuf>,

    /// Stop after this many controller turns.
    #[arg(short = 'n', long)]
    iterations: Option<u64>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let config = load_config(&args);
    let level = match &config {
        _ if args.verbose => LogLevel::Debug,
        Ok(config) => config.shared.log_level,
        Err(_) => LogLevel::Info,
    };
    setup_tracing(level, args.json);

    info!("Quadruped headless simulator v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.and_then(run) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Quadruped headless simulator shutdown complete");
}

/// Merge the configuration file with command-line overrides.
fn load_config(args: &Args) -> Result<SimulatorConfig, Box<dyn std::error::Error>> {
    let mut config = match (&args.config, args.robot) {
        (Some(path), _) => SimulatorConfig::load_validated(path)?,
        (None, Some(robot)) => SimulatorConfig::new(robot),
        (None, None) => SimulatorConfig::new(RobotType::MiniCheetah),
    };
    if let Some(robot) = args.robot {
        config.robot_type = robot;
    }
    if args.params.is_some() {
        config.robot_parameters_file = args.params.clone();
    }
    if args.user_params.is_some() {
        config.user_parameters_file = args.user_params.clone();
    }
    if args.iterations.is_some() {
        config.iterations = args.iterations;
    }
    Ok(config)
}

fn run(config: SimulatorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut simulator = HeadlessSimulator::new(config)?;

    let running = simulator.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    let summary = simulator.run()?;
    info!(
        attached = summary.robot_attached,
        parameters = summary.parameters_sent,
        cycles = summary.stats.cycle_count,
        "Simulation finished"
    );
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
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
