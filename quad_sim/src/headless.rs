//! Headless simulator loop.
//!
//! Creates the channel, waits for the robot, streams the parameter files,
//! then alternates plant steps and controller turns at the configured
//! period until the iteration budget runs out or shutdown is requested.

use crate::config::SimulatorConfig;
use crate::connection::{ConnectionOptions, SimulatorConnection};
use crate::error::SimError;
use crate::plant::JointPlant;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Timing statistics of the controller loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingStats {
    /// Controller turns completed.
    pub cycle_count: u64,
    /// Cycles that took longer than the period.
    pub timing_violations: u64,
    /// Longest cycle [µs].
    pub max_cycle_time_us: u64,
    total_cycle_time_us: u64,
}

impl TimingStats {
    fn record(&mut self, cycle_time_us: u64, period_us: u64) -> bool {
        self.cycle_count += 1;
        self.total_cycle_time_us += cycle_time_us;
        self.max_cycle_time_us = self.max_cycle_time_us.max(cycle_time_us);
        let violated = cycle_time_us > period_us;
        if violated {
            self.timing_violations += 1;
        }
        violated
    }

    /// Mean cycle time [µs].
    pub fn avg_cycle_time_us(&self) -> u64 {
        self.total_cycle_time_us
            .checked_div(self.cycle_count)
            .unwrap_or(0)
    }
}

/// Outcome of one headless run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Whether the robot ever answered.
    pub robot_attached: bool,
    /// Parameters streamed from the robot and user files.
    pub parameters_sent: usize,
    /// Controller loop timing.
    pub stats: TimingStats,
}

/// Drives one robot program from creation of the channel to `Exit`.
pub struct HeadlessSimulator {
    config: SimulatorConfig,
    running: Arc<AtomicBool>,
    plant: JointPlant,
    stats: TimingStats,
}

impl HeadlessSimulator {
    /// Validate `config` and prepare a plant for its robot.
    pub fn new(config: SimulatorConfig) -> Result<Self, SimError> {
        config.validate()?;
        info!(
            robot = %config.robot_type,
            period_us = config.controller_period_us,
            iterations = ?config.iterations,
            "Headless simulator created"
        );
        Ok(Self {
            plant: JointPlant::new(config.robot_type),
            config,
            running: Arc::new(AtomicBool::new(true)),
            stats: TimingStats::default(),
        })
    }

    /// Flag that stops the loop when cleared, for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Joint plant state.
    pub fn plant(&self) -> &JointPlant {
        &self.plant
    }

    /// Run until the iteration budget is spent or the running flag clears,
    /// then send `Exit` and destroy the channel.
    pub fn run(&mut self) -> Result<RunSummary, SimError> {
        let options = ConnectionOptions {
            turn_timeout: self.config.turn_timeout(),
            parameter_retries: self.config.parameter_retries,
        };
        let mut conn =
            SimulatorConnection::create(&self.config.channel, self.config.robot_type, options)?;
        self.plant.write_feedback(&mut conn.message_mut()?.sim_to_robot);

        let running = Arc::clone(&self.running);
        if !conn.handshake(|| running.load(Ordering::SeqCst))? {
            info!("Shutdown requested before the robot attached");
            conn.destroy()?;
            return Ok(RunSummary::default());
        }

        let mut summary = RunSummary {
            robot_attached: true,
            ..RunSummary::default()
        };
        if let Some(path) = self.config.robot_parameters_file.clone() {
            summary.parameters_sent += conn.load_parameter_file(&path, false)?;
        }
        if let Some(path) = self.config.user_parameters_file.clone() {
            summary.parameters_sent += conn.load_parameter_file(&path, true)?;
        }

        self.control_loop(&mut conn)?;
        summary.stats = self.stats;

        info!(
            cycles = self.stats.cycle_count,
            avg_us = self.stats.avg_cycle_time_us(),
            max_us = self.stats.max_cycle_time_us,
            violations = self.stats.timing_violations,
            "Controller loop stopped"
        );
        conn.exit()?;
        Ok(summary)
    }

    fn control_loop(&mut self, conn: &mut SimulatorConnection) -> Result<(), SimError> {
        let period = self.config.controller_period();
        let period_us = self.config.controller_period_us;
        let budget = self.config.iterations.unwrap_or(u64::MAX);

        while self.running.load(Ordering::SeqCst) && self.stats.cycle_count < budget {
            let cycle_start = Instant::now();

            self.plant.write_feedback(&mut conn.message_mut()?.sim_to_robot);
            conn.run_controller()?;
            self.plant.step(&conn.message()?.robot_to_sim, period);

            let cycle_time_us = cycle_start.elapsed().as_micros() as u64;
            if self.stats.record(cycle_time_us, period_us)
                && (self.stats.timing_violations <= 10 || self.stats.timing_violations % 1000 == 0)
            {
                warn!(
                    "Timing violation #{}: cycle took {}us (target {}us)",
                    self.stats.timing_violations, cycle_time_us, period_us
                );
            }

            if self.stats.cycle_count % 1000 == 0 {
                debug!(
                    "Controller loop: {} cycles, avg={}us, max={}us, violations={}",
                    self.stats.cycle_count,
                    self.stats.avg_cycle_time_us(),
                    self.stats.max_cycle_time_us,
                    self.stats.timing_violations
                );
            }

            let elapsed = cycle_start.elapsed();
            if elapsed < period {
                std::thread::sleep(period - elapsed);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quad::robot::RobotType;

    #[test]
    fn stats_track_violations_and_average() {
        let mut stats = TimingStats::default();
        assert_eq!(stats.avg_cycle_time_us(), 0);
        assert!(!stats.record(100, 2000));
        assert!(stats.record(3000, 2000));
        assert_eq!(stats.cycle_count, 2);
        assert_eq!(stats.timing_violations, 1);
        assert_eq!(stats.max_cycle_time_us, 3000);
        assert_eq!(stats.avg_cycle_time_us(), 1550);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = SimulatorConfig::new(RobotType::MiniCheetah);
        config.controller_period_us = 0;
        assert!(matches!(
            HeadlessSimulator::new(config),
            Err(SimError::Config(_))
        ));
    }

    #[test]
    fn cleared_flag_stops_before_robot_attaches() -> Result<(), SimError> {
        let mut config = SimulatorConfig::new(RobotType::MiniCheetah);
        config.channel =
            quad::config::ChannelNames::with_suffix(&format!("headless-{}", std::process::id()));
        config.turn_timeout_ms = 10;
        let mut sim = HeadlessSimulator::new(config)?;
        sim.running_flag().store(false, Ordering::SeqCst);

        let summary = sim.run()?;
        assert!(!summary.robot_attached);
        assert_eq!(summary.stats.cycle_count, 0);
        Ok(())
    }
}
