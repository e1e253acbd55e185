//! Robot side of the simulation channel.
//!
//! One loop iteration is one robot turn: wait for the simulator, act on the
//! mode it selected, hand the turn back. A failed turn is published into
//! the error buffer and ends the loop without handing the turn back, so the
//! simulator sees a stalled robot and reads the reason from the region.

use crate::controller::{ControllerIo, RobotController};
use crate::error::BridgeError;
use crate::fault::{CrashReporter, publish_error};
use crate::params::ControlParameters;
use crate::rpc::{self, RpcOutcome};
use quad::config::ChannelNames;
use quad::robot::RobotType;
use quad::shm::message::{Mode, SimulatorMessage};
use quad_shared_memory::RobotEndpoint;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

// ─── Bridge Statistics ──────────────────────────────────────────────

/// Per-turn counters and timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeStats {
    /// Turns handed back to the simulator.
    pub turns: u64,
    pub parameter_turns: u64,
    /// Parameter turns that carried no new request.
    pub redundant_parameter_turns: u64,
    pub controller_turns: u64,
    pub idle_turns: u64,
    /// Shortest turn [ns], from wake-up to hand-back.
    pub min_turn_ns: u64,
    /// Longest turn [ns].
    pub max_turn_ns: u64,
    sum_turn_ns: u64,
}

impl BridgeStats {
    pub const fn new() -> Self {
        Self {
            turns: 0,
            parameter_turns: 0,
            redundant_parameter_turns: 0,
            controller_turns: 0,
            idle_turns: 0,
            min_turn_ns: u64::MAX,
            max_turn_ns: 0,
            sum_turn_ns: 0,
        }
    }

    /// Record one completed turn.
    pub fn record(&mut self, mode: Mode, duration: Duration) {
        let ns = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.turns += 1;
        self.min_turn_ns = self.min_turn_ns.min(ns);
        self.max_turn_ns = self.max_turn_ns.max(ns);
        self.sum_turn_ns = self.sum_turn_ns.saturating_add(ns);
        match mode {
            Mode::ApplyControlParameters => self.parameter_turns += 1,
            Mode::RunController => self.controller_turns += 1,
            Mode::Idle => self.idle_turns += 1,
            Mode::Exit => {}
        }
    }

    /// Average turn duration [ns].
    pub fn avg_turn_ns(&self) -> u64 {
        if self.turns == 0 {
            0
        } else {
            self.sum_turn_ns / self.turns
        }
    }
}

impl Default for BridgeStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Bridge ─────────────────────────────────────────────────────────

/// Connects a controller and its parameter tables to a running simulator.
pub struct SimulationBridge<C: RobotController> {
    // Declared before `endpoint`: disarmed before the mapping goes away.
    crash_reporter: CrashReporter,
    endpoint: RobotEndpoint<SimulatorMessage>,
    robot_type: RobotType,
    controller: C,
    parameters: ControlParameters,
    robot_type_checked: bool,
    controller_initialized: bool,
    stats: BridgeStats,
}

impl<C: RobotController> SimulationBridge<C> {
    /// Attach to the simulator's channel and arm crash reporting into it.
    pub fn connect(
        names: &ChannelNames,
        robot_type: RobotType,
        controller: C,
        parameters: ControlParameters,
    ) -> Result<Self, BridgeError> {
        let endpoint = RobotEndpoint::<SimulatorMessage>::attach(names)?;
        let message = endpoint.as_ptr();
        // SAFETY: the buffer lives in the mapping owned by `endpoint`, and
        // the reporter field is dropped before the endpoint field.
        let crash_reporter =
            unsafe { CrashReporter::arm(&raw mut (*message).robot_to_sim.error_message) }
                .map_err(BridgeError::CrashHandler)?;

        info!(
            robot = %robot_type,
            region = %names.region,
            robot_parameters = parameters.len(),
            "Simulation bridge connected"
        );
        Ok(Self {
            crash_reporter,
            endpoint,
            robot_type,
            controller,
            parameters,
            robot_type_checked: false,
            controller_initialized: false,
            stats: BridgeStats::new(),
        })
    }

    pub fn robot_type(&self) -> RobotType {
        self.robot_type
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    pub fn parameters(&self) -> &ControlParameters {
        &self.parameters
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Serve turns until the simulator sends `Exit`, then detach.
    pub fn run(mut self) -> Result<BridgeStats, BridgeError> {
        info!("Waiting for the simulator's first turn");
        while self.step()? != Mode::Exit {}

        let stats = self.stats.clone();
        info!(
            turns = stats.turns,
            controller_turns = stats.controller_turns,
            parameter_turns = stats.parameter_turns,
            avg_turn_us = stats.avg_turn_ns() / 1000,
            max_turn_us = stats.max_turn_ns / 1000,
            "Simulation bridge finished"
        );
        self.shutdown();
        Ok(stats)
    }

    /// Serve exactly one turn and return the mode it carried.
    ///
    /// On error the description is published into the region and the turn
    /// is kept.
    pub fn step(&mut self) -> Result<Mode, BridgeError> {
        self.endpoint.wait_for_simulator()?;
        let started = Instant::now();
        match self.dispatch() {
            Ok(mode) => {
                self.endpoint.signal_robot_done()?;
                self.stats.record(mode, started.elapsed());
                Ok(mode)
            }
            Err(e) => {
                self.publish(&e);
                Err(e)
            }
        }
    }

    /// Disarm crash reporting and detach from the channel.
    pub fn shutdown(self) {
        let Self {
            crash_reporter,
            endpoint,
            ..
        } = self;
        drop(crash_reporter);
        endpoint.detach();
    }

    fn publish(&mut self, e: &BridgeError) {
        let text = e.to_string();
        error!(error = %text, "Robot turn failed");
        // Only possible while holding the turn.
        if let Ok(message) = self.endpoint.message_mut() {
            publish_error(&mut message.robot_to_sim, &text);
        }
    }

    fn dispatch(&mut self) -> Result<Mode, BridgeError> {
        let Self {
            endpoint,
            robot_type,
            controller,
            parameters,
            robot_type_checked,
            controller_initialized,
            stats,
            ..
        } = self;
        let robot_type = *robot_type;
        let message = endpoint.message_mut()?;

        if !*robot_type_checked {
            let declared = message.sim_to_robot.robot_type;
            if RobotType::from_raw(declared) != Some(robot_type) {
                return Err(BridgeError::RobotMismatch {
                    expected: robot_type,
                    found: RobotType::from_raw(declared)
                        .map_or_else(|| format!("unknown robot {declared}"), |r| r.to_string()),
                });
            }
            *robot_type_checked = true;
            info!(robot = %robot_type, "Simulator robot type confirmed");
        }
        message.robot_to_sim.robot_type = robot_type.as_raw();

        let raw_mode = message.sim_to_robot.mode;
        let mode = Mode::from_raw(raw_mode).ok_or(BridgeError::UnknownMode(raw_mode))?;
        match mode {
            Mode::ApplyControlParameters => {
                let SimulatorMessage {
                    robot_to_sim,
                    sim_to_robot,
                } = message;
                let outcome = rpc::respond(
                    &sim_to_robot.control_parameter_request,
                    &mut robot_to_sim.control_parameter_response,
                    parameters,
                    controller.user_parameters_mut(),
                )?;
                if matches!(outcome, RpcOutcome::Redundant { .. }) {
                    stats.redundant_parameter_turns += 1;
                }
            }
            Mode::RunController => {
                if !*controller_initialized {
                    parameters.ensure_initialized()?;
                    let user_count = match controller.user_parameters() {
                        Some(user) => {
                            user.ensure_initialized()?;
                            user.len()
                        }
                        None => 0,
                    };
                    info!(
                        robot_parameters = parameters.len(),
                        user_parameters = user_count,
                        "All {} control parameters are initialized",
                        parameters.len() + user_count
                    );
                    let mut io = ControllerIo::bind(robot_type, &mut *message, parameters);
                    controller.initialize(&mut io)?;
                    *controller_initialized = true;
                }
                let mut io = ControllerIo::bind(robot_type, message, parameters);
                controller.run(&mut io)?;
            }
            Mode::Idle => debug!("Idle turn"),
            Mode::Exit => info!("Exit requested by the simulator"),
        }
        Ok(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_record_by_mode() {
        let mut stats = BridgeStats::new();
        assert_eq!(stats.avg_turn_ns(), 0);

        stats.record(Mode::ApplyControlParameters, Duration::from_micros(10));
        stats.record(Mode::RunController, Duration::from_micros(30));
        stats.record(Mode::Idle, Duration::from_micros(20));
        stats.record(Mode::Exit, Duration::from_micros(20));

        assert_eq!(stats.turns, 4);
        assert_eq!(stats.parameter_turns, 1);
        assert_eq!(stats.controller_turns, 1);
        assert_eq!(stats.idle_turns, 1);
        assert_eq!(stats.min_turn_ns, 10_000);
        assert_eq!(stats.max_turn_ns, 30_000);
        assert_eq!(stats.avg_turn_ns(), 20_000);
    }
}
