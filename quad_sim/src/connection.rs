//! Simulator side of the simulation channel.
//!
//! The simulator owns the channel. Every exchange follows the same pattern:
//! write the turn's inputs and mode, hand the turn to the robot, then wait a
//! bounded time for it to come back. A robot that never hands the turn back
//! has failed; whatever it published into the error buffer is reported.

use crate::error::SimError;
use quad::config::ChannelNames;
use quad::params::{ParameterFile, ParameterKind, ParameterValue, RequestKind, decode_name};
use quad::robot::RobotType;
use quad::shm::message::{Mode, SimulatorMessage};
use quad_shared_memory::{SimulatorEndpoint, TurnPhase};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timing bounds for talking to the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Bound on a single wait for the robot.
    pub turn_timeout: Duration,
    /// Extra waits granted to a parameter request after the first one
    /// times out.
    pub parameter_retries: u32,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            turn_timeout: quad::prelude::DEFAULT_TURN_TIMEOUT,
            parameter_retries: quad::consts::DEFAULT_PARAMETER_RETRIES,
        }
    }
}

/// Owner of the channel, driving the robot one turn at a time.
pub struct SimulatorConnection {
    endpoint: SimulatorEndpoint<SimulatorMessage>,
    robot_type: RobotType,
    options: ConnectionOptions,
    request_number: u64,
    exchanges: u64,
}

impl SimulatorConnection {
    /// Create the channel, reclaiming stale objects, and prepare the first
    /// turn: the robot type is declared and the mode set to `Idle`.
    pub fn create(
        names: &ChannelNames,
        robot_type: RobotType,
        options: ConnectionOptions,
    ) -> Result<Self, SimError> {
        Self::prepare(SimulatorEndpoint::create(names)?, robot_type, options)
    }

    /// Like [`SimulatorConnection::create`], but fail if the region name is
    /// already in use.
    pub fn create_exclusive(
        names: &ChannelNames,
        robot_type: RobotType,
        options: ConnectionOptions,
    ) -> Result<Self, SimError> {
        Self::prepare(SimulatorEndpoint::create_exclusive(names)?, robot_type, options)
    }

    fn prepare(
        mut endpoint: SimulatorEndpoint<SimulatorMessage>,
        robot_type: RobotType,
        options: ConnectionOptions,
    ) -> Result<Self, SimError> {
        let message = endpoint.message_mut()?;
        message.sim_to_robot.robot_type = robot_type.as_raw();
        message.sim_to_robot.set_mode(Mode::Idle);
        info!(
            robot = %robot_type,
            region = %endpoint.names().region,
            timeout_ms = options.turn_timeout.as_millis() as u64,
            "Simulator connection ready, waiting for the robot"
        );
        Ok(Self {
            endpoint,
            robot_type,
            options,
            request_number: 0,
            exchanges: 0,
        })
    }

    /// Robot type declared to the robot.
    pub fn robot_type(&self) -> RobotType {
        self.robot_type
    }

    /// Channel names in use.
    pub fn names(&self) -> &ChannelNames {
        self.endpoint.names()
    }

    /// Number of the last parameter request sent.
    pub fn request_number(&self) -> u64 {
        self.request_number
    }

    /// Completed exchanges (turns the robot handed back).
    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    /// Message view during the simulator's turn.
    pub fn message(&self) -> Result<&SimulatorMessage, SimError> {
        Ok(self.endpoint.message()?)
    }

    /// Writable message during the simulator's turn, for sensor inputs.
    pub fn message_mut(&mut self) -> Result<&mut SimulatorMessage, SimError> {
        Ok(self.endpoint.message_mut()?)
    }

    /// Hand the robot one turn in `mode` and wait for it to return.
    pub fn exchange(&mut self, mode: Mode) -> Result<(), SimError> {
        self.endpoint.message_mut()?.sim_to_robot.set_mode(mode);
        self.endpoint.signal_simulator_done()?;
        if !self.endpoint.wait_for_robot_timeout(self.options.turn_timeout)? {
            return Err(SimError::RobotStalled {
                published_error: self.read_error(),
            });
        }
        self.exchanges += 1;
        Ok(())
    }

    /// First exchange: hand over an `Idle` turn and keep waiting, one turn
    /// timeout at a time, until the robot attaches and answers or
    /// `keep_waiting` says to give up. Returns whether the robot answered.
    ///
    /// The posted turn stays in the semaphore, so a robot that attaches late
    /// still picks it up.
    pub fn handshake(&mut self, keep_waiting: impl Fn() -> bool) -> Result<bool, SimError> {
        self.endpoint.message_mut()?.sim_to_robot.set_mode(Mode::Idle);
        self.endpoint.signal_simulator_done()?;
        let mut waited = 0u32;
        loop {
            if self.endpoint.wait_for_robot_timeout(self.options.turn_timeout)? {
                self.exchanges += 1;
                info!(waited_turns = waited, "Robot attached and answered");
                return Ok(true);
            }
            if let Some(text) = self.read_error() {
                return Err(SimError::RobotStalled {
                    published_error: Some(text),
                });
            }
            if !keep_waiting() {
                return Ok(false);
            }
            waited += 1;
            if waited == 1 || waited % 10 == 0 {
                info!(region = %self.endpoint.names().region, "Still waiting for the robot to attach");
            }
        }
    }

    /// Liveness probe: one `Idle` turn.
    pub fn probe(&mut self) -> Result<(), SimError> {
        self.exchange(Mode::Idle)
    }

    /// One controller iteration on the robot.
    pub fn run_controller(&mut self) -> Result<(), SimError> {
        self.exchange(Mode::RunController)
    }

    /// Set a robot (or, with `user`, controller) parameter. Returns the value
    /// the robot reports as current.
    pub fn send_control_parameter(
        &mut self,
        name: &str,
        value: ParameterValue,
        user: bool,
    ) -> Result<ParameterValue, SimError> {
        let current = self.request(RequestKind::set(user), name, value)?;
        info!(name, %value, user, "Control parameter set on robot");
        Ok(current)
    }

    /// Read a parameter of the given kind from the robot.
    pub fn get_control_parameter(
        &mut self,
        name: &str,
        kind: ParameterKind,
        user: bool,
    ) -> Result<ParameterValue, SimError> {
        self.request(RequestKind::get(user), name, ParameterValue::zero(kind))
    }

    /// Send every value of a parameter file. Returns how many were sent.
    pub fn load_parameter_file(&mut self, path: &Path, user: bool) -> Result<usize, SimError> {
        let values = ParameterFile::load_values(path)?;
        for (name, value) in &values {
            self.send_control_parameter(name, *value, user)?;
        }
        info!(
            path = %path.display(),
            count = values.len(),
            table = if user { "user" } else { "robot" },
            "Parameter file sent to robot"
        );
        Ok(values.len())
    }

    fn request(
        &mut self,
        kind: RequestKind,
        name: &str,
        value: ParameterValue,
    ) -> Result<ParameterValue, SimError> {
        let number = self.request_number + 1;
        {
            let message = self.endpoint.message_mut()?;
            message
                .sim_to_robot
                .control_parameter_request
                .publish(number, kind, name, value)?;
            message.sim_to_robot.set_mode(Mode::ApplyControlParameters);
        }
        self.request_number = number;
        self.endpoint.signal_simulator_done()?;

        // A timed-out wait keeps the same request outstanding; the robot
        // still owns the turn, so the only option is to keep waiting.
        let mut answered = false;
        for attempt in 0..=self.options.parameter_retries {
            if self.endpoint.wait_for_robot_timeout(self.options.turn_timeout)? {
                answered = true;
                break;
            }
            warn!(name, request = number, attempt, "Robot has not answered parameter request yet");
        }
        if !answered {
            return Err(SimError::ParameterNotAcknowledged {
                name: name.to_string(),
                request_number: number,
                published_error: self.read_error(),
            });
        }
        self.exchanges += 1;

        let response = &self.endpoint.message()?.robot_to_sim.control_parameter_response;
        if response.request_number != number {
            return Err(SimError::ProtocolViolation(format!(
                "response number {} for request {number}",
                response.request_number
            )));
        }
        let echoed = decode_name(&response.name)?;
        if echoed.as_str() != name || response.request_kind != kind.as_raw() {
            return Err(SimError::ProtocolViolation(format!(
                "response for '{echoed}' does not match {kind} '{name}'"
            )));
        }
        let current = response.value()?;
        debug!(request = number, %kind, name, %current, n_parameters = response.n_parameters, "Parameter response");
        Ok(current)
    }

    /// Error text the robot left in the region, if any.
    ///
    /// Read without synchronisation: only meaningful once the robot has
    /// stopped taking turns.
    pub fn read_error(&self) -> Option<String> {
        let snapshot = self.endpoint.snapshot_unsynchronized().ok()?;
        snapshot
            .robot_to_sim
            .error_message()
            .map(|text| text.into_owned())
    }

    /// Send `Exit`, wait for the robot to acknowledge it, and destroy the
    /// channel.
    pub fn exit(mut self) -> Result<(), SimError> {
        info!(exchanges = self.exchanges, "Sending exit to robot");
        if self.endpoint.phase() == TurnPhase::Active {
            self.exchange(Mode::Exit)?;
        }
        self.destroy()
    }

    /// Unlink the region and both semaphores.
    pub fn destroy(self) -> Result<(), SimError> {
        Ok(self.endpoint.destroy()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tag: &str) -> ChannelNames {
        ChannelNames::with_suffix(&format!("conn-{tag}-{}", std::process::id()))
    }

    fn quick() -> ConnectionOptions {
        ConnectionOptions {
            turn_timeout: Duration::from_millis(20),
            parameter_retries: 1,
        }
    }

    #[test]
    fn create_declares_robot_and_idle_mode() -> Result<(), SimError> {
        let conn = SimulatorConnection::create(&names("setup"), RobotType::Cyberdog, quick())?;
        let message = conn.message()?;
        assert_eq!(message.sim_to_robot.robot_type(), Some(RobotType::Cyberdog));
        assert_eq!(message.sim_to_robot.mode(), Some(Mode::Idle));
        assert_eq!(conn.request_number(), 0);
        conn.destroy()
    }

    #[test]
    fn missing_robot_is_reported_as_stalled() -> Result<(), SimError> {
        let mut conn = SimulatorConnection::create(&names("absent"), RobotType::MiniCheetah, quick())?;
        assert!(matches!(
            conn.probe(),
            Err(SimError::RobotStalled {
                published_error: None
            })
        ));
        Ok(())
    }

    #[test]
    fn unanswered_request_exhausts_retries() -> Result<(), SimError> {
        let mut conn = SimulatorConnection::create(&names("retry"), RobotType::MiniCheetah, quick())?;
        let result = conn.send_control_parameter("kp", ParameterValue::Double(5.0), false);
        assert!(matches!(
            result,
            Err(SimError::ParameterNotAcknowledged { request_number: 1, .. })
        ));
        assert_eq!(conn.request_number(), 1);
        Ok(())
    }

    #[test]
    fn exclusive_create_refuses_live_channel() -> Result<(), SimError> {
        let names = names("excl");
        let first = SimulatorConnection::create(&names, RobotType::MiniCheetah, quick())?;
        assert!(matches!(
            SimulatorConnection::create_exclusive(&names, RobotType::MiniCheetah, quick()),
            Err(SimError::Shm(quad_shared_memory::ShmError::AlreadyExists { .. }))
        ));
        first.destroy()
    }
}
