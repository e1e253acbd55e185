//! Turn protocol between the simulator and the robot.
//!
//! Exactly one peer owns the whole region at a time. Ownership moves with
//! two named semaphores, both starting at 0:
//!
//! ```text
//!  simulator                         robot
//!  ─────────                         ─────
//!  create()            (Active)      attach()           (Waiting)
//!  ... setup turn ...                wait_for_simulator()  blocks
//!  signal_simulator_done() ──post(sim)──►              (Active)
//!  wait_for_robot()    (Waiting)     ... robot turn ...
//!                      ◄──post(robot)── signal_robot_done()
//!  (Active)                          wait_for_simulator()  (Waiting)
//! ```
//!
//! The endpoints track their own [`TurnPhase`] and refuse region access or
//! a done-signal outside their turn with [`ShmError::TurnViolation`]. The
//! simulator is the channel owner: it unlinks the region and both
//! semaphores on [`SimulatorEndpoint::destroy`] or drop, unless a newer
//! simulator has reclaimed the names since. The robot only closes its
//! handles.

use crate::error::{ShmError, ShmResult};
use crate::region::SharedRegion;
use crate::semaphore::NamedSemaphore;
use quad::config::ChannelNames;
use quad::shm::plain::PlainData;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Whether an endpoint currently holds the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// Waiting for the other peer; the region must not be touched.
    Waiting,
    /// Holding the turn; exclusive access to the region.
    Active,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
        })
    }
}

/// The two turn semaphores.
#[derive(Debug)]
pub struct TurnSemaphores {
    /// Posted by the robot at the end of its turn.
    pub robot: NamedSemaphore,
    /// Posted by the simulator at the end of its turn.
    pub simulator: NamedSemaphore,
}

impl TurnSemaphores {
    /// Create both semaphores at 0, reclaiming stale ones.
    pub fn create(names: &ChannelNames) -> ShmResult<Self> {
        Ok(Self {
            robot: NamedSemaphore::create(&names.robot_semaphore)?,
            simulator: NamedSemaphore::create(&names.simulator_semaphore)?,
        })
    }

    /// Create both semaphores at 0, failing with
    /// [`ShmError::SemaphoreExists`] if either name is taken.
    pub fn create_exclusive(names: &ChannelNames) -> ShmResult<Self> {
        let robot = NamedSemaphore::create_exclusive(&names.robot_semaphore)?;
        match NamedSemaphore::create_exclusive(&names.simulator_semaphore) {
            Ok(simulator) => Ok(Self { robot, simulator }),
            Err(e) => {
                drop(robot);
                NamedSemaphore::unlink(&names.robot_semaphore)?;
                Err(e)
            }
        }
    }

    /// Open both existing semaphores.
    pub fn open(names: &ChannelNames) -> ShmResult<Self> {
        Ok(Self {
            robot: NamedSemaphore::open(&names.robot_semaphore)?,
            simulator: NamedSemaphore::open(&names.simulator_semaphore)?,
        })
    }

    /// Unlink both names, ignoring missing ones.
    pub fn unlink(names: &ChannelNames) -> ShmResult<()> {
        NamedSemaphore::unlink(&names.robot_semaphore)?;
        NamedSemaphore::unlink(&names.simulator_semaphore)
    }
}

/// Local turn bookkeeping shared by both endpoint kinds.
#[derive(Debug)]
struct TurnState {
    phase: TurnPhase,
    completed: u64,
}

impl TurnState {
    fn new(phase: TurnPhase) -> Self {
        Self {
            phase,
            completed: 0,
        }
    }

    fn require(&self, phase: TurnPhase, operation: &'static str) -> ShmResult<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(ShmError::TurnViolation {
                operation,
                phase: self.phase,
            })
        }
    }

    fn finish(&mut self) {
        self.phase = TurnPhase::Waiting;
        self.completed += 1;
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Simulator side
// ═══════════════════════════════════════════════════════════════════

/// Channel owner. Creates the region and semaphores and holds the first turn.
pub struct SimulatorEndpoint<T: PlainData> {
    names: ChannelNames,
    region: Option<SharedRegion<T>>,
    turns: TurnSemaphores,
    state: TurnState,
}

impl<T: PlainData> SimulatorEndpoint<T> {
    /// Create the channel, force-reclaiming stale objects of the same names.
    pub fn create(names: &ChannelNames) -> ShmResult<Self> {
        let region = SharedRegion::create(&names.region)?;
        Self::create_with(names, region, TurnSemaphores::create(names)?)
    }

    /// Create the channel, failing if the region or either semaphore name
    /// is already in use. Nothing that exists is touched.
    pub fn create_exclusive(names: &ChannelNames) -> ShmResult<Self> {
        let region = SharedRegion::create_exclusive(&names.region)?;
        // On failure the region is dropped, which unlinks it again.
        Self::create_with(names, region, TurnSemaphores::create_exclusive(names)?)
    }

    fn create_with(
        names: &ChannelNames,
        region: SharedRegion<T>,
        turns: TurnSemaphores,
    ) -> ShmResult<Self> {
        info!(
            region = %names.region,
            robot_semaphore = %names.robot_semaphore,
            simulator_semaphore = %names.simulator_semaphore,
            "Simulator channel created"
        );
        Ok(Self {
            names: names.clone(),
            region: Some(region),
            turns,
            state: TurnState::new(TurnPhase::Active),
        })
    }

    /// Channel names in use.
    pub fn names(&self) -> &ChannelNames {
        &self.names
    }

    /// Current phase.
    pub fn phase(&self) -> TurnPhase {
        self.state.phase
    }

    /// Number of simulator turns handed over so far.
    pub fn turns_completed(&self) -> u64 {
        self.state.completed
    }

    fn region(&self) -> ShmResult<&SharedRegion<T>> {
        self.region.as_ref().ok_or(ShmError::NotFound {
            name: self.names.region.clone(),
        })
    }

    /// Read the region during the simulator's turn.
    pub fn message(&self) -> ShmResult<&T> {
        self.state.require(TurnPhase::Active, "read region")?;
        Ok(self.region()?.get())
    }

    /// Write the region during the simulator's turn.
    pub fn message_mut(&mut self) -> ShmResult<&mut T> {
        self.state.require(TurnPhase::Active, "write region")?;
        let name = &self.names.region;
        self.region
            .as_mut()
            .map(SharedRegion::get_mut)
            .ok_or_else(|| ShmError::NotFound { name: name.clone() })
    }

    /// Copy of the region taken outside the turn, for diagnosing a peer that
    /// stopped responding. Never use it to drive the protocol.
    pub fn snapshot_unsynchronized(&self) -> ShmResult<T> {
        Ok(self.region()?.snapshot())
    }

    /// Hand the turn to the robot.
    pub fn signal_simulator_done(&mut self) -> ShmResult<()> {
        self.state.require(TurnPhase::Active, "signal simulator done")?;
        self.turns.simulator.post()?;
        self.state.finish();
        Ok(())
    }

    /// Block until the robot hands the turn back.
    pub fn wait_for_robot(&mut self) -> ShmResult<()> {
        self.state.require(TurnPhase::Waiting, "wait for robot")?;
        self.turns.robot.wait()?;
        self.state.phase = TurnPhase::Active;
        Ok(())
    }

    /// Take the turn back if the robot already finished. Never blocks.
    pub fn try_wait_for_robot(&mut self) -> ShmResult<bool> {
        self.state.require(TurnPhase::Waiting, "try wait for robot")?;
        let done = self.turns.robot.try_wait()?;
        if done {
            self.state.phase = TurnPhase::Active;
        }
        Ok(done)
    }

    /// Wait at most `timeout` for the robot. Returns `false` on timeout, in
    /// which case the robot still holds the turn.
    pub fn wait_for_robot_timeout(&mut self, timeout: Duration) -> ShmResult<bool> {
        self.state.require(TurnPhase::Waiting, "wait for robot")?;
        let done = self.turns.robot.wait_timeout(timeout)?;
        if done {
            self.state.phase = TurnPhase::Active;
        }
        Ok(done)
    }

    /// Unmap and unlink the region and both semaphores.
    ///
    /// If a newer simulator reclaimed the names, only the local mappings and
    /// handles are released; its channel stays usable.
    pub fn destroy(mut self) -> ShmResult<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> ShmResult<()> {
        let Some(region) = self.region.take() else {
            return Ok(());
        };
        let reclaimed = region.is_reclaimed()?;
        region.destroy()?;
        if reclaimed {
            warn!(region = %self.names.region, "Channel names were reclaimed by a newer simulator, leaving them");
            return Ok(());
        }
        TurnSemaphores::unlink(&self.names)?;
        info!(region = %self.names.region, "Simulator channel destroyed");
        Ok(())
    }
}

impl<T: PlainData> Drop for SimulatorEndpoint<T> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!("Failed to tear down simulator channel: {e}");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Robot side
// ═══════════════════════════════════════════════════════════════════

/// Attached peer. Starts waiting for the simulator's first turn.
pub struct RobotEndpoint<T: PlainData> {
    names: ChannelNames,
    region: SharedRegion<T>,
    turns: TurnSemaphores,
    state: TurnState,
}

impl<T: PlainData> RobotEndpoint<T> {
    /// Attach to an existing channel.
    pub fn attach(names: &ChannelNames) -> ShmResult<Self> {
        let region = SharedRegion::attach(&names.region)?;
        let turns = TurnSemaphores::open(names)?;
        info!(region = %names.region, "Robot attached to simulator channel");
        Ok(Self {
            names: names.clone(),
            region,
            turns,
            state: TurnState::new(TurnPhase::Waiting),
        })
    }

    /// Channel names in use.
    pub fn names(&self) -> &ChannelNames {
        &self.names
    }

    /// Current phase.
    pub fn phase(&self) -> TurnPhase {
        self.state.phase
    }

    /// Number of robot turns completed so far.
    pub fn turns_completed(&self) -> u64 {
        self.state.completed
    }

    /// Read the region during the robot's turn.
    pub fn message(&self) -> ShmResult<&T> {
        self.state.require(TurnPhase::Active, "read region")?;
        Ok(self.region.get())
    }

    /// Write the region during the robot's turn.
    pub fn message_mut(&mut self) -> ShmResult<&mut T> {
        self.state.require(TurnPhase::Active, "write region")?;
        Ok(self.region.get_mut())
    }

    /// Raw pointer to the mapped message, for crash reporting that cannot
    /// go through the turn protocol. Valid while `self` is alive.
    pub fn as_ptr(&self) -> *mut T {
        self.region.as_ptr()
    }

    /// Block until the simulator hands over the turn.
    pub fn wait_for_simulator(&mut self) -> ShmResult<()> {
        self.state.require(TurnPhase::Waiting, "wait for simulator")?;
        self.turns.simulator.wait()?;
        self.state.phase = TurnPhase::Active;
        Ok(())
    }

    /// Hand the turn back to the simulator.
    pub fn signal_robot_done(&mut self) -> ShmResult<()> {
        self.state.require(TurnPhase::Active, "signal robot done")?;
        self.turns.robot.post()?;
        self.state.finish();
        Ok(())
    }

    /// Close the semaphores and unmap. Names are left for the owner.
    pub fn detach(self) {
        debug!(region = %self.names.region, "Robot detached from simulator channel");
    }
}
