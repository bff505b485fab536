// The orchestrator: owns the shared regions, the renderer and every agent.
//
// One pass of the scheduler:
//   1. stop if no valid move happened within the inactivity timeout
//   2. admit every active agent that has no admission outstanding
//   3. poll the active pipes, bounded by the turn timeout
//   4. read one byte from each ready pipe, ascending slot order, and apply it
//      under the writer role; a closed or failing pipe disconnects the agent
//   5. active agents without a valid move this pass are checked for deadlock
//   6. pace with the frame delay if anything moved
//   7. stop once nobody is active
//
// This process is the only writer. The renderer is driven through the
// request/done handshake after every change it has to show.

use crate::channel::{MoveChannel, ReadOutcome, poll_readable};
use crate::error::EngineError;
use crate::process::{ChildProcess, label_of};
use crate::report::{EndReason, GameReport, ProcessExit};
use chomp_icc::{AGENT_SLOT_ENV, Ipc, STATE_SHM_ENV, SYNC_SHM_ENV, ShmNames};
use master_config::MasterConfig;
use master_core::{
    MoveOutcome, apply_move, eliminate_head, eliminate_territory, is_deadlocked, rank, setup_world,
};
use std::io;
use std::os::fd::RawFd;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Slice of a render wait between renderer liveness checks.
const RENDER_POLL: Duration = Duration::from_millis(50);

/// How long a child gets to exit on its own at shutdown before `SIGTERM`.
const REAP_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Active,
    /// Deadlocked: no free neighbour left.
    Blocked,
    /// Pipe closed or failed.
    Disconnected,
}

enum PassResult {
    Progress,
    Idle,
    PollFailed,
}

struct AgentSlot {
    process: ChildProcess,
    channel: MoveChannel,
    /// Mirror of the shared record, updated right after each committed move.
    position: (u16, u16),
    state: SlotState,
    /// An admission was posted and not answered yet.
    admitted: bool,
}

pub struct Orchestrator {
    ipc: Ipc,
    names: ShmNames,
    config: MasterConfig,
    seed: u64,
    agents: Vec<AgentSlot>,
    renderer: Option<ChildProcess>,
    renderer_alive: bool,
    last_progress: Instant,
    frames: u64,
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Give `process` a grace period, then terminate it, then wait.
fn reap(process: &mut ChildProcess) -> ProcessExit {
    let deadline = Instant::now() + REAP_GRACE;
    while Instant::now() < deadline {
        match process.try_wait() {
            Ok(Some(_)) | Err(_) => break,
            Ok(None) => thread::sleep(Duration::from_millis(10)),
        }
    }
    if let Ok(None) = process.try_wait() {
        warn!(label = process.label(), pid = process.pid(), "still running, terminating");
        if let Err(e) = process.terminate() {
            warn!(pid = process.pid(), error = %e, "failed to signal");
        }
    }
    let status = match process.wait() {
        Ok(status) => Some(status),
        Err(e) => {
            warn!(pid = process.pid(), error = %e, "failed to reap");
            None
        }
    };
    info!(label = process.label(), pid = process.pid(), ?status, "process exited");
    ProcessExit {
        label: process.label().to_owned(),
        pid: process.pid(),
        status,
    }
}

impl Orchestrator {
    /// Validate `config`, create fresh regions, initialise the world and
    /// spawn the renderer and agents.
    ///
    /// Regions left behind by an earlier run under the same names are
    /// removed first. On any failure everything created so far is torn down.
    pub fn setup(config: MasterConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let names = ShmNames::new(config.state_shm.as_str(), config.sync_shm.as_str());
        let ipc_error = |source: io::Error| EngineError::Ipc {
            state: names.state.clone(),
            sync: names.sync.clone(),
            source,
        };

        Ipc::destroy(&names).map_err(ipc_error)?;
        let (ipc, existed) =
            Ipc::create(&names, config.width, config.height).map_err(ipc_error)?;
        if existed {
            // someone recreated them between our unlink and create
            ipc.detach();
            return Err(ipc_error(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "regions are owned by another game",
            )));
        }

        let seed = config.seed.unwrap_or_else(clock_seed);
        let mut orchestrator = Self {
            ipc,
            names,
            config,
            seed,
            agents: Vec::new(),
            renderer: None,
            renderer_alive: false,
            last_progress: Instant::now(),
            frames: 0,
        };
        if let Err(e) = orchestrator.launch() {
            error!(error = %e, "setup failed");
            orchestrator.abort();
            return Err(e);
        }
        Ok(orchestrator)
    }

    fn launch(&mut self) -> Result<(), EngineError> {
        let labels: Vec<String> = self.config.players.iter().map(|p| label_of(p)).collect();
        let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        let positions = setup_world(&mut *self.ipc.write()?, self.seed, &label_refs);

        let args = [self.config.width.to_string(), self.config.height.to_string()];
        let shm_env = [
            (STATE_SHM_ENV, self.names.state.clone()),
            (SYNC_SHM_ENV, self.names.sync.clone()),
        ];

        if let Some(path) = &self.config.view {
            let view = ChildProcess::spawn(path, &args, shm_env.clone(), false).map_err(
                |source| EngineError::Spawn {
                    path: path.clone(),
                    source,
                },
            )?;
            self.renderer = Some(view);
            self.renderer_alive = true;
        }

        for (slot, (path, position)) in self.config.players.iter().zip(positions).enumerate() {
            let env = shm_env
                .iter()
                .cloned()
                .chain([(AGENT_SLOT_ENV, slot.to_string())]);
            let mut process = ChildProcess::spawn(path, &args, env, true).map_err(|source| {
                EngineError::Spawn {
                    path: path.clone(),
                    source,
                }
            })?;
            let channel = process
                .take_stdout()
                .map(MoveChannel::new)
                .unwrap_or_else(MoveChannel::closed);
            let state = if channel.is_open() {
                SlotState::Active
            } else {
                SlotState::Disconnected
            };
            self.agents.push(AgentSlot {
                process,
                channel,
                position,
                state,
                admitted: false,
            });
        }

        let mut world = self.ipc.write()?;
        for (slot, agent) in self.agents.iter().enumerate() {
            if let Some(record) = world.agent_mut(slot) {
                record.pid = agent.process.pid();
            }
        }
        Ok(())
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Pids of the spawned agents, by slot.
    pub fn agent_pids(&self) -> Vec<i32> {
        self.agents.iter().map(|a| a.process.pid()).collect()
    }

    /// Play until the game ends, then shut down and rank.
    pub fn run(mut self) -> Result<GameReport, EngineError> {
        info!(
            seed = self.seed,
            agents = self.agents.len(),
            width = self.config.width,
            height = self.config.height,
            "game started"
        );
        match self.play() {
            Ok(reason) => self.finish(reason),
            Err(e) => {
                error!(error = %e, "game aborted");
                self.abort();
                Err(e)
            }
        }
    }

    fn any_active(&self) -> bool {
        self.agents.iter().any(|a| a.state == SlotState::Active)
    }

    fn play(&mut self) -> Result<EndReason, EngineError> {
        self.last_progress = Instant::now();
        self.render()?;

        loop {
            let idle_for = self.last_progress.elapsed();
            if self
                .config
                .inactivity_timeout()
                .is_some_and(|limit| idle_for >= limit)
            {
                info!(?idle_for, "inactivity timeout");
                return Ok(EndReason::Inactivity);
            }
            if !self.any_active() {
                return Ok(EndReason::NoActiveAgents);
            }

            match self.pass()? {
                PassResult::Progress => thread::sleep(self.config.delay()),
                PassResult::Idle => {}
                PassResult::PollFailed => return Ok(EndReason::PollFailed),
            }
        }
    }

    fn pass(&mut self) -> Result<PassResult, EngineError> {
        for (slot, agent) in self.agents.iter_mut().enumerate() {
            if agent.state == SlotState::Active && !agent.admitted {
                self.ipc.sync().admit(slot)?;
                agent.admitted = true;
            }
        }

        let fds: Vec<(usize, RawFd)> = self
            .agents
            .iter()
            .enumerate()
            .filter(|(_, a)| a.state == SlotState::Active)
            .filter_map(|(slot, a)| a.channel.raw_fd().map(|fd| (slot, fd)))
            .collect();

        let ready = match poll_readable(&fds, self.config.turn_timeout()) {
            Ok(ready) => ready,
            Err(e) => {
                error!(error = %e, "poll failed, deactivating every agent");
                for agent in self.agents.iter_mut() {
                    if agent.state == SlotState::Active {
                        agent.state = SlotState::Disconnected;
                        agent.channel.close();
                    }
                }
                return Ok(PassResult::PollFailed);
            }
        };

        let mut moved = vec![false; self.agents.len()];
        for slot in ready {
            match self.agents[slot].channel.read_byte() {
                ReadOutcome::Byte(byte) => {
                    self.agents[slot].admitted = false;
                    moved[slot] = self.handle_move(slot, byte)?;
                }
                ReadOutcome::Closed => {
                    debug!(slot, "pipe closed");
                    self.disconnect(slot)?;
                }
                ReadOutcome::Failed(e) => {
                    warn!(slot, error = %e, "read failed");
                    self.disconnect(slot)?;
                }
            }
        }

        for slot in 0..self.agents.len() {
            if self.agents[slot].state == SlotState::Active && !moved[slot] {
                self.check_deadlock(slot)?;
            }
        }

        Ok(if moved.contains(&true) {
            PassResult::Progress
        } else {
            PassResult::Idle
        })
    }

    /// Apply one byte; `true` for a valid move.
    fn handle_move(&mut self, slot: usize, byte: u8) -> Result<bool, EngineError> {
        let from = self.agents[slot].position;
        let outcome = apply_move(&mut *self.ipc.write()?, slot, from, byte);

        match outcome {
            MoveOutcome::Moved { to, reward } => {
                debug!(slot, ?from, ?to, reward, "moved");
                self.agents[slot].position = to;
                self.last_progress = Instant::now();
                self.render()?;
                Ok(true)
            }
            MoveOutcome::Invalid(_) => Ok(false),
        }
    }

    fn disconnect(&mut self, slot: usize) -> Result<(), EngineError> {
        eliminate_head(&mut *self.ipc.write()?, slot);

        let agent = &mut self.agents[slot];
        agent.state = SlotState::Disconnected;
        agent.channel.close();
        if let Err(e) = agent.process.terminate() {
            warn!(slot, error = %e, "failed to signal disconnected agent");
        }
        info!(slot, pid = agent.process.pid(), "agent disconnected");
        self.render()
    }

    fn check_deadlock(&mut self, slot: usize) -> Result<(), EngineError> {
        let at = self.agents[slot].position;
        if !is_deadlocked(*self.ipc.read()?, at) {
            return Ok(());
        }
        let lost = eliminate_territory(&mut *self.ipc.write()?, slot);

        let agent = &mut self.agents[slot];
        agent.state = SlotState::Blocked;
        agent.channel.close();
        if let Err(e) = agent.process.terminate() {
            warn!(slot, error = %e, "failed to signal blocked agent");
        }
        info!(slot, pid = agent.process.pid(), cells = lost, "agent deadlocked");
        self.render()
    }

    /// One request/done handshake with the renderer. A renderer that dies
    /// mid-game is dropped instead of stalling the loop.
    fn render(&mut self) -> Result<(), EngineError> {
        if !self.renderer_alive {
            return Ok(());
        }
        let sync = self.ipc.sync();
        sync.request_render()?;
        loop {
            if sync.await_render_done(RENDER_POLL)? {
                self.frames += 1;
                return Ok(());
            }
            let gone = self
                .renderer
                .as_mut()
                .is_none_or(|view| !matches!(view.try_wait(), Ok(None)));
            if gone {
                warn!("renderer exited, continuing without it");
                self.renderer_alive = false;
                return Ok(());
            }
        }
    }

    /// Flag the end, release every gate and show the final frame.
    fn announce_end(&mut self) -> Result<(), EngineError> {
        self.ipc.write()?.set_finished();
        for slot in 0..self.agents.len() {
            self.ipc.sync().admit(slot)?;
        }
        self.render()
    }

    fn finish(mut self, reason: EndReason) -> Result<GameReport, EngineError> {
        info!(?reason, frames = self.frames, "game over");
        if let Err(e) = self.announce_end() {
            error!(error = %e, "failed to announce the end of the game");
        }

        for agent in self.agents.iter_mut() {
            agent.channel.close();
        }
        let mut exits: Vec<ProcessExit> = self
            .agents
            .iter_mut()
            .map(|agent| reap(&mut agent.process))
            .collect();
        if let Some(view) = self.renderer.as_mut() {
            exits.push(reap(view));
        }

        let standings = self.ipc.read().map(|world| rank(world.agents()));
        let Self {
            ipc,
            names,
            seed,
            frames,
            ..
        } = self;
        ipc.detach();
        if let Err(e) = Ipc::destroy(&names) {
            warn!(error = %e, "failed to unlink shared regions");
        }

        Ok(GameReport {
            seed,
            reason,
            frames,
            standings: standings?,
            exits,
        })
    }

    /// Tear everything down after a fatal error.
    fn abort(&mut self) {
        if let Ok(mut world) = self.ipc.write() {
            world.set_finished();
        }
        for (slot, agent) in self.agents.iter_mut().enumerate() {
            agent.channel.close();
            let _ = self.ipc.sync().admit(slot);
            if let Err(e) = agent.process.terminate() {
                warn!(slot, error = %e, "failed to signal agent");
            }
        }
        if let Some(view) = self.renderer.as_mut() {
            let _ = view.terminate();
        }
        for agent in self.agents.iter_mut() {
            reap(&mut agent.process);
        }
        if let Some(view) = self.renderer.as_mut() {
            reap(view);
        }
        self.renderer_alive = false;
        if let Err(e) = Ipc::destroy(&self.names) {
            warn!(error = %e, "failed to unlink shared regions");
        }
    }
}
