//! What a finished game hands back to its caller.

use master_core::Standing;
use std::fmt;
use std::process::ExitStatus;

/// Why the scheduler stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Every agent is blocked or disconnected.
    NoActiveAgents,
    /// No valid move within the inactivity timeout.
    Inactivity,
    /// Readiness multiplexing itself failed.
    PollFailed,
}

/// Exit status of one child, `None` if it could not be reaped.
#[derive(Debug, Clone)]
pub struct ProcessExit {
    pub label: String,
    pub pid: i32,
    pub status: Option<ExitStatus>,
}

#[derive(Debug, Clone)]
pub struct GameReport {
    pub seed: u64,
    pub reason: EndReason,
    pub frames: u64,
    /// Best first.
    pub standings: Vec<Standing>,
    /// Agents in slot order, then the renderer.
    pub exits: Vec<ProcessExit>,
}

impl GameReport {
    pub fn winner(&self) -> Option<&Standing> {
        self.standings.first()
    }
}

impl fmt::Display for GameReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>4}  {:<16}{:>8}{:>8}{:>8}{:>9}  {}",
            "rank", "name", "pid", "score", "valid", "invalid", "state"
        )?;
        for (place, s) in self.standings.iter().enumerate() {
            writeln!(
                f,
                "{:>4}  {:<16}{:>8}{:>8}{:>8}{:>9}  {}",
                place + 1,
                s.name,
                s.pid,
                s.score,
                s.valid_moves,
                s.invalid_moves,
                if s.blocked { "blocked" } else { "alive" }
            )?;
        }
        Ok(())
    }
}
