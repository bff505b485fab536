// Shared-memory layout of the world state.
//
// Everything here is plain old data with `repr(C)` so the orchestrator,
// the renderer and every agent agree on offsets without any serialization.
// The layout matches the legacy C `state_t`/`player_t` pair byte for byte:
// flags are single bytes and the grid starts right after the padded header.

use std::mem::size_of;

/// Agent slots available in one game.
pub const MAX_AGENTS: usize = 9;

/// Bytes reserved for an agent's display name, NUL terminator included.
pub const NAME_LEN: usize = 16;

/// One agent as seen by every process.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AgentRecord {
    pub name: [u8; NAME_LEN],
    pub score: u32,
    pub invalid_moves: u32,
    pub valid_moves: u32,
    pub x: u16,
    pub y: u16,
    pub pid: i32,
    // stored as a byte: a foreign writer must never be able to hand us an invalid `bool`
    blocked: u8,
}

impl AgentRecord {
    /// Display name up to the first NUL.
    pub fn name(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        std::str::from_utf8(&self.name[..end]).unwrap_or("?")
    }

    /// Store `name`, truncated on a char boundary so one NUL always fits.
    pub fn set_name(&mut self, name: &str) {
        let mut end = name.len().min(NAME_LEN - 1);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        self.name = [0; NAME_LEN];
        self.name[..end].copy_from_slice(&name.as_bytes()[..end]);
    }

    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.blocked != 0
    }

    #[inline]
    pub fn set_blocked(&mut self) {
        self.blocked = 1;
    }

    #[inline]
    pub fn position(&self) -> (u16, u16) {
        (self.x, self.y)
    }

    /// Total number of answered admissions.
    #[inline]
    pub fn moves(&self) -> u32 {
        self.valid_moves + self.invalid_moves
    }
}

/// Fixed-size front of the state region. The grid of `width * height`
/// `i32` cells follows immediately after it.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct StateHeader {
    /// Fixed at creation.
    pub width: u16,
    /// Fixed at creation.
    pub height: u16,
    pub num_agents: u32,
    pub agents: [AgentRecord; MAX_AGENTS],
    finished: u8,
}

impl StateHeader {
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished != 0
    }

    /// One-way: nothing ever clears the flag.
    #[inline]
    pub fn set_finished(&mut self) {
        self.finished = 1;
    }

    /// Active agent count, clamped so a corrupt header cannot index past the array.
    #[inline]
    pub fn agent_count(&self) -> usize {
        (self.num_agents as usize).min(MAX_AGENTS)
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Exact byte size of a state region for a `width x height` board.
#[inline]
pub fn state_size(width: u16, height: u16) -> usize {
    size_of::<StateHeader>() + width as usize * height as usize * size_of::<i32>()
}
