// Move application and elimination.
//
// Every function here mutates a `WorldMut`, so callers either hold the writer
// role on the shared region or work on a private `WorldBuf`. Nothing in this
// module touches locks, pipes or processes.
//
// Cell transitions only ever go forward:
//     Free -> Head -> Body -> Eliminated, or Head -> Eliminated.

use chomp_state::{Cell, Direction, World, WorldMut};
use tracing::debug;

/// Why a move was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidMove {
    /// The byte is not one of the eight direction codes.
    UnknownDirection(u8),
    OffBoard,
    /// Target is already somebody's territory.
    Claimed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved { to: (u16, u16), reward: u8 },
    Invalid(InvalidMove),
}

impl MoveOutcome {
    #[inline]
    pub fn is_valid(&self) -> bool {
        matches!(self, MoveOutcome::Moved { .. })
    }
}

/// Apply one wire byte from the agent in `slot`, standing at `from`.
///
/// A valid move collects the target's reward, turns the old head into body and
/// moves the head; anything else only bumps the invalid counter.
pub fn apply_move(
    world: &mut WorldMut<'_>,
    slot: usize,
    from: (u16, u16),
    byte: u8,
) -> MoveOutcome {
    let outcome = resolve(world.as_world(), from, byte);
    let owner = slot as u8;

    match outcome {
        MoveOutcome::Moved { to, reward } => {
            world.set_cell(from.0, from.1, Cell::Body(owner));
            world.set_cell(to.0, to.1, Cell::Head(owner));
            if let Some(agent) = world.agent_mut(slot) {
                agent.valid_moves += 1;
                agent.score = agent.score.saturating_add(reward as u32);
                agent.x = to.0;
                agent.y = to.1;
            }
        }
        MoveOutcome::Invalid(reason) => {
            debug!(slot, ?reason, "invalid move");
            if let Some(agent) = world.agent_mut(slot) {
                agent.invalid_moves += 1;
            }
        }
    }
    outcome
}

fn resolve(world: World<'_>, (x, y): (u16, u16), byte: u8) -> MoveOutcome {
    let Ok(dir) = Direction::try_from(byte) else {
        return MoveOutcome::Invalid(InvalidMove::UnknownDirection(byte));
    };
    let Some(to) = world.step(x, y, dir) else {
        return MoveOutcome::Invalid(InvalidMove::OffBoard);
    };
    match world.cell(to.0, to.1).and_then(Cell::reward) {
        Some(reward) => MoveOutcome::Moved { to, reward },
        None => MoveOutcome::Invalid(InvalidMove::Claimed),
    }
}

/// An agent whose pipe closed: blocked, and its head alone is eliminated.
pub fn eliminate_head(world: &mut WorldMut<'_>, slot: usize) {
    let Some(agent) = world.agent_mut(slot) else {
        return;
    };
    agent.set_blocked();
    let (x, y) = agent.position();
    if world.as_world().cell(x, y) == Some(Cell::Head(slot as u8)) {
        world.set_cell(x, y, Cell::Eliminated(slot as u8));
    }
}

/// A deadlocked agent: blocked, and every body and head cell it owns is
/// eliminated. Returns the number of cells converted.
pub fn eliminate_territory(world: &mut WorldMut<'_>, slot: usize) -> usize {
    let Some(agent) = world.agent_mut(slot) else {
        return 0;
    };
    agent.set_blocked();

    let owner = slot as u8;
    let mut converted = 0;
    for raw in world.raw_cells_mut() {
        if matches!(Cell::decode(*raw), Cell::Body(o) | Cell::Head(o) if o == owner) {
            *raw = Cell::Eliminated(owner).encode();
            converted += 1;
        }
    }
    converted
}

/// No free cell among the eight neighbours of `at`.
#[inline]
pub fn is_deadlocked(world: World<'_>, at: (u16, u16)) -> bool {
    !world.has_free_neighbor(at.0, at.1)
}
