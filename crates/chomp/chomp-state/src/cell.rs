//! Typed view of one grid cell.
//!
//! On the wire a cell is a single `i32`. Positive values are unclaimed cells
//! carrying a reward; everything `<= 0` is claimed territory, split into three
//! bands per agent index `i`:
//!
//! ```text
//!   body        -i            (-99 ..= 0)
//!   head        -(100 + i)    (-199 ..= -100)
//!   eliminated  -(200 + i)    (..= -200)
//! ```
//!
//! Note that `0` is the body of agent 0; rewards are never zero.

const HEAD_BASE: i32 = 100;
const ELIMINATED_BASE: i32 = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cell {
    /// Unclaimed, worth the given reward.
    Free(u8),
    /// Trail left behind by the owner.
    Body(u8),
    /// The owner's current position.
    Head(u8),
    /// Territory of an agent that can no longer act.
    Eliminated(u8),
}

fn narrow(v: i32) -> u8 {
    u8::try_from(v).unwrap_or(u8::MAX)
}

impl Cell {
    pub fn decode(raw: i32) -> Self {
        if raw > 0 {
            Cell::Free(narrow(raw))
        } else if raw <= -ELIMINATED_BASE {
            Cell::Eliminated(narrow(-ELIMINATED_BASE - raw))
        } else if raw <= -HEAD_BASE {
            Cell::Head(narrow(-HEAD_BASE - raw))
        } else {
            Cell::Body(narrow(-raw))
        }
    }

    pub fn encode(self) -> i32 {
        match self {
            Cell::Free(reward) => reward as i32,
            Cell::Body(owner) => -(owner as i32),
            Cell::Head(owner) => -(HEAD_BASE + owner as i32),
            Cell::Eliminated(owner) => -(ELIMINATED_BASE + owner as i32),
        }
    }

    #[inline]
    pub fn is_free(self) -> bool {
        matches!(self, Cell::Free(_))
    }

    pub fn reward(self) -> Option<u8> {
        match self {
            Cell::Free(r) => Some(r),
            _ => None,
        }
    }

    pub fn owner(self) -> Option<u8> {
        match self {
            Cell::Free(_) => None,
            Cell::Body(o) | Cell::Head(o) | Cell::Eliminated(o) => Some(o),
        }
    }

    /// Position in the free -> head -> body -> eliminated progression.
    /// A cell's stage never decreases over a game.
    pub fn stage(self) -> u8 {
        match self {
            Cell::Free(_) => 0,
            Cell::Head(_) => 1,
            Cell::Body(_) => 2,
            Cell::Eliminated(_) => 3,
        }
    }
}

impl From<i32> for Cell {
    fn from(raw: i32) -> Self {
        Cell::decode(raw)
    }
}

impl From<Cell> for i32 {
    fn from(cell: Cell) -> Self {
        cell.encode()
    }
}
