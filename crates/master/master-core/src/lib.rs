mod board;
mod ranking;
mod rules;

pub use board::{MAX_REWARD, generate_rewards, placement, setup_world};
pub use ranking::{Standing, compare, rank};
pub use rules::{
    InvalidMove, MoveOutcome, apply_move, eliminate_head, eliminate_territory, is_deadlocked,
};
