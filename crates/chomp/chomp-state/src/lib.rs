#![forbid(unsafe_code)]

pub mod cell;
pub mod direction;
pub mod layout;
pub mod world;

pub use cell::Cell;
pub use direction::Direction;
pub use layout::{AgentRecord, MAX_AGENTS, NAME_LEN, StateHeader, state_size};
pub use world::{World, WorldBuf, WorldMut};
