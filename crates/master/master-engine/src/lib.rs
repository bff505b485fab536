mod channel;
mod error;
mod orchestrator;
mod process;
mod report;

pub use channel::{MoveChannel, ReadOutcome, poll_readable};
pub use error::EngineError;
pub use orchestrator::{Orchestrator, SlotState};
pub use process::ChildProcess;
pub use report::{EndReason, GameReport, ProcessExit};
