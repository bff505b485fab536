//! Layout of the synchronization region and the names both regions live under.
//!
//! # Memory Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ render_request │ render_done │ no_starve │ writer_lock │ reader_ │
//! │    (sem_t)     │   (sem_t)   │  (sem_t)  │   (sem_t)   │ mutex   │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ readers: u32 (guarded by reader_mutex) + padding                 │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ gates[0] │ gates[1] │ ...                           │ gates[8]    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The field order matches the legacy C `sync_t` so older processes can
//! attach to a region created here and vice versa.

use crate::semaphore::Semaphore;
use chomp_state::MAX_AGENTS;
use std::io;
use std::mem::size_of;
use std::sync::atomic::{AtomicU32, Ordering};

/// Default name of the world-state region.
pub const DEFAULT_STATE_SHM: &str = "/game_state";

/// Default name of the synchronization region.
pub const DEFAULT_SYNC_SHM: &str = "/game_sync";

/// Environment variable carrying the state region name to child processes.
pub const STATE_SHM_ENV: &str = "CHOMP_STATE_SHM";

/// Environment variable carrying the sync region name to child processes.
pub const SYNC_SHM_ENV: &str = "CHOMP_SYNC_SHM";

/// Environment variable telling an agent which slot (and gate) is its own.
pub const AGENT_SLOT_ENV: &str = "CHOMP_AGENT_SLOT";

/// Every semaphore the processes coordinate through.
#[repr(C)]
pub struct SyncBlock {
    /// Orchestrator -> renderer: there is something new to draw.
    pub render_request: Semaphore,
    /// Renderer -> orchestrator: drawing finished.
    pub render_done: Semaphore,
    /// Turnstile. A waiting writer holds it so no new reader generation starts.
    pub no_starve: Semaphore,
    /// Room lock: held by the writer, or by the reader generation as a whole.
    pub writer_lock: Semaphore,
    /// Protects `readers`.
    pub reader_mutex: Semaphore,
    /// Readers currently inside. Only touched with `reader_mutex` held.
    readers: AtomicU32,
    /// One admission gate per agent slot.
    pub gates: [Semaphore; MAX_AGENTS],
}

/// Exact byte size of the synchronization region.
pub const SYNC_SIZE: usize = size_of::<SyncBlock>();

impl SyncBlock {
    /// Give every primitive its starting value: handshakes and gates closed,
    /// turnstile, room and counter mutex open, no readers.
    ///
    /// # Safety
    /// Only the process that created the region may call this, once, before
    /// any other process attaches.
    pub(crate) unsafe fn init(&self) -> io::Result<()> {
        unsafe {
            self.render_request.init(0)?;
            self.render_done.init(0)?;
            self.no_starve.init(1)?;
            self.writer_lock.init(1)?;
            self.reader_mutex.init(1)?;
            for gate in &self.gates {
                gate.init(0)?;
            }
        }
        self.readers.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Number of readers inside right now. Unsynchronized snapshot.
    #[inline]
    pub fn readers(&self) -> u32 {
        self.readers.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn reader_count(&self) -> &AtomicU32 {
        &self.readers
    }

    /// Admission gate of `slot`.
    pub fn gate(&self, slot: usize) -> io::Result<&Semaphore> {
        self.gates.get(slot).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("agent slot {slot} out of range (max {MAX_AGENTS})"),
            )
        })
    }
}

/// Names of the two regions of one game.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShmNames {
    pub state: String,
    pub sync: String,
}

impl Default for ShmNames {
    fn default() -> Self {
        Self {
            state: DEFAULT_STATE_SHM.into(),
            sync: DEFAULT_SYNC_SHM.into(),
        }
    }
}

impl ShmNames {
    pub fn new(state: impl Into<String>, sync: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            sync: sync.into(),
        }
    }

    /// Names exported by the orchestrator, falling back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            state: std::env::var(STATE_SHM_ENV).unwrap_or(defaults.state),
            sync: std::env::var(SYNC_SHM_ENV).unwrap_or(defaults.sync),
        }
    }
}
