mod admission;
mod ipc;
mod regions;
mod retry;
mod rw_gate;
mod semaphore;
mod shm_layout;

pub use ipc::{Ipc, ReadGuard, WriteGuard};
pub use regions::{StateRegion, SyncRegion};
pub use retry::{cvt, retry_on_interrupt};
pub use semaphore::Semaphore;
pub use shm_layout::{
    AGENT_SLOT_ENV, DEFAULT_STATE_SHM, DEFAULT_SYNC_SHM, STATE_SHM_ENV, SYNC_SHM_ENV, SYNC_SIZE,
    ShmNames, SyncBlock,
};
pub use chomp_shm::Access;
