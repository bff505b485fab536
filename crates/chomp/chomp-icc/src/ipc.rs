//! Lifecycle of a game's shared regions and the lock guards over them.

use crate::regions::{StateRegion, SyncRegion};
use crate::shm_layout::{ShmNames, SyncBlock};
use chomp_shm::Access;
use chomp_state::{World, WorldMut};
use std::io;
use std::ops::{Deref, DerefMut};
use tracing::{debug, error, info};

/// Both regions of one game, mapped into this process.
///
/// Any number of processes may hold an `Ipc` for the same names; only the
/// orchestrator should [`Ipc::destroy`] them.
pub struct Ipc {
    state: StateRegion,
    sync: SyncRegion,
}

/// Shared access to the world. Holding one keeps writers out; dropping it
/// leaves the reader role.
pub struct ReadGuard<'a> {
    sync: &'a SyncBlock,
    world: World<'a>,
}

/// Exclusive access to the world. Dropping it leaves the writer role.
pub struct WriteGuard<'a> {
    sync: &'a SyncBlock,
    world: WorldMut<'a>,
}

impl Ipc {
    /// Create both regions for a `width x height` game.
    ///
    /// Returns `(ipc, already_existed)`. If the sync region cannot be set up,
    /// a state region created by this call is removed again so the next
    /// attacher never finds a half-built game.
    pub fn create(names: &ShmNames, width: u16, height: u16) -> io::Result<(Self, bool)> {
        let (state, state_existed) = StateRegion::create(&names.state, width, height)?;
        let (sync, sync_created) = match SyncRegion::create(&names.sync) {
            Ok(created) => created,
            Err(e) => {
                state.unmap();
                if !state_existed {
                    let _ = StateRegion::destroy(&names.state);
                }
                return Err(e);
            }
        };
        info!(
            state = %names.state,
            sync = %names.sync,
            width,
            height,
            "shared regions ready"
        );
        Ok((Self { state, sync }, state_existed || !sync_created))
    }

    /// Attach to the regions of a running game.
    pub fn attach(names: &ShmNames) -> io::Result<Self> {
        let state = StateRegion::open(&names.state)?;
        let sync = SyncRegion::open(&names.sync)?;
        debug!(state = %names.state, sync = %names.sync, "attached to game");
        Ok(Self { state, sync })
    }

    /// Unlink both regions. Missing regions are not an error.
    pub fn destroy(names: &ShmNames) -> io::Result<()> {
        let state = StateRegion::destroy(&names.state);
        let sync = SyncRegion::destroy(&names.sync);
        let (state, sync) = (state?, sync?);
        debug!(state, sync, "shared regions unlinked");
        Ok(())
    }

    #[inline]
    pub fn sync(&self) -> &SyncBlock {
        self.sync.block()
    }

    #[inline]
    pub fn dimensions(&self) -> (u16, u16) {
        self.state.dimensions()
    }

    #[inline]
    pub fn state_access(&self) -> Access {
        self.state.access()
    }

    /// Enter the reader role.
    pub fn read(&self) -> io::Result<ReadGuard<'_>> {
        let sync = self.sync.block();
        sync.reader_enter()?;
        Ok(ReadGuard {
            sync,
            world: self.state.world(),
        })
    }

    /// Enter the writer role. `&mut self` rules out a second guard from this
    /// process while one is alive.
    pub fn write(&mut self) -> io::Result<WriteGuard<'_>> {
        if self.state.access() == Access::ReadOnly {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "state region is mapped read-only",
            ));
        }
        let sync = self.sync.block();
        sync.writer_enter()?;
        match self.state.world_mut() {
            Some(world) => Ok(WriteGuard { sync, world }),
            None => {
                sync.writer_exit()?;
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            }
        }
    }

    /// Unmap both regions.
    pub fn detach(self) {
        self.state.unmap();
        self.sync.unmap();
    }
}

impl<'a> Deref for ReadGuard<'a> {
    type Target = World<'a>;

    fn deref(&self) -> &World<'a> {
        &self.world
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.sync.reader_exit() {
            error!(error = %e, "failed to leave reader role");
        }
    }
}

impl<'a> Deref for WriteGuard<'a> {
    type Target = WorldMut<'a>;

    fn deref(&self) -> &WorldMut<'a> {
        &self.world
    }
}

impl<'a> DerefMut for WriteGuard<'a> {
    fn deref_mut(&mut self) -> &mut WorldMut<'a> {
        &mut self.world
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.sync.writer_exit() {
            error!(error = %e, "failed to leave writer role");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chomp_state::Cell;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;
    use std::time::Duration;

    fn names(tag: &str) -> ShmNames {
        static NEXT: AtomicU32 = AtomicU32::new(0);
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        let pid = std::process::id();
        ShmNames::new(
            format!("/chomp_icc_{tag}_state_{pid}_{n}"),
            format!("/chomp_icc_{tag}_sync_{pid}_{n}"),
        )
    }

    struct Cleanup(ShmNames);

    impl Drop for Cleanup {
        fn drop(&mut self) {
            let _ = Ipc::destroy(&self.0);
        }
    }

    #[test]
    fn create_initialises_dimensions_and_primitives() {
        let names = names("init");
        let _cleanup = Cleanup(names.clone());
        let (ipc, existed) = Ipc::create(&names, 12, 10).unwrap();
        assert!(!existed);
        assert_eq!(ipc.dimensions(), (12, 10));

        let sync = ipc.sync();
        assert_eq!(sync.render_request.value().unwrap(), 0);
        assert_eq!(sync.render_done.value().unwrap(), 0);
        assert_eq!(sync.no_starve.value().unwrap(), 1);
        assert_eq!(sync.writer_lock.value().unwrap(), 1);
        assert_eq!(sync.reader_mutex.value().unwrap(), 1);
        assert_eq!(sync.readers(), 0);
        for gate in &sync.gates {
            assert_eq!(gate.value().unwrap(), 0);
        }

        let world = ipc.read().unwrap();
        assert_eq!((world.width(), world.height()), (12, 10));
        assert!(!world.is_finished());
    }

    #[test]
    fn second_create_reports_existing_regions() {
        let names = names("twice");
        let _cleanup = Cleanup(names.clone());
        let (_first, existed) = Ipc::create(&names, 10, 10).unwrap();
        assert!(!existed);
        let (_second, existed) = Ipc::create(&names, 10, 10).unwrap();
        assert!(existed);
        // a different board size cannot reuse the region
        assert!(Ipc::create(&names, 20, 10).is_err());
    }

    #[test]
    fn rejected_create_leaves_live_board_intact() {
        let names = names("resize");
        let _cleanup = Cleanup(names.clone());
        let (mut live, _) = Ipc::create(&names, 20, 20).unwrap();
        live.write().unwrap().set_cell(19, 19, Cell::Free(4));

        let err = Ipc::create(&names, 10, 10).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let other = Ipc::attach(&names).unwrap();
        assert_eq!(other.dimensions(), (20, 20));
        let world = other.read().unwrap();
        assert_eq!(world.raw_cells().len(), 20 * 20);
        assert_eq!(world.cell(19, 19), Some(Cell::Free(4)));
    }

    #[test]
    fn larger_board_cannot_grow_existing_region() {
        let names = names("grow");
        let _cleanup = Cleanup(names.clone());
        let (_live, _) = Ipc::create(&names, 10, 10).unwrap();

        assert!(Ipc::create(&names, 20, 20).is_err());
        assert_eq!(Ipc::attach(&names).unwrap().dimensions(), (10, 10));
        assert!(Ipc::create(&names, 10, 10).is_ok());
    }

    #[test]
    fn attach_sizes_grid_from_header() {
        let names = names("attach");
        let _cleanup = Cleanup(names.clone());
        let (mut owner, _) = Ipc::create(&names, 11, 13).unwrap();
        owner.write().unwrap().set_cell(10, 12, Cell::Free(9));

        let other = Ipc::attach(&names).unwrap();
        assert_eq!(other.dimensions(), (11, 13));
        let world = other.read().unwrap();
        assert_eq!(world.raw_cells().len(), 11 * 13);
        assert_eq!(world.cell(10, 12), Some(Cell::Free(9)));
    }

    #[test]
    fn failed_sync_creation_rolls_back_state() {
        let mut names = names("rollback");
        names.sync = "/bad\0name".into();
        assert!(Ipc::create(&names, 10, 10).is_err());
        assert!(StateRegion::open(&names.state).is_err());
    }

    #[test]
    fn destroy_is_idempotent() {
        let names = names("destroy");
        let (ipc, _) = Ipc::create(&names, 10, 10).unwrap();
        ipc.detach();
        Ipc::destroy(&names).unwrap();
        Ipc::destroy(&names).unwrap();
        assert!(Ipc::attach(&names).is_err());
    }

    #[test]
    fn reader_count_tracks_guards() {
        let names = names("count");
        let _cleanup = Cleanup(names.clone());
        let (ipc, _) = Ipc::create(&names, 10, 10).unwrap();

        let a = ipc.read().unwrap();
        let b = ipc.read().unwrap();
        assert_eq!(ipc.sync().readers(), 2);
        // the generation holds the room
        assert_eq!(ipc.sync().writer_lock.value().unwrap(), 0);
        drop(a);
        assert_eq!(ipc.sync().readers(), 1);
        drop(b);
        assert_eq!(ipc.sync().readers(), 0);
        assert_eq!(ipc.sync().writer_lock.value().unwrap(), 1);
    }

    #[test]
    fn writer_guard_releases_room_then_turnstile() {
        let names = names("writer");
        let _cleanup = Cleanup(names.clone());
        let (mut ipc, _) = Ipc::create(&names, 10, 10).unwrap();
        {
            let mut world = ipc.write().unwrap();
            world.set_finished();
            assert!(world.as_world().is_finished());
        }
        let sync = ipc.sync();
        assert_eq!(sync.no_starve.value().unwrap(), 1);
        assert_eq!(sync.writer_lock.value().unwrap(), 1);
        assert!(ipc.read().unwrap().is_finished());
    }

    #[test]
    fn writer_waits_for_active_reader() {
        let names = names("exclusion");
        let _cleanup = Cleanup(names.clone());
        let (ipc, _) = Ipc::create(&names, 10, 10).unwrap();
        let reader = ipc.read().unwrap();
        let done = AtomicU32::new(0);

        thread::scope(|s| {
            s.spawn(|| {
                let mut writer = Ipc::attach(&names).unwrap();
                let _guard = writer.write().unwrap();
                done.store(1, Ordering::SeqCst);
            });
            thread::sleep(Duration::from_millis(100));
            assert_eq!(done.load(Ordering::SeqCst), 0, "writer entered beside a reader");
            drop(reader);
        });
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    /// A reader arriving after a writer started waiting must queue behind it.
    #[test]
    fn late_reader_queues_behind_waiting_writer() {
        let names = names("turnstile");
        let _cleanup = Cleanup(names.clone());
        let (ipc, _) = Ipc::create(&names, 10, 10).unwrap();
        let order = Mutex::new(Vec::new());

        let early = ipc.read().unwrap();
        thread::scope(|s| {
            s.spawn(|| {
                let mut writer = Ipc::attach(&names).unwrap();
                let _guard = writer.write().unwrap();
                order.lock().unwrap().push("writer");
                thread::sleep(Duration::from_millis(50));
            });
            // let the writer take the turnstile
            thread::sleep(Duration::from_millis(100));
            s.spawn(|| {
                let late = Ipc::attach(&names).unwrap();
                let _guard = late.read().unwrap();
                order.lock().unwrap().push("reader");
            });
            thread::sleep(Duration::from_millis(100));
            assert!(order.lock().unwrap().is_empty());
            drop(early);
        });

        assert_eq!(*order.lock().unwrap(), vec!["writer", "reader"]);
        assert_eq!(ipc.sync().readers(), 0);
    }

    #[test]
    fn gates_admit_one_action_each() {
        let names = names("gates");
        let _cleanup = Cleanup(names.clone());
        let (ipc, _) = Ipc::create(&names, 10, 10).unwrap();
        let sync = ipc.sync();

        sync.admit(3).unwrap();
        assert!(!sync.await_admission_timeout(2, Duration::from_millis(10)).unwrap());
        assert!(sync.await_admission_timeout(3, Duration::from_millis(10)).unwrap());
        assert!(!sync.await_admission_timeout(3, Duration::from_millis(10)).unwrap());
        assert!(sync.admit(9).is_err());
    }

    #[test]
    fn render_handshake_round_trip() {
        let names = names("render");
        let _cleanup = Cleanup(names.clone());
        let (ipc, _) = Ipc::create(&names, 10, 10).unwrap();

        thread::scope(|s| {
            s.spawn(|| {
                let view = Ipc::attach(&names).unwrap();
                view.sync().await_render_request().unwrap();
                let _world = view.read().unwrap();
                view.sync().render_done().unwrap();
            });
            ipc.sync().request_render().unwrap();
            assert!(ipc.sync().await_render_done(Duration::from_secs(5)).unwrap());
        });
        assert!(!ipc.sync().await_render_done(Duration::from_millis(10)).unwrap());
    }
}
