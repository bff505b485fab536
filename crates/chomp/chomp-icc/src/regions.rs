//! The two named regions of a game: world state and synchronization block.

use crate::shm_layout::{SYNC_SIZE, SyncBlock};
use chomp_shm::{Access, SharedRegion, ShmFile};
use chomp_state::{StateHeader, World, WorldMut, state_size};
use std::io;
use std::mem::size_of;
use std::slice;
use tracing::{debug, warn};

/// Mapped world-state region: header followed by `width * height` cells.
pub struct StateRegion {
    region: SharedRegion,
    width: u16,
    height: u16,
}

/// Mapped synchronization region.
pub struct SyncRegion {
    region: SharedRegion,
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

impl StateRegion {
    /// Create (or reuse) the state region for a `width x height` board.
    ///
    /// Returns `(region, already_existed)`. A fresh region is zeroed and gets
    /// its dimensions written; a reused one must already declare the same
    /// dimensions, since the grid length is derived from them.
    pub fn create(name: &str, width: u16, height: u16) -> io::Result<(Self, bool)> {
        if width == 0 || height == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "board dimensions must be non-zero",
            ));
        }
        let (mut region, created) = SharedRegion::create(name, state_size(width, height))?;

        if created {
            let ptr = region
                .as_mut_ptr()
                .ok_or_else(|| invalid(format!("'{name}' mapped read-only")))?;
            // SAFETY: fresh zeroed mapping of at least size_of::<StateHeader>() bytes,
            // page aligned, and nobody else has seen it yet.
            let header = unsafe { &mut *(ptr as *mut StateHeader) };
            header.width = width;
            header.height = height;
        } else {
            // SAFETY: the mapping covers the header; any bit pattern is a valid header.
            let header = unsafe { &*(region.as_ptr() as *const StateHeader) };
            if (header.width, header.height) != (width, height) {
                return Err(invalid(format!(
                    "'{name}' already holds a {}x{} board, wanted {width}x{height}",
                    header.width, header.height
                )));
            }
            warn!(name, "reusing existing state region");
        }

        Ok((
            Self {
                region,
                width,
                height,
            },
            !created,
        ))
    }

    /// Attach to an existing state region.
    ///
    /// Only the header is mapped at first; the full size is then computed
    /// from the dimensions it declares.
    pub fn open(name: &str) -> io::Result<Self> {
        let shm = ShmFile::open(name)?;
        let (width, height) = {
            let head = shm.map(size_of::<StateHeader>())?;
            // SAFETY: head covers exactly one header; any bit pattern is valid.
            let header = unsafe { &*(head.as_ptr() as *const StateHeader) };
            (header.width, header.height)
        };
        if width == 0 || height == 0 {
            return Err(invalid(format!("'{name}' declares an empty board")));
        }
        let region = shm.map(state_size(width, height))?;
        debug!(name, width, height, access = ?region.access(), "state region attached");
        Ok(Self {
            region,
            width,
            height,
        })
    }

    #[inline]
    pub fn dimensions(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    #[inline]
    pub fn access(&self) -> Access {
        self.region.access()
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.region.name()
    }

    fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Unsynchronized view; callers must hold the reader or writer role.
    pub(crate) fn world(&self) -> World<'_> {
        let base = self.region.as_ptr();
        // SAFETY: the mapping is state_size(width, height) bytes long: one header
        // then cell_count() i32s, 4-byte aligned because the header size is.
        unsafe {
            let header = &*(base as *const StateHeader);
            let cells = slice::from_raw_parts(
                base.add(size_of::<StateHeader>()) as *const i32,
                self.cell_count(),
            );
            World::new(header, cells)
        }
    }

    /// Unsynchronized mutable view, `None` for read-only mappings. Callers
    /// must hold the writer role.
    pub(crate) fn world_mut(&mut self) -> Option<WorldMut<'_>> {
        let count = self.cell_count();
        let base = self.region.as_mut_ptr()?;
        // SAFETY: as in `world`, and `&mut self` keeps this process from
        // handing out a second view at the same time.
        unsafe {
            let header = &mut *(base as *mut StateHeader);
            let cells =
                slice::from_raw_parts_mut(base.add(size_of::<StateHeader>()) as *mut i32, count);
            Some(WorldMut::new(header, cells))
        }
    }

    pub fn unmap(self) {
        self.region.unmap();
    }

    /// Remove the named region; `Ok(false)` if it was already gone.
    pub fn destroy(name: &str) -> io::Result<bool> {
        chomp_shm::unlink(name)
    }
}

impl SyncRegion {
    /// Create (or reuse) the sync region. Semaphores are initialised only when
    /// this call created the region; if that fails the region is removed again.
    ///
    /// Returns `(region, created)`.
    pub fn create(name: &str) -> io::Result<(Self, bool)> {
        let (region, created) = SharedRegion::create(name, SYNC_SIZE)?;
        let sync = Self { region };
        if created {
            // SAFETY: we created the region a moment ago; nobody else can be using it.
            if let Err(e) = unsafe { sync.block().init() } {
                drop(sync);
                let _ = chomp_shm::unlink(name);
                return Err(e);
            }
        }
        Ok((sync, created))
    }

    /// Attach to an existing sync region. Always read-write: waiting on a
    /// semaphore writes to it.
    pub fn open(name: &str) -> io::Result<Self> {
        let region = ShmFile::open_rw(name)?.map(SYNC_SIZE)?;
        Ok(Self { region })
    }

    #[inline]
    pub fn block(&self) -> &SyncBlock {
        // SAFETY: the mapping is SYNC_SIZE bytes, page aligned; every field is
        // interior-mutable and only changed through sem_* calls or under reader_mutex.
        unsafe { &*(self.region.as_ptr() as *const SyncBlock) }
    }

    pub fn unmap(self) {
        self.region.unmap();
    }

    pub fn destroy(name: &str) -> io::Result<bool> {
        chomp_shm::unlink(name)
    }
}
