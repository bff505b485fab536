//! Named POSIX shared-memory objects mapped with `memmap2`.
//!
//! `shm_open` gives us a file descriptor living under `/dev/shm`; from there the
//! object behaves like any other file, so sizing goes through `File::set_len`
//! and mapping through `memmap2`.

use memmap2::{Mmap, MmapMut, MmapOptions};
use std::{
    ffi::CString,
    fs::File,
    io,
    os::fd::{FromRawFd, OwnedFd},
};
use tracing::{debug, warn};

/// Permissions of freshly created objects (owner + group read/write).
const SHM_MODE: libc::mode_t = 0o660;

/// How a region ended up mapped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    ReadOnly,
}

/// An opened (not yet mapped) shared-memory object.
pub struct ShmFile {
    name: String,
    file: File,
    access: Access,
}

/// A mapped shared-memory object.
///
/// Dropping the region unmaps it; the named object itself survives until
/// [`unlink`] is called.
pub struct SharedRegion {
    name: String,
    mapping: Mapping,
}

enum Mapping {
    ReadWrite(MmapMut),
    ReadOnly(Mmap),
}

fn c_name(name: &str) -> io::Result<CString> {
    let name = if name.starts_with('/') {
        name.to_owned()
    } else {
        format!("/{name}")
    };
    CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

fn shm_open(name: &CString, flags: libc::c_int) -> io::Result<File> {
    // SAFETY: name is a valid NUL-terminated string for the duration of the call.
    let fd = unsafe { libc::shm_open(name.as_ptr(), flags, SHM_MODE) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: shm_open returned a fresh descriptor that nothing else owns.
    Ok(File::from(unsafe { OwnedFd::from_raw_fd(fd) }))
}

/// Removes the named object if the creation sequence fails part way.
struct UnlinkOnDrop<'a> {
    name: &'a str,
    armed: bool,
}

impl Drop for UnlinkOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = unlink(self.name) {
                warn!(name = self.name, error = %e, "rollback unlink failed");
            }
        }
    }
}

impl SharedRegion {
    /// Create the object `name` sized to exactly `size` bytes and map it read-write.
    ///
    /// Returns `(region, created)`. A freshly created object is zero-filled;
    /// if any step after the creation fails it is unlinked again. An object
    /// that already exists is never resized: its first `size` bytes are
    /// mapped with contents left alone, and an object shorter than `size` is
    /// refused with `InvalidData`.
    pub fn create(name: &str, size: usize) -> io::Result<(Self, bool)> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "shared region size must be non-zero",
            ));
        }
        let cname = c_name(name)?;
        let file = match shm_open(&cname, libc::O_RDWR | libc::O_CREAT | libc::O_EXCL) {
            Ok(file) => file,
            Err(e) if e.raw_os_error() == Some(libc::EEXIST) => {
                let region = ShmFile::open_rw(name)?.map(size)?;
                debug!(name, size, "reusing shared region");
                return Ok((region, false));
            }
            Err(e) => return Err(e),
        };
        let mut rollback = UnlinkOnDrop { name, armed: true };

        file.set_len(size as u64)?;
        let mut mmap = unsafe { MmapOptions::new().len(size).map_mut(&file)? };
        mmap.fill(0);

        rollback.armed = false;
        debug!(name, size, "shared region created");
        Ok((
            Self {
                name: name.to_owned(),
                mapping: Mapping::ReadWrite(mmap),
            },
            true,
        ))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn len(&self) -> usize {
        match &self.mapping {
            Mapping::ReadWrite(m) => m.len(),
            Mapping::ReadOnly(m) => m.len(),
        }
    }

    #[inline]
    pub fn access(&self) -> Access {
        match self.mapping {
            Mapping::ReadWrite(_) => Access::ReadWrite,
            Mapping::ReadOnly(_) => Access::ReadOnly,
        }
    }

    /// Raw pointer to the start of the mapping.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        match &self.mapping {
            Mapping::ReadWrite(m) => m.as_ptr(),
            Mapping::ReadOnly(m) => m.as_ptr(),
        }
    }

    /// Raw mutable pointer, `None` for read-only mappings.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> Option<*mut u8> {
        match &mut self.mapping {
            Mapping::ReadWrite(m) => Some(m.as_mut_ptr()),
            Mapping::ReadOnly(_) => None,
        }
    }

    /// Unmap the region. The named object is not removed.
    pub fn unmap(self) {
        debug!(name = %self.name, "shared region unmapped");
    }
}

impl ShmFile {
    /// Attach to an existing object, read-write when permitted and read-only
    /// when the write attempt is refused with `EACCES`/`EPERM`.
    pub fn open(name: &str) -> io::Result<Self> {
        let cname = c_name(name)?;
        match shm_open(&cname, libc::O_RDWR) {
            Ok(file) => Ok(Self {
                name: name.to_owned(),
                file,
                access: Access::ReadWrite,
            }),
            Err(e) if matches!(e.raw_os_error(), Some(libc::EACCES) | Some(libc::EPERM)) => {
                let file = shm_open(&cname, libc::O_RDONLY)?;
                Ok(Self {
                    name: name.to_owned(),
                    file,
                    access: Access::ReadOnly,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Attach read-write, failing if that is not permitted.
    pub fn open_rw(name: &str) -> io::Result<Self> {
        let cname = c_name(name)?;
        let file = shm_open(&cname, libc::O_RDWR)?;
        Ok(Self {
            name: name.to_owned(),
            file,
            access: Access::ReadWrite,
        })
    }

    #[inline]
    pub fn access(&self) -> Access {
        self.access
    }

    /// Current size of the object in bytes.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Map the first `len` bytes of the object.
    ///
    /// Mapping past the end of the object would fault on first touch, so that
    /// is rejected up front.
    pub fn map(&self, len: usize) -> io::Result<SharedRegion> {
        let actual = self.len()?;
        if (len as u64) > actual || len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "shared region '{}' is {actual} bytes, cannot map {len}",
                    self.name
                ),
            ));
        }
        let mapping = match self.access {
            Access::ReadWrite => {
                Mapping::ReadWrite(unsafe { MmapOptions::new().len(len).map_mut(&self.file)? })
            }
            Access::ReadOnly => {
                Mapping::ReadOnly(unsafe { MmapOptions::new().len(len).map(&self.file)? })
            }
        };
        Ok(SharedRegion {
            name: self.name.clone(),
            mapping,
        })
    }
}

/// Remove the named object.
///
/// Returns `Ok(false)` when there was nothing to remove, so repeated calls are
/// harmless.
pub fn unlink(name: &str) -> io::Result<bool> {
    let cname = c_name(name)?;
    // SAFETY: cname is a valid NUL-terminated string.
    if unsafe { libc::shm_unlink(cname.as_ptr()) } == 0 {
        debug!(name, "shared region unlinked");
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ENOENT) {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unique(tag: &str) -> String {
        static NEXT: AtomicU32 = AtomicU32::new(0);
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        format!("/chomp_shm_test_{tag}_{}_{n}", std::process::id())
    }

    #[test]
    fn create_then_reuse_reports_existence() {
        let name = unique("reuse");
        let (mut first, created) = SharedRegion::create(&name, 64).unwrap();
        assert!(created);
        assert_eq!(first.len(), 64);
        unsafe { *first.as_mut_ptr().unwrap() = 42 };

        let (second, created) = SharedRegion::create(&name, 64).unwrap();
        assert!(!created);
        // reuse never wipes the contents
        assert_eq!(unsafe { *second.as_ptr() }, 42);

        assert!(unlink(&name).unwrap());
    }

    #[test]
    fn reuse_never_resizes() {
        let name = unique("resize");
        let (_region, created) = SharedRegion::create(&name, 128).unwrap();
        assert!(created);

        let (smaller, created) = SharedRegion::create(&name, 64).unwrap();
        assert!(!created);
        assert_eq!(smaller.len(), 64);
        assert_eq!(ShmFile::open(&name).unwrap().len().unwrap(), 128);

        let err = SharedRegion::create(&name, 256).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(ShmFile::open(&name).unwrap().len().unwrap(), 128);

        unlink(&name).unwrap();
    }

    #[test]
    fn open_maps_what_create_wrote() {
        let name = unique("open");
        let (mut region, _) = SharedRegion::create(&name, 128).unwrap();
        unsafe { *region.as_mut_ptr().unwrap().add(100) = 7 };

        let shm = ShmFile::open(&name).unwrap();
        assert_eq!(shm.access(), Access::ReadWrite);
        assert_eq!(shm.len().unwrap(), 128);
        let view = shm.map(128).unwrap();
        assert_eq!(unsafe { *view.as_ptr().add(100) }, 7);

        unlink(&name).unwrap();
    }

    #[test]
    fn mapping_past_the_end_is_rejected() {
        let name = unique("short");
        let (_region, _) = SharedRegion::create(&name, 16).unwrap();
        let shm = ShmFile::open(&name).unwrap();
        let err = shm.map(4096).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        unlink(&name).unwrap();
    }

    #[test]
    fn unlink_is_idempotent() {
        let name = unique("unlink");
        let (_region, _) = SharedRegion::create(&name, 8).unwrap();
        assert!(unlink(&name).unwrap());
        assert!(!unlink(&name).unwrap());
        assert!(ShmFile::open(&name).is_err());
    }

    #[test]
    fn zero_size_is_refused() {
        let name = unique("zero");
        assert!(SharedRegion::create(&name, 0).is_err());
        assert!(!unlink(&name).unwrap());
    }
}
