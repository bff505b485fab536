//! Every blocking primitive in this crate goes through [`retry_on_interrupt`],
//! so a signal landing mid-wait is never surfaced to callers.

use std::io;

/// Re-run `op` for as long as it fails with `ErrorKind::Interrupted`.
#[inline]
pub fn retry_on_interrupt<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match op() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Turn a C-style `-1 + errno` return into an `io::Result`.
#[inline]
pub fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}
