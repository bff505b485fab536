//! Process-shared unnamed POSIX semaphore living inside a mapped region.

use crate::retry::{cvt, retry_on_interrupt};
use std::cell::UnsafeCell;
use std::io;
use std::time::Duration;

/// A `sem_t` initialised with `pshared = 1`.
///
/// The value is only meaningful while it sits in shared memory; it is never
/// moved or copied after [`Semaphore::init`].
#[repr(transparent)]
pub struct Semaphore {
    raw: UnsafeCell<libc::sem_t>,
}

// SAFETY: sem_* calls are the synchronization; the cell is only touched through them.
unsafe impl Sync for Semaphore {}
unsafe impl Send for Semaphore {}

impl Semaphore {
    /// Initialise the semaphore to `value`.
    ///
    /// # Safety
    /// Must run exactly once, before any process waits on or posts to it.
    pub unsafe fn init(&self, value: u32) -> io::Result<()> {
        cvt(unsafe { libc::sem_init(self.raw.get(), 1, value) }).map(drop)
    }

    /// Decrement, blocking while the value is zero.
    pub fn wait(&self) -> io::Result<()> {
        retry_on_interrupt(|| cvt(unsafe { libc::sem_wait(self.raw.get()) })).map(drop)
    }

    /// Decrement if possible without blocking; `false` when the value was zero.
    pub fn try_wait(&self) -> io::Result<bool> {
        match retry_on_interrupt(|| cvt(unsafe { libc::sem_trywait(self.raw.get()) })) {
            Ok(_) => Ok(true),
            Err(e) if e.raw_os_error() == Some(libc::EAGAIN) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`, returning `false`.
    ///
    /// The deadline is fixed before the first attempt so interrupts do not
    /// extend it.
    pub fn wait_timeout(&self, timeout: Duration) -> io::Result<bool> {
        let deadline = realtime_deadline(timeout)?;
        match retry_on_interrupt(|| cvt(unsafe { libc::sem_timedwait(self.raw.get(), &deadline) }))
        {
            Ok(_) => Ok(true),
            Err(e) if e.raw_os_error() == Some(libc::ETIMEDOUT) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Increment, waking one waiter.
    pub fn post(&self) -> io::Result<()> {
        cvt(unsafe { libc::sem_post(self.raw.get()) }).map(drop)
    }

    /// Current value. Racy by nature; for diagnostics and tests.
    pub fn value(&self) -> io::Result<i32> {
        let mut v: libc::c_int = 0;
        cvt(unsafe { libc::sem_getvalue(self.raw.get(), &mut v) })?;
        Ok(v)
    }
}

// sem_timedwait takes an absolute CLOCK_REALTIME deadline.
fn realtime_deadline(timeout: Duration) -> io::Result<libc::timespec> {
    let mut now = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    cvt(unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) })?;

    let mut sec = now.tv_sec + timeout.as_secs() as libc::time_t;
    let mut nsec = now.tv_nsec + timeout.subsec_nanos() as libc::c_long;
    if nsec >= 1_000_000_000 {
        sec += 1;
        nsec -= 1_000_000_000;
    }
    Ok(libc::timespec {
        tv_sec: sec,
        tv_nsec: nsec,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::MaybeUninit;

    // A heap semaphore is enough to exercise the wrapper; pshared works in-process too.
    fn boxed(value: u32) -> Box<Semaphore> {
        let sem: Box<Semaphore> = Box::new(unsafe { MaybeUninit::zeroed().assume_init() });
        unsafe { sem.init(value).unwrap() };
        sem
    }

    #[test]
    fn post_then_wait() {
        let sem = boxed(0);
        assert!(!sem.try_wait().unwrap());
        sem.post().unwrap();
        assert_eq!(sem.value().unwrap(), 1);
        sem.wait().unwrap();
        assert_eq!(sem.value().unwrap(), 0);
    }

    #[test]
    fn initial_value_is_honoured() {
        let sem = boxed(2);
        assert!(sem.try_wait().unwrap());
        assert!(sem.try_wait().unwrap());
        assert!(!sem.try_wait().unwrap());
    }

    #[test]
    fn timed_wait_expires() {
        let sem = boxed(0);
        let start = std::time::Instant::now();
        assert!(!sem.wait_timeout(Duration::from_millis(30)).unwrap());
        assert!(start.elapsed() >= Duration::from_millis(25));

        sem.post().unwrap();
        assert!(sem.wait_timeout(Duration::from_millis(30)).unwrap());
    }

    #[test]
    fn wakes_a_blocked_waiter() {
        let sem = boxed(0);
        std::thread::scope(|s| {
            let waiter = s.spawn(|| sem.wait());
            std::thread::sleep(Duration::from_millis(20));
            sem.post().unwrap();
            waiter.join().unwrap().unwrap();
        });
    }
}
