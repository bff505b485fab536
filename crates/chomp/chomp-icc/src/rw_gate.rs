//! Reader-writer lock with a turnstile, built from the raw semaphores of a
//! [`SyncBlock`].
//!
//! # Protocol
//!
//! **Reader enter:** pass through the turnstile (`no_starve` wait + post),
//! then under `reader_mutex` bump the reader count; the first reader of a
//! generation takes the room (`writer_lock`).
//!
//! **Reader exit:** under `reader_mutex` drop the count; the last reader
//! releases the room.
//!
//! **Writer enter:** take the turnstile and keep it, then take the room.
//!
//! **Writer exit:** release the room, then the turnstile.
//!
//! While a writer holds the turnstile no new reader can get past it, so a
//! writer waits for at most the reader generation already inside.
//!
//! Callers normally go through [`crate::Ipc::read`] / [`crate::Ipc::write`],
//! whose guards pair every enter with its exit.

use crate::shm_layout::SyncBlock;
use std::io;
use std::sync::atomic::Ordering;

impl SyncBlock {
    pub fn reader_enter(&self) -> io::Result<()> {
        self.no_starve.wait()?;
        self.no_starve.post()?;

        self.reader_mutex.wait()?;
        let counter = self.reader_count();
        let readers = counter.load(Ordering::Relaxed) + 1;
        counter.store(readers, Ordering::Relaxed);
        let room = if readers == 1 {
            self.writer_lock.wait()
        } else {
            Ok(())
        };
        if room.is_err() {
            counter.store(readers - 1, Ordering::Relaxed);
        }
        self.reader_mutex.post()?;
        room
    }

    pub fn reader_exit(&self) -> io::Result<()> {
        self.reader_mutex.wait()?;
        let counter = self.reader_count();
        let readers = counter.load(Ordering::Relaxed);
        debug_assert!(readers > 0, "reader_exit without reader_enter");
        let readers = readers.saturating_sub(1);
        counter.store(readers, Ordering::Relaxed);
        let room = if readers == 0 {
            self.writer_lock.post()
        } else {
            Ok(())
        };
        self.reader_mutex.post()?;
        room
    }

    pub fn writer_enter(&self) -> io::Result<()> {
        self.no_starve.wait()?;
        if let Err(e) = self.writer_lock.wait() {
            self.no_starve.post()?;
            return Err(e);
        }
        Ok(())
    }

    /// Room first: opening the turnstile first would let a reader grab the
    /// room before the writer gave it up.
    pub fn writer_exit(&self) -> io::Result<()> {
        self.writer_lock.post()?;
        self.no_starve.post()
    }
}
