// Agent pipes and readiness multiplexing.
//
// Each agent writes one byte per admission to its stdout; the orchestrator
// owns the read end. A zero-length read means the agent closed its end and is
// reported as `Closed`, never as a byte.

use chomp_icc::{cvt, retry_on_interrupt};
use std::io::{self, Read};
use std::os::fd::{AsRawFd, RawFd};
use std::process::ChildStdout;
use std::time::Duration;

/// Result of reading one byte from an agent.
#[derive(Debug)]
pub enum ReadOutcome {
    Byte(u8),
    /// The agent closed its end of the pipe.
    Closed,
    Failed(io::Error),
}

/// Read end of one agent's pipe. Closed at most once.
pub struct MoveChannel {
    pipe: Option<ChildStdout>,
}

impl MoveChannel {
    pub fn new(pipe: ChildStdout) -> Self {
        Self { pipe: Some(pipe) }
    }

    /// A channel with nothing behind it.
    pub fn closed() -> Self {
        Self { pipe: None }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.pipe.is_some()
    }

    #[inline]
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.pipe.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Read exactly one byte. Only call once the descriptor polled readable,
    /// or this blocks until the agent writes.
    pub fn read_byte(&mut self) -> ReadOutcome {
        let Some(pipe) = self.pipe.as_mut() else {
            return ReadOutcome::Closed;
        };
        let mut buf = [0u8; 1];
        match retry_on_interrupt(|| pipe.read(&mut buf)) {
            Ok(0) => ReadOutcome::Closed,
            Ok(_) => ReadOutcome::Byte(buf[0]),
            Err(e) => ReadOutcome::Failed(e),
        }
    }

    /// Drop the read end. `true` only for the call that actually closed it.
    pub fn close(&mut self) -> bool {
        self.pipe.take().is_some()
    }
}

/// Wait up to `timeout` for any of `fds` to become readable.
///
/// `fds` pairs a caller-chosen key with a descriptor; the keys of every ready
/// descriptor come back in input order. Hang-up and error conditions count
/// as ready, so the following read reports them. Only a failure of the wait
/// itself is an `Err`.
pub fn poll_readable<K: Copy>(fds: &[(K, RawFd)], timeout: Duration) -> io::Result<Vec<K>> {
    if fds.is_empty() {
        return Ok(Vec::new());
    }
    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|&(_, fd)| libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    retry_on_interrupt(|| {
        // SAFETY: pollfds is a live, correctly sized array for the whole call.
        cvt(unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms) })
    })?;

    let ready_mask = libc::POLLIN | libc::POLLHUP | libc::POLLERR | libc::POLLNVAL;
    Ok(fds
        .iter()
        .zip(&pollfds)
        .filter(|(_, p)| p.revents & ready_mask != 0)
        .map(|(&(key, _), _)| key)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};

    fn channel_from(script: &str) -> (std::process::Child, MoveChannel) {
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(script)
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        let pipe = child.stdout.take().unwrap();
        (child, MoveChannel::new(pipe))
    }

    #[test]
    fn reads_one_byte_at_a_time_then_closed() {
        let (mut child, mut chan) = channel_from("printf '\\002\\006'");
        assert!(matches!(chan.read_byte(), ReadOutcome::Byte(2)));
        assert!(matches!(chan.read_byte(), ReadOutcome::Byte(6)));
        assert!(matches!(chan.read_byte(), ReadOutcome::Closed));
        child.wait().unwrap();
    }

    #[test]
    fn close_happens_once() {
        let (mut child, mut chan) = channel_from("true");
        assert!(chan.is_open());
        assert!(chan.close());
        assert!(!chan.close());
        assert!(chan.raw_fd().is_none());
        assert!(matches!(chan.read_byte(), ReadOutcome::Closed));
        child.wait().unwrap();
    }

    #[test]
    fn poll_reports_only_ready_pipes() {
        let (mut quiet, quiet_chan) = channel_from("sleep 2");
        let (mut loud, loud_chan) = channel_from("printf x; sleep 2");
        let fds = [
            (0usize, quiet_chan.raw_fd().unwrap()),
            (1usize, loud_chan.raw_fd().unwrap()),
        ];

        let ready = poll_readable(&fds, Duration::from_secs(1)).unwrap();
        assert_eq!(ready, vec![1]);

        quiet.kill().unwrap();
        loud.kill().unwrap();
        quiet.wait().unwrap();
        loud.wait().unwrap();
    }

    #[test]
    fn poll_times_out_empty() {
        let (mut child, chan) = channel_from("sleep 2");
        let ready = poll_readable(&[((), chan.raw_fd().unwrap())], Duration::from_millis(20));
        assert!(ready.unwrap().is_empty());
        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn hang_up_counts_as_ready() {
        let (mut child, mut chan) = channel_from("exit 0");
        child.wait().unwrap();
        let ready = poll_readable(&[(7u8, chan.raw_fd().unwrap())], Duration::from_secs(1));
        assert_eq!(ready.unwrap(), vec![7]);
        assert!(matches!(chan.read_byte(), ReadOutcome::Closed));
    }
}
