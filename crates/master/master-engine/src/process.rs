//! Child process handles: spawn, terminate, wait.

use chomp_icc::cvt;
use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use tracing::debug;

/// File name of an executable, used as its display name.
pub(crate) fn label_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// A spawned renderer or agent.
///
/// The exit status is cached once reaped, so `wait` and `terminate` are safe
/// to call in any order and any number of times.
pub struct ChildProcess {
    label: String,
    child: Child,
    status: Option<ExitStatus>,
}

impl ChildProcess {
    /// Run `path` with `args` and extra environment. With `capture_stdout`
    /// the child's stdout becomes a pipe retrievable via
    /// [`ChildProcess::take_stdout`]; otherwise it is inherited.
    pub fn spawn<I, K, V>(
        path: &Path,
        args: &[String],
        envs: I,
        capture_stdout: bool,
    ) -> io::Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        let stdout = if capture_stdout {
            Stdio::piped()
        } else {
            Stdio::inherit()
        };
        let child = Command::new(path)
            .args(args)
            .envs(envs)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::inherit())
            .spawn()?;

        let label = label_of(path);
        debug!(%label, pid = child.id(), "spawned");
        Ok(Self {
            label,
            child,
            status: None,
        })
    }

    #[inline]
    pub fn pid(&self) -> i32 {
        self.child.id() as i32
    }

    /// File name of the executable.
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Read end of the child's stdout pipe, once.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Ask the child to exit with `SIGTERM`. A child that is already gone is
    /// not an error.
    pub fn terminate(&self) -> io::Result<()> {
        if self.status.is_some() {
            return Ok(());
        }
        // SAFETY: plain syscall on a pid we spawned and have not reaped yet.
        match cvt(unsafe { libc::kill(self.pid(), libc::SIGTERM) }) {
            Ok(_) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::ESRCH) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Non-blocking liveness check; `Some` once the child has exited.
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        if self.status.is_none() {
            self.status = self.child.try_wait()?;
        }
        Ok(self.status)
    }

    /// Block until the child exits.
    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = self.child.wait()?;
        self.status = Some(status);
        Ok(status)
    }
}
