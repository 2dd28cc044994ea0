//! Pidfile ownership.
//!
//! A pidfile holds the decimal id of the process serving, without a trailing newline.
//! Before starting, the supervisor makes sure no other live process owns the file;
//! stale, empty and unparseable files are removed.

use crate::error::ServerError;
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How many times `write` re-checks a pidfile that appeared after the check passed.
const WRITE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidStatus {
    /// no pidfile
    Missing,
    /// empty or not a positive decimal pid
    Invalid,
    /// written by this process
    Own,
    /// the recorded process doesn't exist anymore
    Dead,
    /// the recorded process is alive
    Running(libc::pid_t),
    /// the recorded process exists but belongs to someone we can't signal
    NotOwned(libc::pid_t),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn status(&self) -> Result<PidStatus, ServerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(PidStatus::Missing),
            Err(e) => return Err(ServerError::pidfile(&self.path, e)),
        };

        let pid = match content.trim().parse::<libc::pid_t>() {
            Ok(pid) if pid > 0 => pid,
            _ => return Ok(PidStatus::Invalid),
        };

        if pid == current_pid() {
            return Ok(PidStatus::Own);
        }

        Ok(match probe(pid) {
            Probe::Alive => PidStatus::Running(pid),
            Probe::Gone => PidStatus::Dead,
            Probe::NotPermitted => PidStatus::NotOwned(pid),
        })
    }

    /// Fails with [`ServerError::AlreadyRunning`] if another live process owns the
    /// pidfile. Any other pidfile found is removed.
    pub fn check(&self) -> Result<(), ServerError> {
        match self.status()? {
            PidStatus::Missing => Ok(()),
            PidStatus::Running(pid) | PidStatus::NotOwned(pid) => Err(ServerError::already_running(pid, &self.path)),
            status => {
                debug!(?status, file = %self.path.display(), "remove leftover pidfile");
                self.remove()
            }
        }
    }

    /// Records the current process in the pidfile.
    ///
    /// The file is created exclusively; when it reappears between the check and the
    /// create, the check runs again. The returned guard removes the file when dropped,
    /// provided it still holds our pid.
    pub fn write(&self) -> Result<PidGuard, ServerError> {
        let pid = current_pid();

        for _ in 0..WRITE_ATTEMPTS {
            self.check()?;

            match OpenOptions::new().write(true).create_new(true).open(&self.path) {
                Ok(file) => {
                    self.fill(file, pid)?;
                    info!(pid, file = %self.path.display(), "write pidfile");
                    return Ok(PidGuard { pidfile: self.clone() });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(file = %self.path.display(), "pidfile appeared after check, check again");
                }
                Err(e) => return Err(ServerError::pidfile(&self.path, e)),
            }
        }

        Err(self.contended())
    }

    /// Writes `pid` into the freshly created pidfile. On failure the file is removed, so
    /// no partial pidfile is left behind.
    fn fill<W: Write>(&self, mut file: W, pid: libc::pid_t) -> Result<(), ServerError> {
        let Err(e) = file.write_all(pid.to_string().as_bytes()).and_then(|()| file.flush()) else {
            return Ok(());
        };

        drop(file);
        if let Err(remove_error) = self.remove() {
            warn!(cause = %remove_error, file = %self.path.display(), "can't remove partial pidfile");
        }
        Err(ServerError::pidfile(&self.path, e))
    }

    /// The error reported when other processes kept recreating the pidfile: whoever it
    /// names now is treated as the running owner.
    fn contended(&self) -> ServerError {
        let recorded = fs::read_to_string(&self.path).ok().and_then(|content| content.trim().parse::<libc::pid_t>().ok());
        match recorded {
            Some(pid) if pid > 0 => ServerError::already_running(pid, &self.path),
            _ => ServerError::pidfile(&self.path, io::Error::from(ErrorKind::AlreadyExists)),
        }
    }

    /// Removes the pidfile if it still holds the current pid.
    pub fn release(&self) {
        if !matches!(self.status(), Ok(PidStatus::Own)) {
            return;
        }

        match fs::remove_file(&self.path) {
            Ok(()) => debug!(file = %self.path.display(), "remove pidfile"),
            Err(e) => warn!(cause = %e, file = %self.path.display(), "can't remove pidfile"),
        }
    }

    fn remove(&self) -> Result<(), ServerError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ServerError::pidfile(&self.path, e)),
        }
    }
}

/// Removes the pidfile when dropped.
#[derive(Debug)]
pub struct PidGuard {
    pidfile: PidFile,
}

impl PidGuard {
    pub fn pidfile(&self) -> &PidFile {
        &self.pidfile
    }
}

impl Drop for PidGuard {
    fn drop(&mut self) {
        self.pidfile.release();
    }
}

enum Probe {
    Alive,
    Gone,
    NotPermitted,
}

fn probe(pid: libc::pid_t) -> Probe {
    // SAFETY: signal 0 only checks that `pid` exists and may be signalled; nothing is
    // delivered. `pid` is positive, so it never addresses a process group.
    let result = unsafe { libc::kill(pid, 0) };
    if result == 0 {
        return Probe::Alive;
    }

    match io::Error::last_os_error().raw_os_error() {
        Some(libc::ESRCH) => Probe::Gone,
        Some(libc::EPERM) => Probe::NotPermitted,
        _ => Probe::Alive,
    }
}

fn current_pid() -> libc::pid_t {
    libc::pid_t::try_from(std::process::id()).unwrap_or(libc::pid_t::MAX)
}
